use super::{ensure_finite, PipelineStage};
use crate::context::PipelineContext;
use crate::error::StageError;
use crate::grid::Grid2D;
use crate::noise::normalized_field;
use crate::params::{ClimateParams, TemperatureParams};
use crate::rng::{seed_offset, Stream};
use crate::thresholds::ElevationThresholds;
use crate::units::relative_excess;

const LATITUDE_WEIGHT: f32 = 12.0;
const NOISE_WEIGHT: f32 = 1.0;

/// `1` on the thermal equator, falling to `0` half a map height away.
pub fn latitude_factor(y: usize, height: usize, axial_tilt: f32) -> f32 {
    let v = y as f32 / height.max(1) as f32;
    let d = (v - 0.5 - axial_tilt) / 0.5;
    (1.0 - d * d).max(0.0)
}

/// Multiplier for cells above the mountain threshold.
pub fn altitude_factor(elevation: f32, mountain_level: f32, params: &TemperatureParams) -> f32 {
    let excess = relative_excess(elevation, mountain_level);
    (1.0 - excess / params.altitude_cooling_range).max(params.min_altitude_factor)
}

pub fn temperature_field(
    elevation: &Grid2D<f32>,
    thresholds: &ElevationThresholds,
    climate: ClimateParams,
    params: &TemperatureParams,
    seed: u64,
) -> Grid2D<f32> {
    let (w, h) = elevation.dimensions();
    let noise = normalized_field(
        seed_offset(seed, Stream::TemperatureNoise as u64),
        w,
        h,
        params.octaves,
        params.frequency,
    );
    Grid2D::from_fn(w, h, |x, y| {
        let lat = latitude_factor(y, h, climate.axial_tilt);
        let base = (lat * LATITUDE_WEIGHT + noise[y * w + x] * NOISE_WEIGHT)
            / (LATITUDE_WEIGHT + NOISE_WEIGHT)
            / climate.distance_to_sun;
        let cooling = altitude_factor(*elevation.get(x, y), thresholds.mountain_level, params);
        (base * cooling).max(0.0)
    })
}

/// Latitude, orbit, and altitude driven temperature.
#[derive(Clone, Copy, Debug, Default)]
pub struct TemperatureStage;

impl TemperatureStage {
    pub const NAME: &'static str = "temperature";
}

impl PipelineStage for TemperatureStage {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn execute(
        &self,
        ctx: &PipelineContext,
        iteration: u32,
    ) -> Result<PipelineContext, StageError> {
        let terrain = ctx.terrain()?;
        let thresholds = ctx.terrain_thresholds()?;
        let temperature = temperature_field(
            terrain,
            &thresholds,
            ctx.climate(),
            &ctx.params().temperature,
            ctx.seed(),
        );
        ensure_finite("temperature", &temperature)?;
        stage_event!(iteration, mean = temperature.mean(), "temperature computed");
        ctx.clone().with_temperature(Self::NAME, temperature)
    }
}
