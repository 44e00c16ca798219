use super::{ensure_finite, PipelineStage};
use crate::context::PipelineContext;
use crate::error::StageError;
use crate::grid::Grid2D;
use crate::noise::{normalize_in_place, normalized_field};
use crate::params::PrecipitationParams;
use crate::rng::{seed_offset, Stream};

/// Warm air holds more water: scales noise by normalized temperature.
pub fn temperature_curve(t: f32, params: &PrecipitationParams) -> f32 {
    t.clamp(0.0, 1.0).powf(params.gamma) * (1.0 - params.curve_bonus) + params.curve_bonus
}

pub fn base_precipitation(
    temperature: &Grid2D<f32>,
    params: &PrecipitationParams,
    seed: u64,
) -> Grid2D<f32> {
    let (w, h) = temperature.dimensions();
    let noise = normalized_field(
        seed_offset(seed, Stream::PrecipitationNoise as u64),
        w,
        h,
        params.octaves,
        params.frequency,
    );
    let mut t = temperature.clone();
    normalize_in_place(t.as_mut_slice());

    let mut out = Grid2D::from_fn(w, h, |x, y| {
        noise[t.idx(x, y)] * temperature_curve(*t.get(x, y), params)
    });
    normalize_in_place(out.as_mut_slice());
    out
}

#[derive(Clone, Copy, Debug, Default)]
pub struct BasePrecipitationStage;

impl BasePrecipitationStage {
    pub const NAME: &'static str = "base-precipitation";
}

impl PipelineStage for BasePrecipitationStage {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn execute(
        &self,
        ctx: &PipelineContext,
        iteration: u32,
    ) -> Result<PipelineContext, StageError> {
        let temperature = ctx.require_temperature()?;
        let precipitation =
            base_precipitation(temperature, &ctx.params().precipitation, ctx.seed());
        ensure_finite("base_precipitation", &precipitation)?;
        stage_event!(
            iteration,
            mean = precipitation.mean(),
            "base precipitation computed"
        );
        ctx.clone().with_base_precipitation(Self::NAME, precipitation)
    }
}
