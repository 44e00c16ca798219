use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{ensure_finite, PipelineStage};
use crate::context::PipelineContext;
use crate::error::StageError;
use crate::grid::Grid2D;
use crate::rng::{stream_rng, Stream};
use crate::thresholds::{sorted_sample, PrecipitationThresholds, TemperatureThresholds};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldSummary {
    pub land_fraction: f32,
    pub mean_temperature: f32,
    pub mean_precipitation: f32,
}

/// Values of `grid` on cells where `ocean_mask` is false, or every value when
/// the world has no land.
pub fn land_values(grid: &Grid2D<f32>, ocean_mask: &Grid2D<bool>) -> Vec<f32> {
    let land: Vec<f32> = grid
        .as_slice()
        .iter()
        .zip(ocean_mask.as_slice())
        .filter(|&(_, &ocean)| !ocean)
        .map(|(&v, _)| v)
        .collect();
    if land.is_empty() {
        grid.as_slice().to_vec()
    } else {
        land
    }
}

/// Final thresholds and statistics, plus a finiteness check over every
/// float layer the pipeline produced.
#[derive(Clone, Copy, Debug, Default)]
pub struct AnalysisStage;

impl AnalysisStage {
    pub const NAME: &'static str = "analysis";
}

impl PipelineStage for AnalysisStage {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn execute(
        &self,
        ctx: &PipelineContext,
        iteration: u32,
    ) -> Result<PipelineContext, StageError> {
        let float_layers = [
            ("original_elevation", ctx.original_elevation()),
            ("elevation", ctx.elevation()),
            ("eroded_elevation", ctx.eroded_elevation()),
            ("temperature", ctx.temperature()),
            ("base_precipitation", ctx.base_precipitation()),
            ("rain_shadow_factor", ctx.rain_shadow_factor()),
            ("shadowed_precipitation", ctx.shadowed_precipitation()),
            ("precipitation", ctx.precipitation()),
        ];
        for (name, layer) in float_layers {
            if let Some(grid) = layer {
                ensure_finite(name, grid)?;
            }
        }

        let temperature = ctx.require_temperature()?;
        let precipitation = ctx.require_precipitation()?;
        let ocean_mask = ctx.require_ocean_mask()?;
        let sample_count = ctx.params().elevation.sample_count;
        let mut rng = stream_rng(ctx.seed(), Stream::AnalysisSampling);

        let land_cells = ocean_mask.as_slice().iter().filter(|&&o| !o).count();
        if land_cells == 0 {
            warn!("no land cells, precipitation thresholds use the whole map");
        }
        let land_precipitation = land_values(precipitation, ocean_mask);
        let precip_sample = sorted_sample(&land_precipitation, sample_count, &mut rng);
        let precipitation_thresholds = PrecipitationThresholds::from_sorted(&precip_sample)?;
        let temp_sample = sorted_sample(temperature.as_slice(), sample_count, &mut rng);
        let temperature_thresholds = TemperatureThresholds::from_sorted(&temp_sample)?;

        let summary = WorldSummary {
            land_fraction: land_cells as f32 / ocean_mask.len().max(1) as f32,
            mean_temperature: temperature.mean(),
            mean_precipitation: precipitation.mean(),
        };
        stage_event!(
            iteration,
            land_fraction = summary.land_fraction,
            mean_temperature = summary.mean_temperature,
            mean_precipitation = summary.mean_precipitation,
            "world analysed"
        );

        ctx.clone()
            .with_precipitation_thresholds(Self::NAME, precipitation_thresholds)?
            .with_temperature_thresholds(Self::NAME, temperature_thresholds)?
            .with_summary(Self::NAME, summary)
    }
}
