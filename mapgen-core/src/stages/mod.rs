//! Pipeline stages. Each one reads a few layers from the context and returns
//! a new context with its own layers added on top.

/// `debug!` on the first pass, `trace!` on feedback passes.
macro_rules! stage_event {
    ($iteration:expr, $($arg:tt)+) => {
        if $iteration == 0 {
            tracing::debug!($($arg)+);
        } else {
            tracing::trace!($($arg)+);
        }
    };
}

pub mod analysis;
pub mod coastal;
pub mod elevation;
pub mod erosion;
pub mod plates;
pub mod precipitation;
pub mod rain_shadow;
pub mod temperature;

pub use analysis::{AnalysisStage, WorldSummary};
pub use coastal::CoastalMoistureStage;
pub use elevation::{ElevationPostProcessStage, ElevationPostProcessor, PostProcessed};
pub use erosion::ErosionStage;
pub use plates::PlateSimulationStage;
pub use precipitation::BasePrecipitationStage;
pub use rain_shadow::RainShadowStage;
pub use temperature::TemperatureStage;

use std::sync::Arc;

use crate::context::PipelineContext;
use crate::error::StageError;
use crate::grid::Grid2D;

pub trait PipelineStage: Send + Sync {
    fn name(&self) -> &'static str;

    /// Runs the stage. `iteration` is the feedback pass, `0` for the first
    /// or only one; it only changes how loudly the stage logs.
    fn execute(&self, ctx: &PipelineContext, iteration: u32) -> Result<PipelineContext, StageError>;
}

pub(crate) fn ensure_finite(layer: &'static str, grid: &Grid2D<f32>) -> Result<(), StageError> {
    match grid.first_non_finite() {
        Some((x, y, value)) => Err(StageError::NonFinite { layer, x, y, value }),
        None => Ok(()),
    }
}

/// The four climate stages in dependency order.
pub fn climate_stages() -> Vec<Arc<dyn PipelineStage>> {
    vec![
        Arc::new(TemperatureStage),
        Arc::new(BasePrecipitationStage),
        Arc::new(RainShadowStage),
        Arc::new(CoastalMoistureStage),
    ]
}
