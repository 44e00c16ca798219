use std::sync::Arc;

use super::{ensure_finite, PipelineStage};
use crate::context::PipelineContext;
use crate::error::StageError;
use crate::simulator::PlateSimulator;

/// Runs the injected plate simulator and seeds the context with its raw
/// heightmap and plate ids.
#[derive(Clone)]
pub struct PlateSimulationStage {
    simulator: Arc<dyn PlateSimulator>,
}

impl PlateSimulationStage {
    pub const NAME: &'static str = "plate-simulation";

    pub fn new(simulator: Arc<dyn PlateSimulator>) -> Self {
        Self { simulator }
    }
}

impl PipelineStage for PlateSimulationStage {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn execute(
        &self,
        ctx: &PipelineContext,
        iteration: u32,
    ) -> Result<PipelineContext, StageError> {
        let params = ctx.params().plate_simulation();
        let result = self.simulator.generate(&params)?;
        ensure_finite("original_elevation", &result.heightmap)?;
        stage_event!(
            iteration,
            simulator = self.simulator.name(),
            steps = result.steps,
            "plates simulated"
        );
        ctx.clone()
            .with_original_elevation(Self::NAME, result.heightmap)?
            .with_plate_ids(Self::NAME, result.plate_ids)
    }
}
