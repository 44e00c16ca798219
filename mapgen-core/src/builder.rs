use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::context::PipelineContext;
use crate::error::{ConfigError, GenerationError};
use crate::params::{GenerationParams, PipelineMode};
use crate::scheduler::{
    CancellationToken, IterativePipeline, Orchestrator, SharedStage, SinglePassPipeline,
    StageSequence,
};
use crate::simulator::{NativePlateSimulator, PlateSimulator};
use crate::world::GeneratedWorld;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Topology {
    SinglePass,
    Iterative,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Preset {
    /// Single pass with erosion.
    FastPreview,
    /// Four erosion/climate rounds.
    HighQuality,
}

impl Preset {
    const HIGH_QUALITY_ITERATIONS: u32 = 4;
}

pub struct PipelineBuilder {
    simulator: Arc<dyn PlateSimulator>,
    topology: Topology,
    iterations: u32,
    erosion: bool,
    stages: Option<Vec<SharedStage>>,
    cancellation: CancellationToken,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            simulator: Arc::new(NativePlateSimulator),
            topology: Topology::SinglePass,
            iterations: 1,
            erosion: true,
            stages: None,
            cancellation: CancellationToken::new(),
        }
    }

    /// Topology and iteration count taken from the parameters record.
    pub fn from_params(params: &GenerationParams) -> Self {
        let builder = Self::new().iterations(params.iteration_count);
        match params.pipeline_mode {
            PipelineMode::SinglePass => builder.topology(Topology::SinglePass),
            PipelineMode::Iterative => builder.topology(Topology::Iterative),
        }
    }

    pub fn simulator(mut self, simulator: Arc<dyn PlateSimulator>) -> Self {
        self.simulator = simulator;
        self
    }

    pub fn topology(mut self, topology: Topology) -> Self {
        self.topology = topology;
        self
    }

    pub fn iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn erosion(mut self, enabled: bool) -> Self {
        self.erosion = enabled;
        self
    }

    pub fn preset(self, preset: Preset) -> Self {
        match preset {
            Preset::FastPreview => self.topology(Topology::SinglePass).erosion(true),
            Preset::HighQuality => self
                .topology(Topology::Iterative)
                .iterations(Preset::HIGH_QUALITY_ITERATIONS)
                .erosion(true),
        }
    }

    /// Replaces the topology with an explicit stage list, run once in order.
    /// The list must seed its own layers, usually by starting with
    /// [`crate::scheduler::foundation_stages`].
    pub fn stages(mut self, stages: Vec<SharedStage>) -> Self {
        self.stages = Some(stages);
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn build(self) -> Result<WorldPipeline, ConfigError> {
        let orchestrator: Arc<dyn Orchestrator> = match (self.stages, self.topology) {
            (Some(stages), _) if stages.is_empty() => {
                return Err(ConfigError::invalid("stages", "stage list is empty"));
            }
            (Some(stages), _) => Arc::new(StageSequence::new(stages)),
            (None, Topology::SinglePass) => {
                Arc::new(SinglePassPipeline::new(self.simulator, self.erosion))
            }
            (None, Topology::Iterative) if self.iterations == 0 => {
                return Err(ConfigError::NoIterations);
            }
            (None, Topology::Iterative) => Arc::new(IterativePipeline::new(
                self.simulator,
                self.iterations,
                self.erosion,
            )),
        };
        Ok(WorldPipeline {
            orchestrator,
            cancellation: self.cancellation,
        })
    }
}

#[derive(Clone)]
pub struct WorldPipeline {
    orchestrator: Arc<dyn Orchestrator>,
    cancellation: CancellationToken,
}

impl WorldPipeline {
    pub fn orchestrator_name(&self) -> &'static str {
        self.orchestrator.name()
    }

    /// Token that cancels this pipeline's runs between stages.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Validates `params`, then runs the whole chain. Invalid parameters
    /// fail here, before any stage or simulator runs.
    pub fn generate(&self, params: &GenerationParams) -> Result<GeneratedWorld, GenerationError> {
        params.validate()?;
        let started = Instant::now();
        let climate = params.climate_params();
        info!(
            seed = params.seed,
            map_size = params.map_size,
            plate_count = params.plate_count,
            orchestrator = self.orchestrator.name(),
            axial_tilt = climate.axial_tilt,
            distance_to_sun = climate.distance_to_sun,
            "generating world"
        );

        let ctx = PipelineContext::new(Arc::new(params.clone()), climate);
        let run = self.orchestrator.run(ctx, &self.cancellation)?;
        let world = GeneratedWorld::from_context(&run.context, run.timings).map_err(|source| {
            GenerationError::Stage {
                stage: "output",
                source,
            }
        })?;

        info!(
            checksum = %world.diagnostics.checksum,
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            "world generated"
        );
        Ok(world)
    }
}

/// Generates a world with the topology the parameters ask for and the native
/// plate simulator.
pub fn generate_world(params: &GenerationParams) -> Result<GeneratedWorld, GenerationError> {
    PipelineBuilder::from_params(params).build()?.generate(params)
}
