//! Orchestrators: the order in which stages run.
//!
//! Elevation and climate depend on each other through erosion. The two
//! topologies break that cycle differently: [`SinglePassPipeline`] computes
//! climate once from pre-erosion terrain, [`IterativePipeline`] alternates
//! erosion and climate a fixed number of times.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info_span, trace};

use crate::context::PipelineContext;
use crate::error::GenerationError;
use crate::simulator::PlateSimulator;
use crate::stages::{
    climate_stages, AnalysisStage, ElevationPostProcessStage, ErosionStage, PipelineStage,
    PlateSimulationStage,
};

pub type SharedStage = Arc<dyn PipelineStage>;

/// Cooperative cancellation, checked before every stage.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StageTiming {
    pub stage: String,
    pub iteration: u32,
    pub elapsed_ms: f64,
}

/// Wall-clock timer for one stage run.
pub struct StageTimer {
    stage: &'static str,
    iteration: u32,
    start: Instant,
}

impl StageTimer {
    pub fn start(stage: &'static str, iteration: u32) -> Self {
        Self {
            stage,
            iteration,
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    pub fn finish(self) -> StageTiming {
        StageTiming {
            stage: self.stage.to_string(),
            iteration: self.iteration,
            elapsed_ms: self.elapsed_ms(),
        }
    }
}

/// Final context of a run plus how long each stage took.
#[derive(Clone, Debug)]
pub struct PipelineRun {
    pub context: PipelineContext,
    pub timings: Vec<StageTiming>,
}

/// Runs one stage: cancellation check, span, timing, and error attribution.
pub fn run_stage(
    stage: &dyn PipelineStage,
    ctx: PipelineContext,
    iteration: u32,
    cancel: &CancellationToken,
    timings: &mut Vec<StageTiming>,
) -> Result<PipelineContext, GenerationError> {
    let name = stage.name();
    if cancel.is_cancelled() {
        debug!(stage = name, "cancelled");
        return Err(GenerationError::Cancelled { before: name });
    }
    let _span = info_span!("stage", name, iteration).entered();
    let timer = StageTimer::start(name, iteration);
    let next = stage
        .execute(&ctx, iteration)
        .map_err(|source| GenerationError::Stage {
            stage: name,
            source,
        })?;
    let timing = timer.finish();
    if iteration == 0 {
        debug!(elapsed_ms = timing.elapsed_ms, "stage finished");
    } else {
        trace!(elapsed_ms = timing.elapsed_ms, "stage finished");
    }
    timings.push(timing);
    Ok(next)
}

fn run_all(
    stages: &[SharedStage],
    mut ctx: PipelineContext,
    iteration: u32,
    cancel: &CancellationToken,
    timings: &mut Vec<StageTiming>,
) -> Result<PipelineContext, GenerationError> {
    for stage in stages {
        ctx = run_stage(stage.as_ref(), ctx, iteration, cancel, timings)?;
    }
    Ok(ctx)
}

pub trait Orchestrator: Send + Sync {
    fn name(&self) -> &'static str;

    fn run(
        &self,
        ctx: PipelineContext,
        cancel: &CancellationToken,
    ) -> Result<PipelineRun, GenerationError>;
}

/// Plate simulation followed by elevation post-processing.
pub fn foundation_stages(simulator: Arc<dyn PlateSimulator>) -> Vec<SharedStage> {
    vec![
        Arc::new(PlateSimulationStage::new(simulator)),
        Arc::new(ElevationPostProcessStage),
    ]
}

/// Foundation, climate once, optional erosion once, analysis.
#[derive(Clone)]
pub struct SinglePassPipeline {
    foundation: Vec<SharedStage>,
    climate: Vec<SharedStage>,
    erosion: Option<SharedStage>,
    analysis: SharedStage,
}

impl SinglePassPipeline {
    pub fn new(simulator: Arc<dyn PlateSimulator>, erosion: bool) -> Self {
        Self {
            foundation: foundation_stages(simulator),
            climate: climate_stages(),
            erosion: erosion.then(|| Arc::new(ErosionStage) as SharedStage),
            analysis: Arc::new(AnalysisStage),
        }
    }
}

impl Orchestrator for SinglePassPipeline {
    fn name(&self) -> &'static str {
        "single-pass"
    }

    fn run(
        &self,
        ctx: PipelineContext,
        cancel: &CancellationToken,
    ) -> Result<PipelineRun, GenerationError> {
        let mut timings = Vec::new();
        let ctx = run_all(&self.foundation, ctx, 0, cancel, &mut timings)?;
        let mut ctx = run_all(&self.climate, ctx, 0, cancel, &mut timings)?;
        if let Some(erosion) = &self.erosion {
            ctx = run_stage(erosion.as_ref(), ctx, 0, cancel, &mut timings)?;
        }
        let context = run_stage(self.analysis.as_ref(), ctx, 0, cancel, &mut timings)?;
        Ok(PipelineRun { context, timings })
    }
}

/// Foundation, then `iterations` rounds of optional erosion followed by
/// climate, then analysis.
#[derive(Clone)]
pub struct IterativePipeline {
    foundation: Vec<SharedStage>,
    climate: Vec<SharedStage>,
    erosion: Option<SharedStage>,
    analysis: SharedStage,
    iterations: u32,
}

impl IterativePipeline {
    pub fn new(simulator: Arc<dyn PlateSimulator>, iterations: u32, erosion: bool) -> Self {
        Self {
            foundation: foundation_stages(simulator),
            climate: climate_stages(),
            erosion: erosion.then(|| Arc::new(ErosionStage) as SharedStage),
            analysis: Arc::new(AnalysisStage),
            iterations,
        }
    }
}

impl Orchestrator for IterativePipeline {
    fn name(&self) -> &'static str {
        "iterative"
    }

    fn run(
        &self,
        ctx: PipelineContext,
        cancel: &CancellationToken,
    ) -> Result<PipelineRun, GenerationError> {
        let mut timings = Vec::new();
        let mut ctx = run_all(&self.foundation, ctx, 0, cancel, &mut timings)?;
        for iteration in 0..self.iterations {
            if let Some(erosion) = &self.erosion {
                ctx = run_stage(erosion.as_ref(), ctx, iteration, cancel, &mut timings)?;
            }
            ctx = run_all(&self.climate, ctx, iteration, cancel, &mut timings)?;
        }
        let context = run_stage(self.analysis.as_ref(), ctx, 0, cancel, &mut timings)?;
        Ok(PipelineRun { context, timings })
    }
}

/// A caller-chosen stage list, run once in order.
#[derive(Clone)]
pub struct StageSequence {
    stages: Vec<SharedStage>,
}

impl StageSequence {
    pub fn new(stages: Vec<SharedStage>) -> Self {
        Self { stages }
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }
}

impl Orchestrator for StageSequence {
    fn name(&self) -> &'static str {
        "sequence"
    }

    fn run(
        &self,
        ctx: PipelineContext,
        cancel: &CancellationToken,
    ) -> Result<PipelineRun, GenerationError> {
        let mut timings = Vec::new();
        let context = run_all(&self.stages, ctx, 0, cancel, &mut timings)?;
        Ok(PipelineRun { context, timings })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, StageError};
    use crate::stages::test_support;

    struct Fails;

    impl PipelineStage for Fails {
        fn name(&self) -> &'static str {
            "fails"
        }

        fn execute(&self, _: &PipelineContext, _: u32) -> Result<PipelineContext, StageError> {
            Err(StageError::MissingLayer("anything"))
        }
    }

    struct CancelsAfter(CancellationToken);

    impl PipelineStage for CancelsAfter {
        fn name(&self) -> &'static str {
            "cancels"
        }

        fn execute(&self, ctx: &PipelineContext, _: u32) -> Result<PipelineContext, StageError> {
            self.0.cancel();
            Ok(ctx.clone())
        }
    }

    fn terrain() -> PipelineContext {
        test_support::terrain_context(test_support::params(24), test_support::island(24))
    }

    #[test]
    fn stage_errors_carry_the_stage_name() {
        let seq = StageSequence::new(vec![Arc::new(Fails)]);
        let err = seq.run(terrain(), &CancellationToken::new()).expect_err("fails");
        assert_eq!(err.stage(), Some("fails"));
        assert_eq!(err.kind(), ErrorKind::StageExecutionError);
    }

    #[test]
    fn cancellation_stops_before_the_next_stage() {
        let token = CancellationToken::new();
        let seq = StageSequence::new(vec![
            Arc::new(CancelsAfter(token.clone())),
            Arc::new(Fails),
        ]);
        let err = seq.run(terrain(), &token).expect_err("cancelled");
        assert!(matches!(
            err,
            GenerationError::Cancelled { before: "fails" }
        ));
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn sequence_records_one_timing_per_stage() {
        let seq = StageSequence::new(climate_stages());
        let run = seq.run(terrain(), &CancellationToken::new()).expect("climate");
        let names: Vec<&str> = run.timings.iter().map(|t| t.stage.as_str()).collect();
        assert_eq!(names, seq.stage_names());
        assert!(run.context.precipitation().is_some());
    }

    #[test]
    fn overwriting_a_foreign_layer_fails_the_run() {
        struct Hijack;

        impl PipelineStage for Hijack {
            fn name(&self) -> &'static str {
                "hijack"
            }

            fn execute(
                &self,
                ctx: &PipelineContext,
                _: u32,
            ) -> Result<PipelineContext, StageError> {
                let (w, h) = ctx.dimensions();
                ctx.clone().with_elevation(self.name(), crate::grid::Grid2D::new(w, h, 0.0))
            }
        }

        let seq = StageSequence::new(vec![Arc::new(Hijack)]);
        let err = seq.run(terrain(), &CancellationToken::new()).expect_err("conflict");
        assert!(matches!(
            err,
            GenerationError::Stage {
                stage: "hijack",
                source: StageError::LayerConflict { .. }
            }
        ));
    }
}
