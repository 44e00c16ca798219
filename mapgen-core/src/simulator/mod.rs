//! Plate simulation strategies.
//!
//! The pipeline only sees [`PlateSimulator`]; the native library sits behind
//! [`NativePlateSimulator`], and tests or alternative algorithms can be
//! injected through the builder without touching any stage.

mod native;

pub use native::NativePlateSimulator;

use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::grid::Grid2D;

/// Everything that determines a simulation run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlateSimulationParams {
    pub seed: u64,
    pub width: usize,
    pub height: usize,
    pub plate_count: usize,
    pub ocean_ratio: f32,
    pub erosion_period: u32,
    pub folding_ratio: f32,
    pub cycle_count: u32,
    pub steps_per_cycle: u32,
    pub step_budget: u32,
}

#[derive(Clone, Debug)]
pub struct SimulationResult {
    /// RAW elevation units.
    pub heightmap: Grid2D<f32>,
    pub plate_ids: Grid2D<u32>,
    /// Native steps actually taken.
    pub steps: u32,
}

pub trait PlateSimulator: Send + Sync {
    fn name(&self) -> &str;

    /// Runs one simulation. Must be deterministic in `params`.
    fn generate(&self, params: &PlateSimulationParams) -> Result<SimulationResult, SimError>;
}
