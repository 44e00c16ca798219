//! Simulator doubles shared by the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use mapgen_core::grid::Grid2D;
use mapgen_core::rng::hash_2d;
use mapgen_core::{PlateSimulationParams, PlateSimulator, SimError, SimulationResult};

/// A seeded cone island with a little per-cell jitter. Counts its calls.
#[derive(Default)]
pub struct IslandSimulator {
    calls: AtomicUsize,
}

impl IslandSimulator {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PlateSimulator for IslandSimulator {
    fn name(&self) -> &str {
        "island"
    }

    fn generate(&self, p: &PlateSimulationParams) -> Result<SimulationResult, SimError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let c = (p.width as f32 - 1.0) / 2.0;
        let heightmap = Grid2D::from_fn(p.width, p.height, |x, y| {
            let dx = (x as f32 - c) / c.max(1.0);
            let dy = (y as f32 - c) / c.max(1.0);
            let cone = 2.6 * (1.0 - (dx * dx + dy * dy).sqrt());
            let jitter = hash_2d(p.seed, x as i32, y as i32) * 0.3;
            (cone + jitter).max(0.1)
        });
        let plate_ids = Grid2D::from_fn(p.width, p.height, |x, _| {
            (x * p.plate_count / p.width.max(1)) as u32
        });
        Ok(SimulationResult {
            heightmap,
            plate_ids,
            steps: 1,
        })
    }
}

/// Always fails like a native run that never settles.
#[derive(Default)]
pub struct StuckSimulator;

impl PlateSimulator for StuckSimulator {
    fn name(&self) -> &str {
        "stuck"
    }

    fn generate(&self, p: &PlateSimulationParams) -> Result<SimulationResult, SimError> {
        Err(SimError::NonConvergence {
            steps: p.step_budget,
        })
    }
}
