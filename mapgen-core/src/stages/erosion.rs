//! Land-only hydraulic and thermal erosion.
//!
//! Each round routes rain downhill along D8 steepest descent, accumulates it
//! into discharge, carves or deposits by stream power, then relaxes slopes.
//! Ocean cells are never touched and land never sinks below sea level.

use super::{ensure_finite, PipelineStage};
use crate::context::PipelineContext;
use crate::error::StageError;
use crate::grid::Grid2D;
use crate::params::ErosionParams;
use crate::rng::{hash_2d, seed_offset, stream_rng, Stream};
use crate::thresholds::ElevationThresholds;

const DIRS: [(isize, isize); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

const NO_FLOW: u8 = 255;
const UNIFORM_RAINFALL: f32 = 0.5;

fn step_length(dx: isize, dy: isize) -> f32 {
    if dx != 0 && dy != 0 {
        std::f32::consts::SQRT_2
    } else {
        1.0
    }
}

fn neighbor(
    grid: &Grid2D<f32>,
    x: usize,
    y: usize,
    (dx, dy): (isize, isize),
) -> Option<(usize, usize)> {
    let nx = x as isize + dx;
    let ny = y as isize + dy;
    grid.in_bounds(nx, ny).then_some((nx as usize, ny as usize))
}

/// One erosion pass over `elevation`. Only cells outside `ocean_mask` move.
pub fn erode(
    elevation: &Grid2D<f32>,
    ocean_mask: &Grid2D<bool>,
    rainfall: &Grid2D<f32>,
    sea_level: f32,
    params: &ErosionParams,
    seed: u64,
) -> Grid2D<f32> {
    let mut heights = elevation.clone();
    let floor = elevation.map(|&h| h.min(sea_level));
    let tie_seed = seed_offset(seed, Stream::ErosionTieBreak as u64);

    fill_depressions(&mut heights, ocean_mask, sea_level);
    for _ in 0..params.iterations {
        let flow_dir = compute_flow_d8(&heights, tie_seed);
        let discharge = compute_accumulation(&heights, rainfall);
        apply_hydraulic_erosion(
            &mut heights,
            ocean_mask,
            &flow_dir,
            &discharge,
            rainfall,
            &floor,
            params,
        );
        apply_thermal_relaxation(&mut heights, ocean_mask, &floor, params.thermal_rate);
    }
    heights
}

fn fill_depressions(heights: &mut Grid2D<f32>, ocean_mask: &Grid2D<bool>, sea_level: f32) {
    let epsilon = 1e-5;
    for _ in 0..8 {
        let mut changed = false;
        for y in 1..heights.height().saturating_sub(1) {
            for x in 1..heights.width().saturating_sub(1) {
                let cur = *heights.get(x, y);
                if *ocean_mask.get(x, y) || cur <= sea_level {
                    continue;
                }
                let min_nb = DIRS
                    .iter()
                    .filter_map(|&d| neighbor(heights, x, y, d))
                    .map(|(nx, ny)| *heights.get(nx, ny))
                    .fold(f32::MAX, f32::min);
                if cur < min_nb {
                    *heights.get_mut(x, y) = min_nb + epsilon;
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }
}

fn compute_flow_d8(heights: &Grid2D<f32>, tie_seed: u64) -> Grid2D<u8> {
    Grid2D::from_fn(heights.width(), heights.height(), |x, y| {
        let h = *heights.get(x, y);
        let mut best_metric = 0.0f32;
        let mut best_dir = NO_FLOW;
        let mut best_tie = 0.0f32;

        for (i, &(dx, dy)) in DIRS.iter().enumerate() {
            let Some((nx, ny)) = neighbor(heights, x, y, (dx, dy)) else {
                continue;
            };
            let drop = h - *heights.get(nx, ny);
            if drop <= 0.0 {
                continue;
            }
            let metric = drop / step_length(dx, dy);
            let tie = hash_2d(tie_seed, nx as i32 + i as i32, ny as i32 - i as i32);
            let tied = (metric - best_metric).abs() <= 1e-8;
            if metric > best_metric + 1e-8 || (tied && tie > best_tie) {
                best_metric = metric;
                best_tie = tie;
                best_dir = i as u8;
            }
        }
        best_dir
    })
}

/// Multiple-flow accumulation of rainfall, highest cells first.
fn compute_accumulation(heights: &Grid2D<f32>, rainfall: &Grid2D<f32>) -> Grid2D<f32> {
    let mut accumulation = rainfall.clone();
    let mut order: Vec<(usize, usize)> = heights.iter_coords().collect();
    order.sort_by(|a, b| heights.get(b.0, b.1).total_cmp(heights.get(a.0, a.1)));

    for (x, y) in order {
        let h = *heights.get(x, y);
        let q = *accumulation.get(x, y);

        let mut targets = [(0usize, 0usize, 0.0f32); 8];
        let mut n_targets = 0usize;
        let mut wsum = 0.0f32;
        for &(dx, dy) in &DIRS {
            let Some((nx, ny)) = neighbor(heights, x, y, (dx, dy)) else {
                continue;
            };
            let drop = h - *heights.get(nx, ny);
            if drop <= 0.0 {
                continue;
            }
            let w = (drop / step_length(dx, dy)).powf(1.15);
            targets[n_targets] = (nx, ny, w);
            n_targets += 1;
            wsum += w;
        }
        if n_targets == 0 || wsum <= 0.0 {
            continue;
        }
        for &(nx, ny, w) in &targets[..n_targets] {
            *accumulation.get_mut(nx, ny) += q * (w / wsum);
        }
    }
    accumulation
}

fn apply_hydraulic_erosion(
    heights: &mut Grid2D<f32>,
    ocean_mask: &Grid2D<bool>,
    flow_dir: &Grid2D<u8>,
    discharge: &Grid2D<f32>,
    rainfall: &Grid2D<f32>,
    floor: &Grid2D<f32>,
    params: &ErosionParams,
) {
    let mut delta = Grid2D::new(heights.width(), heights.height(), 0.0f32);

    for (x, y) in heights.iter_coords() {
        let dir = *flow_dir.get(x, y);
        if dir == NO_FLOW || *ocean_mask.get(x, y) {
            continue;
        }
        let Some((nx, ny)) = neighbor(heights, x, y, DIRS[usize::from(dir)]) else {
            continue;
        };
        let slope = (*heights.get(x, y) - *heights.get(nx, ny)).max(0.0);
        if slope < params.min_slope {
            continue;
        }

        let capacity = discharge.get(x, y).sqrt() * slope * 0.08;
        let sediment = *rainfall.get(x, y) * 0.4;
        if sediment < capacity {
            let carved = (capacity - sediment) * params.erosion_rate;
            *delta.get_mut(x, y) -= carved;
            if !*ocean_mask.get(nx, ny) {
                *delta.get_mut(nx, ny) += carved * params.deposition_rate;
            }
        } else {
            *delta.get_mut(x, y) += (sediment - capacity) * params.deposition_rate;
        }
    }

    for (x, y) in delta.iter_coords() {
        if *ocean_mask.get(x, y) {
            continue;
        }
        let h = heights.get_mut(x, y);
        *h = (*h + *delta.get(x, y)).max(*floor.get(x, y));
    }
}

fn apply_thermal_relaxation(
    heights: &mut Grid2D<f32>,
    ocean_mask: &Grid2D<bool>,
    floor: &Grid2D<f32>,
    rate: f32,
) {
    let mut out = heights.clone();
    for y in 1..heights.height().saturating_sub(1) {
        for x in 1..heights.width().saturating_sub(1) {
            if *ocean_mask.get(x, y) {
                continue;
            }
            let h = *heights.get(x, y);
            let sum: f32 = DIRS
                .iter()
                .filter_map(|&d| neighbor(heights, x, y, d))
                .map(|(nx, ny)| *heights.get(nx, ny))
                .sum();
            let avg = sum / DIRS.len() as f32;
            *out.get_mut(x, y) = (h + (avg - h) * rate).max(*floor.get(x, y));
        }
    }
    *heights = out;
}

/// Erodes the current terrain with the latest rainfall. Runs again on every
/// feedback pass, each time starting from its own previous output.
#[derive(Clone, Copy, Debug, Default)]
pub struct ErosionStage;

impl ErosionStage {
    pub const NAME: &'static str = "erosion";
}

impl PipelineStage for ErosionStage {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn execute(
        &self,
        ctx: &PipelineContext,
        iteration: u32,
    ) -> Result<PipelineContext, StageError> {
        let terrain = ctx.terrain()?;
        let ocean_mask = ctx.require_ocean_mask()?;
        let sea_level = ctx.require_thresholds()?.sea_level;
        let params = ctx.params();

        let uniform;
        let rainfall = match ctx.precipitation() {
            Some(p) => p,
            None => {
                uniform = Grid2D::new(terrain.width(), terrain.height(), UNIFORM_RAINFALL);
                &uniform
            }
        };

        let eroded = erode(
            terrain,
            ocean_mask,
            rainfall,
            sea_level,
            &params.erosion,
            ctx.seed(),
        );
        ensure_finite("eroded_elevation", &eroded)?;
        let thresholds = ElevationThresholds::sample(
            &eroded,
            params.elevation.sample_count,
            params.elevation.flat_epsilon,
            &mut stream_rng(ctx.seed(), Stream::ErosionSampling),
        )?;

        let source = if ctx.precipitation().is_some() {
            "climate"
        } else {
            "uniform"
        };
        stage_event!(
            iteration,
            rainfall = source,
            peak_level = thresholds.peak_level,
            "terrain eroded"
        );
        ctx.clone()
            .with_eroded_elevation(Self::NAME, eroded)?
            .with_eroded_thresholds(Self::NAME, thresholds)
    }
}
