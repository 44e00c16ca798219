//! Post-processing of the raw plate heightmap.
//!
//! Four steps, always in this order: quantile thresholds on the raw map,
//! Gaussian smoothing, an ocean flood fill from the map border, and a
//! harmonization pass that re-smooths the ocean floor and fills again.

use std::collections::VecDeque;

use tracing::warn;

use super::{ensure_finite, PipelineStage};
use crate::context::PipelineContext;
use crate::error::StageError;
use crate::grid::Grid2D;
use crate::params::ElevationParams;
use crate::rng::{stream_rng, Stream};
use crate::thresholds::{sorted_sample, ElevationThresholds};

const KERNEL_RADIUS: usize = 2;
const KERNEL_TAPS: usize = 2 * KERNEL_RADIUS + 1;

#[derive(Clone, Debug)]
pub struct PostProcessed {
    pub elevation: Grid2D<f32>,
    pub ocean_mask: Grid2D<bool>,
    pub thresholds: ElevationThresholds,
}

#[derive(Clone, Debug)]
pub struct ElevationPostProcessor {
    seed: u64,
    sample_count: usize,
    sigma: f32,
    flat_epsilon: f32,
}

impl ElevationPostProcessor {
    pub fn new(params: &ElevationParams, seed: u64) -> Self {
        Self {
            seed,
            sample_count: params.sample_count,
            sigma: params.smoothing_sigma,
            flat_epsilon: params.flat_epsilon,
        }
    }

    pub fn process(&self, heightmap: &Grid2D<f32>) -> Result<PostProcessed, StageError> {
        ensure_finite("original_elevation", heightmap)?;
        let thresholds = self.thresholds(heightmap)?;
        let smoothed = gaussian_smooth(heightmap, self.sigma)?;
        let first_pass = ocean_flood_fill(&smoothed, thresholds.sea_level);
        let elevation = harmonize_ocean_floor(&smoothed, &first_pass, self.sigma)?;
        let ocean_mask = ocean_flood_fill(&elevation, thresholds.sea_level);
        Ok(PostProcessed {
            elevation,
            ocean_mask,
            thresholds,
        })
    }

    /// Sea/hill/mountain/peak levels at the 50/75/90/98th percentiles of a
    /// seeded sample.
    pub fn thresholds(&self, elevation: &Grid2D<f32>) -> Result<ElevationThresholds, StageError> {
        let mut rng = stream_rng(self.seed, Stream::ElevationSampling);
        let sorted = sorted_sample(elevation.as_slice(), self.sample_count, &mut rng);
        if let (Some(lo), Some(hi)) = (sorted.first(), sorted.last()) {
            if hi - lo < self.flat_epsilon {
                warn!(
                    value = *lo,
                    "flat elevation sample, spreading thresholds by epsilon"
                );
            }
        }
        ElevationThresholds::from_sorted(&sorted, self.flat_epsilon)
    }
}

/// Normalized 5-tap Gaussian weights.
pub fn gaussian_kernel(sigma: f32) -> [f64; KERNEL_TAPS] {
    let s = f64::from(sigma.max(1e-3));
    let mut kernel = [0.0f64; KERNEL_TAPS];
    for (i, w) in kernel.iter_mut().enumerate() {
        let d = i as f64 - KERNEL_RADIUS as f64;
        *w = (-(d * d) / (2.0 * s * s)).exp();
    }
    let sum: f64 = kernel.iter().sum();
    kernel.map(|w| w / sum)
}

/// Separable Gaussian blur with clamped borders. Accumulates in `f64` and
/// clamps back into the finite `f32` range.
pub fn gaussian_smooth(grid: &Grid2D<f32>, sigma: f32) -> Result<Grid2D<f32>, StageError> {
    ensure_finite("elevation", grid)?;
    let kernel = gaussian_kernel(sigma);
    let (w, h) = grid.dimensions();
    let src: Vec<f64> = grid.as_slice().iter().map(|&v| f64::from(v)).collect();
    let tap = |i: usize, k: usize, len: usize| {
        (i + k).saturating_sub(KERNEL_RADIUS).min(len.saturating_sub(1))
    };

    let mut horizontal = vec![0.0f64; src.len()];
    for y in 0..h {
        for x in 0..w {
            horizontal[y * w + x] = kernel
                .iter()
                .enumerate()
                .map(|(k, weight)| weight * src[y * w + tap(x, k, w)])
                .sum();
        }
    }

    Ok(Grid2D::from_fn(w, h, |x, y| {
        let v: f64 = kernel
            .iter()
            .enumerate()
            .map(|(k, weight)| weight * horizontal[tap(y, k, h) * w + x])
            .sum();
        v.clamp(f64::from(f32::MIN), f64::from(f32::MAX)) as f32
    }))
}

/// Cells strictly below `sea_level` that connect to the map border through
/// 4-neighbours. Landlocked depressions stay land.
pub fn ocean_flood_fill(elevation: &Grid2D<f32>, sea_level: f32) -> Grid2D<bool> {
    let (w, h) = elevation.dimensions();
    let mut mask = Grid2D::new(w, h, false);
    let mut queue = VecDeque::new();
    for (x, y) in elevation.border_coords() {
        if *elevation.get(x, y) < sea_level {
            *mask.get_mut(x, y) = true;
            queue.push_back((x, y));
        }
    }
    while let Some((x, y)) = queue.pop_front() {
        for (nx, ny) in elevation.neighbors4(x, y) {
            if !*mask.get(nx, ny) && *elevation.get(nx, ny) < sea_level {
                *mask.get_mut(nx, ny) = true;
                queue.push_back((nx, ny));
            }
        }
    }
    mask
}

/// Re-smooths ocean cells only; land keeps its heights.
pub fn harmonize_ocean_floor(
    elevation: &Grid2D<f32>,
    ocean_mask: &Grid2D<bool>,
    sigma: f32,
) -> Result<Grid2D<f32>, StageError> {
    if ocean_mask.dimensions() != elevation.dimensions() {
        return Err(StageError::DimensionMismatch {
            layer: "ocean_mask",
            expected: elevation.dimensions(),
            actual: ocean_mask.dimensions(),
        });
    }
    let smoothed = gaussian_smooth(elevation, sigma)?;
    let (w, h) = elevation.dimensions();
    Ok(Grid2D::from_fn(w, h, |x, y| {
        if *ocean_mask.get(x, y) {
            *smoothed.get(x, y)
        } else {
            *elevation.get(x, y)
        }
    }))
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ElevationPostProcessStage;

impl ElevationPostProcessStage {
    pub const NAME: &'static str = "elevation-post-process";
}

impl PipelineStage for ElevationPostProcessStage {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn execute(
        &self,
        ctx: &PipelineContext,
        iteration: u32,
    ) -> Result<PipelineContext, StageError> {
        let raw = ctx.require_original_elevation()?;
        let processor = ElevationPostProcessor::new(&ctx.params().elevation, ctx.seed());
        let out = processor.process(raw)?;

        let ocean_cells = out.ocean_mask.as_slice().iter().filter(|&&o| o).count();
        if ocean_cells == 0 {
            warn!("no border-connected ocean after post-processing");
        }
        stage_event!(
            iteration,
            sea_level = out.thresholds.sea_level,
            peak_level = out.thresholds.peak_level,
            ocean_cells,
            "elevation post-processed"
        );

        ctx.clone()
            .with_elevation(Self::NAME, out.elevation)?
            .with_ocean_mask(Self::NAME, out.ocean_mask)?
            .with_thresholds(Self::NAME, out.thresholds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::test_support;

    #[test]
    fn kernel_is_normalized_and_symmetric() {
        let k = gaussian_kernel(1.0);
        assert!((k.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert_eq!(k[0], k[4]);
        assert_eq!(k[1], k[3]);
        assert!(k[2] > k[1] && k[1] > k[0]);
    }

    #[test]
    fn smoothing_keeps_constant_fields_and_dimensions() {
        let grid = Grid2D::new(7, 3, 1.25f32);
        let out = gaussian_smooth(&grid, 1.0).expect("smooth");
        assert_eq!(out.dimensions(), (7, 3));
        assert!(out.as_slice().iter().all(|&v| (v - 1.25).abs() < 1e-6));
    }

    #[test]
    fn smoothing_extreme_values_stays_finite() {
        let grid = Grid2D::from_fn(9, 9, |x, y| {
            if (x + y) % 2 == 0 {
                f32::MAX
            } else {
                f32::MIN
            }
        });
        let out = gaussian_smooth(&grid, 1.0).expect("smooth");
        assert!(out.first_non_finite().is_none());

        let big = Grid2D::new(4, 4, f32::MAX);
        let out = gaussian_smooth(&big, 0.5).expect("smooth");
        assert!(out.first_non_finite().is_none());
    }

    #[test]
    fn smoothing_rejects_non_finite_input() {
        let mut grid = Grid2D::new(4, 4, 0.0f32);
        *grid.get_mut(2, 1) = f32::INFINITY;
        let err = gaussian_smooth(&grid, 1.0).expect_err("inf");
        assert!(matches!(err, StageError::NonFinite { x: 2, y: 1, .. }));
    }

    #[test]
    fn flood_fill_skips_landlocked_water() {
        // Border ocean at 0.0, a ring of land at 2.0, a lake at 0.0 inside.
        let grid = Grid2D::from_fn(9, 9, |x, y| {
            let ring = x.abs_diff(4).max(y.abs_diff(4));
            match ring {
                0 => 0.0,
                1..=2 => 2.0,
                _ => 0.0,
            }
        });
        let mask = ocean_flood_fill(&grid, 1.0);
        assert!(*mask.get(0, 0));
        assert!(*mask.get(8, 4));
        assert!(!*mask.get(4, 4), "lake must not be ocean");
        assert!(!*mask.get(3, 4));
    }

    #[test]
    fn ocean_cells_are_below_sea_and_reach_the_border() {
        let params = test_support::params(48);
        let processor = ElevationPostProcessor::new(&params.elevation, 3);
        let out = processor
            .process(&test_support::island(48))
            .expect("process");
        let sea = out.thresholds.sea_level;

        let reach = ocean_flood_fill(&out.elevation, sea);
        for (x, y) in out.elevation.iter_coords() {
            if *out.ocean_mask.get(x, y) {
                assert!(*out.elevation.get(x, y) < sea);
            }
            assert_eq!(out.ocean_mask.get(x, y), reach.get(x, y));
        }
        assert!(*out.ocean_mask.get(0, 0));
        assert!(!*out.ocean_mask.get(24, 24));
    }

    #[test]
    fn thresholds_come_from_the_raw_map() {
        let params = test_support::params(32);
        let processor = ElevationPostProcessor::new(&params.elevation, 1);
        let raw = test_support::island(32);
        let out = processor.process(&raw).expect("process");
        let expected = processor.thresholds(&raw).expect("thresholds");
        assert_eq!(out.thresholds, expected);
    }

    #[test]
    fn flat_world_has_no_ocean_and_finite_thresholds() {
        let params = test_support::params(16);
        let processor = ElevationPostProcessor::new(&params.elevation, 1);
        let out = processor
            .process(&Grid2D::new(16, 16, 1.0))
            .expect("process");
        assert!(out.thresholds.levels().iter().all(|v| v.is_finite()));
        assert!(out.ocean_mask.as_slice().iter().all(|&o| !o));
    }

    #[test]
    fn stage_writes_its_layers() {
        let params = test_support::params(24);
        let climate = params.climate_params();
        let ctx = PipelineContext::new(std::sync::Arc::new(params), climate)
            .with_original_elevation("plate-simulation", test_support::island(24))
            .expect("seed");
        let out = ElevationPostProcessStage.execute(&ctx, 0).expect("stage");
        let owner = Some(ElevationPostProcessStage::NAME);
        assert_eq!(out.owner("elevation"), owner);
        assert_eq!(out.owner("ocean_mask"), owner);
        assert!(out.thresholds().is_some());
    }
}
