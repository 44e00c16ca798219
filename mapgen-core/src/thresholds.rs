//! Quantile thresholds sampled per world.
//!
//! Absolute cut-offs cannot classify both a water world and a pangaea, so
//! every threshold here is a percentile of a random sample of the map it
//! describes.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::StageError;
use crate::grid::Grid2D;
use crate::units;

/// Sorted sample of `values`: all of them when there are at most
/// `sample_count`, otherwise `sample_count` uniform draws with replacement.
pub fn sorted_sample(values: &[f32], sample_count: usize, rng: &mut impl Rng) -> Vec<f32> {
    let mut sample = if values.len() <= sample_count {
        values.to_vec()
    } else {
        (0..sample_count)
            .map(|_| values[rng.random_range(0..values.len())])
            .collect()
    };
    sample.sort_by(f32::total_cmp);
    sample
}

/// Nearest-rank percentile of a sorted, non-empty slice; `p` in `[0, 1]`.
pub fn percentile(sorted: &[f32], p: f32) -> f32 {
    let last = sorted.len().saturating_sub(1);
    let rank = ((last as f32) * p.clamp(0.0, 1.0)).round() as usize;
    sorted[rank.min(last)]
}

fn ensure_sample(sorted: &[f32], what: &str) -> Result<(), StageError> {
    match sorted.iter().find(|v| !v.is_finite()) {
        _ if sorted.is_empty() => Err(StageError::Thresholds(format!("no {what} samples"))),
        Some(v) => Err(StageError::Thresholds(format!(
            "non-finite {what} sample {v}"
        ))),
        None => Ok(()),
    }
}

fn ensure_ascending(levels: &[f32], what: &str) -> Result<(), StageError> {
    if levels.windows(2).all(|w| w[0] <= w[1]) {
        Ok(())
    } else {
        Err(StageError::Thresholds(format!(
            "{what} thresholds are not ascending: {levels:?}"
        )))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ElevationThresholds {
    pub sea_level: f32,
    pub hill_level: f32,
    pub mountain_level: f32,
    pub peak_level: f32,
}

impl ElevationThresholds {
    pub const SEA_PERCENTILE: f32 = 0.50;
    pub const HILL_PERCENTILE: f32 = 0.75;
    pub const MOUNTAIN_PERCENTILE: f32 = 0.90;
    pub const PEAK_PERCENTILE: f32 = 0.98;

    pub fn sample(
        elevation: &Grid2D<f32>,
        sample_count: usize,
        flat_epsilon: f32,
        rng: &mut impl Rng,
    ) -> Result<Self, StageError> {
        let sorted = sorted_sample(elevation.as_slice(), sample_count, rng);
        Self::from_sorted(&sorted, flat_epsilon)
    }

    pub fn from_sorted(sorted: &[f32], flat_epsilon: f32) -> Result<Self, StageError> {
        ensure_sample(sorted, "elevation")?;
        let lo = sorted[0];
        let hi = sorted[sorted.len() - 1];
        let thresholds = if hi - lo < flat_epsilon {
            Self::flat(percentile(sorted, 0.5), flat_epsilon)
        } else {
            Self {
                sea_level: percentile(sorted, Self::SEA_PERCENTILE),
                hill_level: percentile(sorted, Self::HILL_PERCENTILE),
                mountain_level: percentile(sorted, Self::MOUNTAIN_PERCENTILE),
                peak_level: percentile(sorted, Self::PEAK_PERCENTILE),
            }
        };
        ensure_ascending(&thresholds.levels(), "elevation")?;
        Ok(thresholds)
    }

    /// Evenly spread levels around a single elevation.
    pub fn flat(value: f32, epsilon: f32) -> Self {
        Self {
            sea_level: value - 1.5 * epsilon,
            hill_level: value - 0.5 * epsilon,
            mountain_level: value + 0.5 * epsilon,
            peak_level: value + 1.5 * epsilon,
        }
    }

    pub fn levels(&self) -> [f32; 4] {
        [
            self.sea_level,
            self.hill_level,
            self.mountain_level,
            self.peak_level,
        ]
    }

    pub fn sea_level_metres(&self) -> f32 {
        units::raw_to_metres(self.sea_level)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PrecipitationThresholds {
    pub low: f32,
    pub medium: f32,
    pub high: f32,
}

impl PrecipitationThresholds {
    pub fn from_sorted(sorted: &[f32]) -> Result<Self, StageError> {
        ensure_sample(sorted, "precipitation")?;
        let t = Self {
            low: percentile(sorted, 0.25),
            medium: percentile(sorted, 0.50),
            high: percentile(sorted, 0.75),
        };
        ensure_ascending(&[t.low, t.medium, t.high], "precipitation")?;
        Ok(t)
    }
}

/// Upper bounds of the temperature bands, coldest first.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TemperatureThresholds {
    pub polar: f32,
    pub alpine: f32,
    pub boreal: f32,
    pub cool: f32,
    pub warm: f32,
    pub subtropical: f32,
}

impl TemperatureThresholds {
    const PERCENTILES: [f32; 6] = [0.126, 0.235, 0.406, 0.561, 0.634, 0.876];

    pub fn from_sorted(sorted: &[f32]) -> Result<Self, StageError> {
        ensure_sample(sorted, "temperature")?;
        let [polar, alpine, boreal, cool, warm, subtropical] =
            Self::PERCENTILES.map(|p| percentile(sorted, p));
        ensure_ascending(
            &[polar, alpine, boreal, cool, warm, subtropical],
            "temperature",
        )?;
        Ok(Self {
            polar,
            alpine,
            boreal,
            cool,
            warm,
            subtropical,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::{stream_rng, Stream};

    #[test]
    fn quantiles_of_a_ramp() {
        let values: Vec<f32> = (0..=100).map(|v| v as f32).collect();
        let t = ElevationThresholds::from_sorted(&values, 1e-3).expect("thresholds");
        assert_eq!(t.sea_level, 50.0);
        assert_eq!(t.hill_level, 75.0);
        assert_eq!(t.mountain_level, 90.0);
        assert_eq!(t.peak_level, 98.0);
    }

    #[test]
    fn flat_world_spreads_by_epsilon() {
        let grid = Grid2D::new(16, 16, 0.7f32);
        let mut rng = stream_rng(1, Stream::ElevationSampling);
        let t = ElevationThresholds::sample(&grid, 64, 0.01, &mut rng).expect("thresholds");
        assert!(t.levels().iter().all(|v| v.is_finite()));
        assert!(t.sea_level < t.hill_level);
        assert!(t.hill_level < t.mountain_level);
        assert!(t.mountain_level < t.peak_level);
        assert!((t.peak_level - t.sea_level - 0.03).abs() < 1e-6);
    }

    #[test]
    fn sea_level_metres_is_zero_at_raw_sea_level() {
        let t = ElevationThresholds::flat(units::SEA_LEVEL_RAW, 0.0);
        assert_eq!(t.sea_level_metres(), 0.0);
        let low = ElevationThresholds::flat(0.5 * units::SEA_LEVEL_RAW, 0.0);
        assert!(low.sea_level_metres() < 0.0);
    }

    #[test]
    fn sampling_is_deterministic_and_ordered() {
        let grid = Grid2D::from_fn(200, 100, |x, y| ((x * 31 + y * 17) % 97) as f32 * 0.05);
        let a = ElevationThresholds::sample(
            &grid,
            1_000,
            1e-3,
            &mut stream_rng(9, Stream::ElevationSampling),
        )
        .expect("a");
        let b = ElevationThresholds::sample(
            &grid,
            1_000,
            1e-3,
            &mut stream_rng(9, Stream::ElevationSampling),
        )
        .expect("b");
        assert_eq!(a, b);
        assert!(a.levels().windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn empty_sample_is_an_error() {
        assert!(PrecipitationThresholds::from_sorted(&[]).is_err());
        assert!(ElevationThresholds::from_sorted(&[], 1e-3).is_err());
    }

    #[test]
    fn nan_sample_is_an_error() {
        let with_nan = TemperatureThresholds::from_sorted(&[0.1, f32::NAN]);
        assert!(with_nan.is_err());
    }

    #[test]
    fn temperature_bands_ascend() {
        let values: Vec<f32> = (0..1000).map(|v| v as f32 / 1000.0).collect();
        let t = TemperatureThresholds::from_sorted(&values).expect("bands");
        assert!(t.polar < t.alpine && t.warm < t.subtropical);
    }
}
