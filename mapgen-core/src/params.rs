use std::fs;
use std::path::Path;

use rand::Rng;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::rng::{stream_rng, Stream};
use crate::simulator::PlateSimulationParams;

pub const MAX_MAP_SIZE: i32 = 8192;

/// Converts a half width at half maximum into a standard deviation.
const HWHM_TO_SIGMA: f32 = 1.177_410_023;
const DISTANCE_TO_SUN_HWHM: f32 = 0.12;
const AXIAL_TILT_HWHM: f32 = 0.07;

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum PipelineMode {
    /// Climate is computed once, from pre-erosion terrain.
    #[default]
    SinglePass,
    /// Erosion and climate alternate `iteration_count` times.
    Iterative,
}

/// Per-world orbital parameters.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct ClimateParams {
    /// Shift of the thermal equator, as a fraction of the map height.
    pub axial_tilt: f32,
    /// Relative to an Earth-like orbit of `1.0`.
    pub distance_to_sun: f32,
}

impl ClimateParams {
    /// Draws both parameters from normal distributions seeded by the world seed.
    pub fn from_seed(seed: u64) -> Self {
        let mut rng = stream_rng(seed, Stream::Climate);
        let distance = Normal::new(1.0f32, DISTANCE_TO_SUN_HWHM / HWHM_TO_SIGMA)
            .map_or(1.0, |n| rng.sample(n))
            .max(0.1);
        let tilt = Normal::new(0.0f32, AXIAL_TILT_HWHM / HWHM_TO_SIGMA)
            .map_or(0.0, |n| rng.sample(n))
            .clamp(-0.5, 0.5);
        Self {
            axial_tilt: tilt,
            distance_to_sun: distance,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.axial_tilt.is_finite() && (-0.5..=0.5).contains(&self.axial_tilt)) {
            return Err(ConfigError::invalid(
                "climate.axial_tilt",
                format!("{} is outside [-0.5, 0.5]", self.axial_tilt),
            ));
        }
        if !(self.distance_to_sun.is_finite() && self.distance_to_sun > 0.0) {
            return Err(ConfigError::invalid(
                "climate.distance_to_sun",
                format!("{} is not a positive number", self.distance_to_sun),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlateParams {
    pub ocean_ratio: f32,
    pub erosion_period: u32,
    pub folding_ratio: f32,
    pub cycle_count: u32,
    pub steps_per_cycle: u32,
    /// Upper bound on native steps before the run counts as non-converged.
    pub step_budget: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ElevationParams {
    pub sample_count: usize,
    pub smoothing_sigma: f32,
    /// Threshold spread used when the sampled elevations are all equal.
    pub flat_epsilon: f32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TemperatureParams {
    pub octaves: u32,
    pub frequency: f32,
    /// Elevation above the mountain threshold, in sea-level units, over
    /// which cooling reaches its floor.
    pub altitude_cooling_range: f32,
    pub min_altitude_factor: f32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PrecipitationParams {
    pub octaves: u32,
    pub frequency: f32,
    pub gamma: f32,
    pub curve_bonus: f32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RainShadowParams {
    pub trace_distance: usize,
    pub blocking_per_cell: f32,
    pub min_retained: f32,
    /// Height an upwind cell must exceed the current one by, in sea-level units.
    pub margin: f32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CoastalParams {
    pub max_bonus: f32,
    /// Cells over which the bonus falls to `1/e`.
    pub decay_range: f32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErosionParams {
    pub iterations: u32,
    pub erosion_rate: f32,
    pub deposition_rate: f32,
    pub thermal_rate: f32,
    pub min_slope: f32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationParams {
    pub seed: u64,
    pub map_size: i32,
    pub plate_count: i32,
    /// Drawn from the seed when absent.
    pub climate: Option<ClimateParams>,
    pub pipeline_mode: PipelineMode,
    /// Ignored in single-pass mode.
    pub iteration_count: u32,
    /// Keep per-stage intermediate maps in the output.
    pub retain_intermediates: bool,
    pub plates: PlateParams,
    pub elevation: ElevationParams,
    pub temperature: TemperatureParams,
    pub precipitation: PrecipitationParams,
    pub rain_shadow: RainShadowParams,
    pub coastal: CoastalParams,
    pub erosion: ErosionParams,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            seed: 42,
            map_size: 512,
            plate_count: 10,
            climate: None,
            pipeline_mode: PipelineMode::SinglePass,
            iteration_count: 1,
            retain_intermediates: false,
            plates: PlateParams {
                ocean_ratio: 0.65,
                erosion_period: 60,
                folding_ratio: 0.02,
                cycle_count: 2,
                steps_per_cycle: 40,
                step_budget: 100,
            },
            elevation: ElevationParams {
                sample_count: 10_000,
                smoothing_sigma: 1.0,
                flat_epsilon: 1e-3,
            },
            temperature: TemperatureParams {
                octaves: 8,
                frequency: 8.0,
                altitude_cooling_range: 2.0,
                min_altitude_factor: 0.033,
            },
            precipitation: PrecipitationParams {
                octaves: 6,
                frequency: 6.0,
                gamma: 2.0,
                curve_bonus: 0.2,
            },
            rain_shadow: RainShadowParams {
                trace_distance: 20,
                blocking_per_cell: 0.05,
                min_retained: 0.2,
                margin: 0.15,
            },
            coastal: CoastalParams {
                max_bonus: 0.3,
                decay_range: 10.0,
            },
            erosion: ErosionParams {
                iterations: 6,
                erosion_rate: 0.035,
                deposition_rate: 0.02,
                thermal_rate: 0.015,
                min_slope: 0.0008,
            },
        }
    }
}

impl GenerationParams {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let params: Self = serde_json::from_str(json)?;
        params.validate()?;
        Ok(params)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json_str(&fs::read_to_string(path)?)
    }

    /// Side length in cells. Only meaningful after [`Self::validate`].
    pub fn side(&self) -> usize {
        usize::try_from(self.map_size).unwrap_or(0)
    }

    /// The explicit climate, or the one drawn from the seed.
    pub fn climate_params(&self) -> ClimateParams {
        self.climate
            .unwrap_or_else(|| ClimateParams::from_seed(self.seed))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.map_size <= 0 {
            return Err(ConfigError::MapSize(self.map_size));
        }
        if self.map_size > MAX_MAP_SIZE {
            return Err(ConfigError::MapTooLarge(self.map_size));
        }
        if self.plate_count <= 0 {
            return Err(ConfigError::PlateCount(self.plate_count));
        }
        let cells = self.side() * self.side();
        if usize::try_from(self.plate_count).map_or(true, |p| p > cells) {
            return Err(ConfigError::TooManyPlates {
                plates: self.plate_count,
                cells,
            });
        }
        if self.pipeline_mode == PipelineMode::Iterative && self.iteration_count == 0 {
            return Err(ConfigError::NoIterations);
        }
        if let Some(climate) = &self.climate {
            climate.validate()?;
        }

        let p = &self.plates;
        ensure_unit("plates.ocean_ratio", p.ocean_ratio)?;
        ensure_positive_u32("plates.erosion_period", p.erosion_period)?;
        ensure_non_negative("plates.folding_ratio", p.folding_ratio)?;
        ensure_positive_u32("plates.cycle_count", p.cycle_count)?;
        ensure_positive_u32("plates.steps_per_cycle", p.steps_per_cycle)?;
        ensure_positive_u32("plates.step_budget", p.step_budget)?;

        let e = &self.elevation;
        if e.sample_count == 0 {
            return Err(ConfigError::invalid(
                "elevation.sample_count",
                "must be positive",
            ));
        }
        ensure_positive("elevation.smoothing_sigma", e.smoothing_sigma)?;
        ensure_positive("elevation.flat_epsilon", e.flat_epsilon)?;

        let t = &self.temperature;
        ensure_positive("temperature.frequency", t.frequency)?;
        ensure_positive(
            "temperature.altitude_cooling_range",
            t.altitude_cooling_range,
        )?;
        ensure_unit("temperature.min_altitude_factor", t.min_altitude_factor)?;

        let pr = &self.precipitation;
        ensure_positive("precipitation.frequency", pr.frequency)?;
        ensure_positive("precipitation.gamma", pr.gamma)?;
        ensure_unit("precipitation.curve_bonus", pr.curve_bonus)?;

        let rs = &self.rain_shadow;
        ensure_unit("rain_shadow.blocking_per_cell", rs.blocking_per_cell)?;
        ensure_unit("rain_shadow.min_retained", rs.min_retained)?;
        ensure_non_negative("rain_shadow.margin", rs.margin)?;

        let c = &self.coastal;
        ensure_unit("coastal.max_bonus", c.max_bonus)?;
        ensure_positive("coastal.decay_range", c.decay_range)?;

        let er = &self.erosion;
        ensure_non_negative("erosion.erosion_rate", er.erosion_rate)?;
        ensure_non_negative("erosion.deposition_rate", er.deposition_rate)?;
        ensure_unit("erosion.thermal_rate", er.thermal_rate)?;
        ensure_non_negative("erosion.min_slope", er.min_slope)?;
        Ok(())
    }

    /// Native simulation parameters for this world. Assumes [`Self::validate`]
    /// has already passed.
    pub(crate) fn plate_simulation(&self) -> PlateSimulationParams {
        PlateSimulationParams {
            seed: self.seed,
            width: self.side(),
            height: self.side(),
            plate_count: usize::try_from(self.plate_count).unwrap_or(1),
            ocean_ratio: self.plates.ocean_ratio,
            erosion_period: self.plates.erosion_period,
            folding_ratio: self.plates.folding_ratio,
            cycle_count: self.plates.cycle_count,
            steps_per_cycle: self.plates.steps_per_cycle,
            step_budget: self.plates.step_budget,
        }
    }
}

fn ensure_positive(name: &'static str, v: f32) -> Result<(), ConfigError> {
    if v.is_finite() && v > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            name,
            format!("{v} is not a positive number"),
        ))
    }
}

fn ensure_non_negative(name: &'static str, v: f32) -> Result<(), ConfigError> {
    if v.is_finite() && v >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            name,
            format!("{v} is negative or not finite"),
        ))
    }
}

fn ensure_unit(name: &'static str, v: f32) -> Result<(), ConfigError> {
    if v.is_finite() && (0.0..=1.0).contains(&v) {
        Ok(())
    } else {
        Err(ConfigError::invalid(name, format!("{v} is outside [0, 1]")))
    }
}

fn ensure_positive_u32(name: &'static str, v: u32) -> Result<(), ConfigError> {
    if v > 0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(name, "must be positive"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        GenerationParams::default().validate().expect("defaults validate");
    }

    #[test]
    fn rejects_non_positive_map_and_plates() {
        let p = GenerationParams {
            map_size: 0,
            ..GenerationParams::default()
        };
        assert!(matches!(p.validate(), Err(ConfigError::MapSize(0))));

        let p = GenerationParams {
            plate_count: -3,
            ..GenerationParams::default()
        };
        assert!(matches!(p.validate(), Err(ConfigError::PlateCount(-3))));
    }

    #[test]
    fn iterative_mode_needs_iterations() {
        let p = GenerationParams {
            pipeline_mode: PipelineMode::Iterative,
            iteration_count: 0,
            ..GenerationParams::default()
        };
        assert!(matches!(p.validate(), Err(ConfigError::NoIterations)));
    }

    #[test]
    fn seeded_climate_is_stable_and_bounded() {
        for seed in 0..64 {
            let a = ClimateParams::from_seed(seed);
            assert_eq!(a, ClimateParams::from_seed(seed));
            assert!((-0.5..=0.5).contains(&a.axial_tilt));
            assert!(a.distance_to_sun >= 0.1);
        }
    }

    #[test]
    fn explicit_climate_wins() {
        let climate = ClimateParams {
            axial_tilt: 0.1,
            distance_to_sun: 0.9,
        };
        let p = GenerationParams {
            climate: Some(climate),
            ..GenerationParams::default()
        };
        assert_eq!(p.climate_params(), climate);
    }

    #[test]
    fn json_round_trip_keeps_seed() {
        let p = GenerationParams {
            seed: 7,
            map_size: 64,
            ..GenerationParams::default()
        };
        let json = serde_json::to_string(&p).expect("serialize");
        let back = GenerationParams::from_json_str(&json).expect("parse");
        assert_eq!(back.seed, 7);
        assert_eq!(back.map_size, 64);
    }

    #[test]
    fn json_with_bad_values_is_rejected() {
        let mut value = serde_json::to_value(GenerationParams::default()).expect("serialize");
        value["plate_count"] = serde_json::json!(0);
        let err = GenerationParams::from_json_str(&value.to_string());
        assert!(matches!(err, Err(ConfigError::PlateCount(0))));
    }
}
