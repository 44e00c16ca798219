use std::io;

use thiserror::Error;

use crate::params::MAX_MAP_SIZE;

/// Invalid generation parameters. Always raised before the simulator runs.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("map size must be positive, got {0}")]
    MapSize(i32),
    #[error("map size {0} exceeds the supported maximum of {max}", max = MAX_MAP_SIZE)]
    MapTooLarge(i32),
    #[error("plate count must be positive, got {0}")]
    PlateCount(i32),
    #[error("plate count {plates} exceeds the {cells} cells of the map")]
    TooManyPlates { plates: i32, cells: usize },
    #[error("iterative pipeline needs at least one iteration")]
    NoIterations,
    #[error("invalid parameter `{name}`: {reason}")]
    Invalid { name: &'static str, reason: String },
    #[error("failed to read parameters: {0}")]
    Io(#[from] io::Error),
    #[error("failed to parse parameters: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            name,
            reason: reason.into(),
        }
    }
}

/// Failures on the native simulation boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SimError {
    #[error("native simulation rejected its parameters")]
    NativeCreateFailed,
    #[error("simulation parameters do not fit the native ABI: {0}")]
    InvalidDimensions(String),
    #[error("native step {step} failed with code {code}")]
    StepFailed { step: u32, code: i32 },
    #[error("native simulation did not settle within {steps} steps")]
    NonConvergence { steps: u32 },
    #[error("native {buffer} buffer is null")]
    NullBuffer { buffer: &'static str },
    #[error("native {buffer} buffer holds {actual} values, expected {expected}")]
    MarshalSizeMismatch {
        buffer: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// A stage found its inputs or outputs in a state it cannot accept.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StageError {
    #[error("required layer `{0}` is missing")]
    MissingLayer(&'static str),
    #[error("layer `{layer}` is {actual:?}, expected {expected:?}")]
    DimensionMismatch {
        layer: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },
    #[error("layer `{layer}` belongs to stage `{owner}`, `{writer}` may not overwrite it")]
    LayerConflict {
        layer: &'static str,
        owner: &'static str,
        writer: &'static str,
    },
    #[error("layer `{layer}` holds non-finite value {value} at ({x}, {y})")]
    NonFinite {
        layer: &'static str,
        x: usize,
        y: usize,
        value: f32,
    },
    #[error("threshold invariant violated: {0}")]
    Thresholds(String),
    #[error(transparent)]
    Simulation(#[from] SimError),
}

/// Coarse classification of a [`GenerationError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    ConfigurationError,
    NativeSimulationError,
    StageExecutionError,
    Cancelled,
}

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error("stage `{stage}` failed: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: StageError,
    },
    #[error("generation cancelled before stage `{before}`")]
    Cancelled { before: &'static str },
}

impl GenerationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::ConfigurationError,
            Self::Stage {
                source: StageError::Simulation(_),
                ..
            } => ErrorKind::NativeSimulationError,
            Self::Stage { .. } => ErrorKind::StageExecutionError,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// Name of the stage that failed, if a stage failed.
    pub fn stage(&self) -> Option<&'static str> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulation_failures_classify_as_native() {
        let err = GenerationError::Stage {
            stage: "plate-simulation",
            source: StageError::Simulation(SimError::NonConvergence { steps: 4 }),
        };
        assert_eq!(err.kind(), ErrorKind::NativeSimulationError);
        assert_eq!(err.stage(), Some("plate-simulation"));
        assert!(err.to_string().contains("plate-simulation"));
    }

    #[test]
    fn config_failures_have_no_stage() {
        let err = GenerationError::from(ConfigError::PlateCount(0));
        assert_eq!(err.kind(), ErrorKind::ConfigurationError);
        assert_eq!(err.stage(), None);
    }
}
