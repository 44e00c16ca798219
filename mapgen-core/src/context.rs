//! The immutable value threaded through the stage chain.
//!
//! Every layer remembers the stage that wrote it. A stage may rewrite its
//! own layers on later feedback passes but never another stage's, and every
//! grid must match the world's dimensions.

use std::sync::Arc;

use crate::error::StageError;
use crate::grid::Grid2D;
use crate::params::{ClimateParams, GenerationParams};
use crate::stages::analysis::WorldSummary;
use crate::thresholds::{ElevationThresholds, PrecipitationThresholds, TemperatureThresholds};

#[derive(Debug)]
struct Layer<T> {
    owner: &'static str,
    value: Arc<T>,
}

impl<T> Clone for Layer<T> {
    fn clone(&self) -> Self {
        Self {
            owner: self.owner,
            value: Arc::clone(&self.value),
        }
    }
}

/// Grids are checked against the world's dimensions, scalars are not.
trait Shaped {
    fn shape(&self) -> Option<(usize, usize)>;
}

impl<T> Shaped for Grid2D<T> {
    fn shape(&self) -> Option<(usize, usize)> {
        Some(self.dimensions())
    }
}

macro_rules! impl_unshaped {
    ($($ty:ty),*) => {
        $(impl Shaped for $ty {
            fn shape(&self) -> Option<(usize, usize)> {
                None
            }
        })*
    };
}

impl_unshaped!(
    ElevationThresholds,
    PrecipitationThresholds,
    TemperatureThresholds,
    WorldSummary
);

macro_rules! layers {
    ($($field:ident, $require:ident, $with:ident: $ty:ty = $name:literal;)*) => {
        #[derive(Clone, Debug, Default)]
        struct Layers {
            $($field: Option<Layer<$ty>>,)*
        }

        /// Names of every layer a context can hold.
        pub const LAYER_NAMES: &[&str] = &[$($name),*];

        impl PipelineContext {
            $(
                pub fn $field(&self) -> Option<&$ty> {
                    self.layers.$field.as_ref().map(|l| l.value.as_ref())
                }

                pub fn $require(&self) -> Result<&$ty, StageError> {
                    self.$field().ok_or(StageError::MissingLayer($name))
                }

                pub fn $with(
                    mut self,
                    writer: &'static str,
                    value: $ty,
                ) -> Result<Self, StageError> {
                    let owner = self.layers.$field.as_ref().map(|l| l.owner);
                    self.check($name, owner, writer, value.shape())?;
                    self.layers.$field = Some(Layer {
                        owner: writer,
                        value: Arc::new(value),
                    });
                    Ok(self)
                }
            )*

            /// Stage that wrote `layer`, if it is populated.
            pub fn owner(&self, layer: &str) -> Option<&'static str> {
                match layer {
                    $($name => self.layers.$field.as_ref().map(|l| l.owner),)*
                    _ => None,
                }
            }
        }
    };
}

layers! {
    original_elevation, require_original_elevation, with_original_elevation:
        Grid2D<f32> = "original_elevation";
    plate_ids, require_plate_ids, with_plate_ids: Grid2D<u32> = "plate_ids";
    elevation, require_elevation, with_elevation: Grid2D<f32> = "elevation";
    ocean_mask, require_ocean_mask, with_ocean_mask: Grid2D<bool> = "ocean_mask";
    thresholds, require_thresholds, with_thresholds: ElevationThresholds = "thresholds";
    eroded_elevation, require_eroded_elevation, with_eroded_elevation:
        Grid2D<f32> = "eroded_elevation";
    eroded_thresholds, require_eroded_thresholds, with_eroded_thresholds:
        ElevationThresholds = "eroded_thresholds";
    temperature, require_temperature, with_temperature: Grid2D<f32> = "temperature";
    base_precipitation, require_base_precipitation, with_base_precipitation:
        Grid2D<f32> = "base_precipitation";
    rain_shadow_factor, require_rain_shadow_factor, with_rain_shadow_factor:
        Grid2D<f32> = "rain_shadow_factor";
    shadowed_precipitation, require_shadowed_precipitation, with_shadowed_precipitation:
        Grid2D<f32> = "shadowed_precipitation";
    coast_distance, require_coast_distance, with_coast_distance: Grid2D<u32> = "coast_distance";
    precipitation, require_precipitation, with_precipitation: Grid2D<f32> = "precipitation";
    precipitation_thresholds, require_precipitation_thresholds, with_precipitation_thresholds:
        PrecipitationThresholds = "precipitation_thresholds";
    temperature_thresholds, require_temperature_thresholds, with_temperature_thresholds:
        TemperatureThresholds = "temperature_thresholds";
    summary, require_summary, with_summary: WorldSummary = "summary";
}

#[derive(Clone, Debug)]
pub struct PipelineContext {
    width: usize,
    height: usize,
    params: Arc<GenerationParams>,
    climate: ClimateParams,
    layers: Layers,
}

impl PipelineContext {
    /// An empty context for a validated parameter set.
    pub fn new(params: Arc<GenerationParams>, climate: ClimateParams) -> Self {
        let side = params.side();
        Self {
            width: side,
            height: side,
            params,
            climate,
            layers: Layers::default(),
        }
    }

    pub fn seed(&self) -> u64 {
        self.params.seed
    }

    pub fn params(&self) -> &GenerationParams {
        &self.params
    }

    pub fn climate(&self) -> ClimateParams {
        self.climate
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// The terrain climate works on: eroded when erosion has run.
    pub fn terrain(&self) -> Result<&Grid2D<f32>, StageError> {
        match self.eroded_elevation() {
            Some(eroded) => Ok(eroded),
            None => self.require_elevation(),
        }
    }

    /// Thresholds matching [`Self::terrain`].
    pub fn terrain_thresholds(&self) -> Result<ElevationThresholds, StageError> {
        match (self.eroded_elevation(), self.eroded_thresholds()) {
            (Some(_), Some(t)) => Ok(*t),
            (Some(_), None) => Err(StageError::MissingLayer("eroded_thresholds")),
            (None, _) => self.require_thresholds().copied(),
        }
    }

    fn check(
        &self,
        layer: &'static str,
        owner: Option<&'static str>,
        writer: &'static str,
        shape: Option<(usize, usize)>,
    ) -> Result<(), StageError> {
        if let Some(owner) = owner.filter(|&o| o != writer) {
            return Err(StageError::LayerConflict {
                layer,
                owner,
                writer,
            });
        }
        match shape {
            Some(actual) if actual != self.dimensions() => Err(StageError::DimensionMismatch {
                layer,
                expected: self.dimensions(),
                actual,
            }),
            _ => Ok(()),
        }
    }
}
