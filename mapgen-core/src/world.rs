use std::collections::BTreeMap;

use blake3::Hasher;
use serde::{Deserialize, Serialize};

use crate::context::PipelineContext;
use crate::error::StageError;
use crate::grid::Grid2D;
use crate::params::ClimateParams;
use crate::scheduler::StageTiming;
use crate::stages::WorldSummary;
use crate::thresholds::{ElevationThresholds, PrecipitationThresholds, TemperatureThresholds};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Diagnostics {
    pub layer_hashes: BTreeMap<String, String>,
    pub checksum: String,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            layer_hashes: BTreeMap::new(),
            checksum: String::from("unset"),
        }
    }
}

/// Per-stage maps kept only when intermediates are requested.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DebugLayers {
    pub base_precipitation: Grid2D<f32>,
    pub rain_shadow_factor: Grid2D<f32>,
    pub shadowed_precipitation: Grid2D<f32>,
    pub coast_distance: Grid2D<u32>,
}

/// Everything a generation hands back to the caller.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GeneratedWorld {
    pub seed: u64,
    pub width: usize,
    pub height: usize,
    pub climate: ClimateParams,

    /// Heightmap exactly as the plate simulation produced it.
    pub original_elevation: Grid2D<f32>,
    pub elevation: Grid2D<f32>,
    pub plate_ids: Grid2D<u32>,
    pub ocean_mask: Grid2D<bool>,
    pub thresholds: ElevationThresholds,

    /// Eroded elevation when erosion ran, otherwise `elevation` again.
    pub terrain: Grid2D<f32>,
    pub terrain_thresholds: ElevationThresholds,

    pub temperature: Grid2D<f32>,
    pub precipitation: Grid2D<f32>,
    pub precipitation_thresholds: PrecipitationThresholds,
    pub temperature_thresholds: TemperatureThresholds,
    pub summary: WorldSummary,

    pub intermediates: Option<DebugLayers>,
    pub timings: Vec<StageTiming>,
    pub diagnostics: Diagnostics,
}

impl GeneratedWorld {
    /// Extracts the output layers from a finished context.
    pub fn from_context(
        ctx: &PipelineContext,
        timings: Vec<StageTiming>,
    ) -> Result<Self, StageError> {
        let (width, height) = ctx.dimensions();
        let intermediates = if ctx.params().retain_intermediates {
            Some(DebugLayers {
                base_precipitation: ctx.require_base_precipitation()?.clone(),
                rain_shadow_factor: ctx.require_rain_shadow_factor()?.clone(),
                shadowed_precipitation: ctx.require_shadowed_precipitation()?.clone(),
                coast_distance: ctx.require_coast_distance()?.clone(),
            })
        } else {
            None
        };

        let mut world = Self {
            seed: ctx.seed(),
            width,
            height,
            climate: ctx.climate(),
            original_elevation: ctx.require_original_elevation()?.clone(),
            elevation: ctx.require_elevation()?.clone(),
            plate_ids: ctx.require_plate_ids()?.clone(),
            ocean_mask: ctx.require_ocean_mask()?.clone(),
            thresholds: *ctx.require_thresholds()?,
            terrain: ctx.terrain()?.clone(),
            terrain_thresholds: ctx.terrain_thresholds()?,
            temperature: ctx.require_temperature()?.clone(),
            precipitation: ctx.require_precipitation()?.clone(),
            precipitation_thresholds: *ctx.require_precipitation_thresholds()?,
            temperature_thresholds: *ctx.require_temperature_thresholds()?,
            summary: *ctx.require_summary()?,
            intermediates,
            timings,
            diagnostics: Diagnostics::default(),
        };
        world.update_diagnostics();
        Ok(world)
    }

    /// Hashes every deterministic output. Timings are left out.
    pub fn update_diagnostics(&mut self) {
        let mut hashes = BTreeMap::new();
        hashes.insert(
            "original_elevation".to_string(),
            hash_f32(&self.original_elevation),
        );
        hashes.insert("elevation".to_string(), hash_f32(&self.elevation));
        hashes.insert("plate_ids".to_string(), hash_u32(&self.plate_ids));
        hashes.insert("ocean_mask".to_string(), hash_bool(&self.ocean_mask));
        hashes.insert("terrain".to_string(), hash_f32(&self.terrain));
        hashes.insert("temperature".to_string(), hash_f32(&self.temperature));
        hashes.insert("precipitation".to_string(), hash_f32(&self.precipitation));
        hashes.insert(
            "thresholds".to_string(),
            hash_values(
                self.thresholds
                    .levels()
                    .into_iter()
                    .chain(self.terrain_thresholds.levels())
                    .chain([
                        self.precipitation_thresholds.low,
                        self.precipitation_thresholds.medium,
                        self.precipitation_thresholds.high,
                    ]),
            ),
        );
        hashes.insert(
            "climate".to_string(),
            hash_values([self.climate.axial_tilt, self.climate.distance_to_sun]),
        );

        let mut combined = Hasher::new();
        for (name, hash) in &hashes {
            combined.update(name.as_bytes());
            combined.update(hash.as_bytes());
        }
        self.diagnostics.layer_hashes = hashes;
        self.diagnostics.checksum = combined.finalize().to_hex().to_string();
    }
}

fn hash_values(values: impl IntoIterator<Item = f32>) -> String {
    let mut h = Hasher::new();
    for v in values {
        h.update(&v.to_bits().to_le_bytes());
    }
    h.finalize().to_hex().to_string()
}

fn hash_f32(grid: &Grid2D<f32>) -> String {
    hash_values(grid.as_slice().iter().copied())
}

fn hash_u32(grid: &Grid2D<u32>) -> String {
    let mut h = Hasher::new();
    for v in grid.as_slice() {
        h.update(&v.to_le_bytes());
    }
    h.finalize().to_hex().to_string()
}

fn hash_bool(grid: &Grid2D<bool>) -> String {
    let mut h = Hasher::new();
    for v in grid.as_slice() {
        h.update(&[u8::from(*v)]);
    }
    h.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_hash_sees_bit_changes() {
        let a = Grid2D::new(3, 3, 0.5f32);
        let mut b = a.clone();
        *b.get_mut(1, 1) = f32::from_bits(0.5f32.to_bits() + 1);
        assert_eq!(hash_f32(&a), hash_f32(&a.clone()));
        assert_ne!(hash_f32(&a), hash_f32(&b));
    }

    #[test]
    fn bool_and_u32_hashes_differ_by_content() {
        assert_ne!(
            hash_bool(&Grid2D::new(2, 2, true)),
            hash_bool(&Grid2D::new(2, 2, false))
        );
        assert_ne!(
            hash_u32(&Grid2D::new(2, 2, 1)),
            hash_u32(&Grid2D::new(2, 2, 2))
        );
    }
}
