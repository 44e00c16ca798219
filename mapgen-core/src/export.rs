use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use image::{ImageBuffer, Rgb};
use serde::Serialize;

use crate::grid::Grid2D;
use crate::params::ClimateParams;
use crate::rng::hash_u64;
use crate::scheduler::StageTiming;
use crate::stages::WorldSummary;
use crate::thresholds::{ElevationThresholds, PrecipitationThresholds, TemperatureThresholds};
use crate::world::GeneratedWorld;

#[derive(Serialize)]
struct ExportMeta<'a> {
    seed: u64,
    width: usize,
    height: usize,
    climate: ClimateParams,
    thresholds: ElevationThresholds,
    sea_level_metres: f32,
    terrain_thresholds: ElevationThresholds,
    precipitation_thresholds: PrecipitationThresholds,
    temperature_thresholds: TemperatureThresholds,
    summary: WorldSummary,
    timings: &'a [StageTiming],
    checksum: &'a str,
    layer_hashes: &'a BTreeMap<String, String>,
    timestamp_unix_s: u64,
}

/// Writes one PNG per layer plus `meta.json` into `dir`.
pub fn export_world(world: &GeneratedWorld, dir: impl AsRef<Path>) -> Result<()> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir).with_context(|| format!("creating export dir {}", dir.display()))?;

    write_float_layer_png(&world.original_elevation, dir.join("original_elevation.png"))?;
    write_float_layer_png(&world.elevation, dir.join("elevation.png"))?;
    write_float_layer_png(&world.terrain, dir.join("terrain.png"))?;
    write_float_layer_png(&world.temperature, dir.join("temperature.png"))?;
    write_float_layer_png(&world.precipitation, dir.join("precipitation.png"))?;
    write_ocean_png(world, dir.join("ocean_mask.png"))?;
    write_plates_png(&world.plate_ids, dir.join("plates.png"))?;

    if let Some(debug) = &world.intermediates {
        write_float_layer_png(&debug.base_precipitation, dir.join("base_precipitation.png"))?;
        write_float_layer_png(&debug.rain_shadow_factor, dir.join("rain_shadow_factor.png"))?;
        write_float_layer_png(
            &debug.shadowed_precipitation,
            dir.join("shadowed_precipitation.png"),
        )?;
        let reachable = debug.coast_distance.map(|&d| if d == u32::MAX { 0.0 } else { d as f32 });
        write_float_layer_png(&reachable, dir.join("coast_distance.png"))?;
    }

    let meta = ExportMeta {
        seed: world.seed,
        width: world.width,
        height: world.height,
        climate: world.climate,
        thresholds: world.thresholds,
        sea_level_metres: world.thresholds.sea_level_metres(),
        terrain_thresholds: world.terrain_thresholds,
        precipitation_thresholds: world.precipitation_thresholds,
        temperature_thresholds: world.temperature_thresholds,
        summary: world.summary,
        timings: &world.timings,
        checksum: &world.diagnostics.checksum,
        layer_hashes: &world.diagnostics.layer_hashes,
        timestamp_unix_s: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs()),
    };
    let meta_json = serde_json::to_string_pretty(&meta)?;
    fs::write(dir.join("meta.json"), meta_json)?;
    Ok(())
}

fn write_float_layer_png(grid: &Grid2D<f32>, path: impl AsRef<Path>) -> Result<()> {
    let (min, max) = grid.min_max();
    let span = (max - min).max(1e-9);

    let mut img = ImageBuffer::new(grid.width() as u32, grid.height() as u32);
    for (x, y) in grid.iter_coords() {
        let v = (*grid.get(x, y) - min) / span;
        let c = (v.clamp(0.0, 1.0) * 255.0) as u8;
        img.put_pixel(x as u32, y as u32, Rgb([c, c, c]));
    }
    img.save(path)?;
    Ok(())
}

fn write_ocean_png(world: &GeneratedWorld, path: impl AsRef<Path>) -> Result<()> {
    let sea = world.thresholds.sea_level;
    let mut img = ImageBuffer::new(world.width as u32, world.height as u32);
    for (x, y) in world.ocean_mask.iter_coords() {
        let c: [u8; 3] = if *world.ocean_mask.get(x, y) {
            [0, 40, 120]
        } else if *world.elevation.get(x, y) < sea {
            // Landlocked water below sea level.
            [50, 120, 220]
        } else {
            [20, 20, 20]
        };
        img.put_pixel(x as u32, y as u32, Rgb(c));
    }
    img.save(path)?;
    Ok(())
}

fn write_plates_png(grid: &Grid2D<u32>, path: impl AsRef<Path>) -> Result<()> {
    let mut img = ImageBuffer::new(grid.width() as u32, grid.height() as u32);
    for (x, y) in grid.iter_coords() {
        img.put_pixel(x as u32, y as u32, Rgb(plate_color(*grid.get(x, y))));
    }
    img.save(path)?;
    Ok(())
}

fn plate_color(id: u32) -> [u8; 3] {
    let h = hash_u64(u64::from(id)).to_le_bytes();
    [h[0] / 2 + 64, h[1] / 2 + 64, h[2] / 2 + 64]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plate_colors_are_stable_and_distinct() {
        assert_eq!(plate_color(3), plate_color(3));
        assert_ne!(plate_color(1), plate_color(2));
    }
}
