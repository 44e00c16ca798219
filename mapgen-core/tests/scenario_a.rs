//! Seed 42 on a 512 map with 15 plates, through the native simulator.
//!
//! `tests/snapshots/scenario_a.json` holds the recorded values. Fields left
//! out of the file are not compared. Run with `UPDATE_SNAPSHOTS=1` to
//! re-record every field after an intended change to the algorithms.

use std::env;
use std::fs;
use std::path::Path;

use mapgen_core::thresholds::{ElevationThresholds, PrecipitationThresholds};
use mapgen_core::{generate_world, GeneratedWorld, GenerationParams};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Snapshot {
    sea_level: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thresholds: Option<ElevationThresholds>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    terrain_thresholds: Option<ElevationThresholds>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    precipitation_thresholds: Option<PrecipitationThresholds>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    checksum: Option<String>,
}

impl Snapshot {
    fn of(world: &GeneratedWorld) -> Self {
        Self {
            sea_level: world.thresholds.sea_level,
            thresholds: Some(world.thresholds),
            terrain_thresholds: Some(world.terrain_thresholds),
            precipitation_thresholds: Some(world.precipitation_thresholds),
            checksum: Some(world.diagnostics.checksum.clone()),
        }
    }

    /// Keeps only the fields `recorded` pins down.
    fn restricted_to(self, recorded: &Snapshot) -> Self {
        Self {
            sea_level: self.sea_level,
            thresholds: self.thresholds.filter(|_| recorded.thresholds.is_some()),
            terrain_thresholds: self
                .terrain_thresholds
                .filter(|_| recorded.terrain_thresholds.is_some()),
            precipitation_thresholds: self
                .precipitation_thresholds
                .filter(|_| recorded.precipitation_thresholds.is_some()),
            checksum: self.checksum.filter(|_| recorded.checksum.is_some()),
        }
    }
}

#[test]
fn scenario_a_matches_recorded_thresholds() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let params = GenerationParams {
        seed: 42,
        map_size: 512,
        plate_count: 15,
        ..GenerationParams::default()
    };
    let world = generate_world(&params).expect("scenario A generates");
    assert_eq!((world.width, world.height), (512, 512));

    let t = world.thresholds;
    assert!(t.sea_level <= t.hill_level);
    assert!(t.hill_level <= t.mountain_level);
    assert!(t.mountain_level <= t.peak_level);

    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/snapshots/scenario_a.json");
    let actual = Snapshot::of(&world);
    if env::var_os("UPDATE_SNAPSHOTS").is_some() {
        let json = serde_json::to_string_pretty(&actual).expect("serialize snapshot");
        fs::write(&path, json + "\n").expect("record snapshot");
        return;
    }

    let recorded = fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("missing snapshot {}: {e}", path.display()));
    let recorded: Snapshot = serde_json::from_str(&recorded).expect("snapshot parses");
    assert_eq!(actual.restricted_to(&recorded), recorded);
}
