mod common;

use std::sync::Arc;

use common::{IslandSimulator, StuckSimulator};
use mapgen_core::scheduler::foundation_stages;
use mapgen_core::stages::{climate_stages, AnalysisStage, PlateSimulationStage};
use mapgen_core::{
    CancellationToken, ClimateParams, ErrorKind, GenerationError, GenerationParams,
    PipelineBuilder, Preset, Topology,
};

fn params(seed: u64) -> GenerationParams {
    GenerationParams {
        seed,
        map_size: 48,
        plate_count: 4,
        climate: Some(ClimateParams {
            axial_tilt: 0.02,
            distance_to_sun: 1.0,
        }),
        ..GenerationParams::default()
    }
}

#[test]
fn iterative_with_one_round_and_no_erosion_matches_single_pass() {
    let sim = Arc::new(IslandSimulator::default());
    let single = PipelineBuilder::new()
        .simulator(sim.clone())
        .topology(Topology::SinglePass)
        .erosion(false)
        .build()
        .expect("single")
        .generate(&params(5))
        .expect("single run");
    let iterative = PipelineBuilder::new()
        .simulator(sim.clone())
        .topology(Topology::Iterative)
        .iterations(1)
        .erosion(false)
        .build()
        .expect("iterative")
        .generate(&params(5))
        .expect("iterative run");

    assert_eq!(single.temperature, iterative.temperature);
    assert_eq!(single.precipitation, iterative.precipitation);
    assert_eq!(single.diagnostics, iterative.diagnostics);
    assert_eq!(sim.calls(), 2);
}

#[test]
fn invalid_parameters_never_reach_the_simulator() {
    let sim = Arc::new(IslandSimulator::default());
    let pipeline = PipelineBuilder::new()
        .simulator(sim.clone())
        .build()
        .expect("build");

    for (map_size, plate_count) in [(0, 4), (-16, 4), (48, 0), (48, -2)] {
        let p = GenerationParams {
            map_size,
            plate_count,
            ..params(1)
        };
        let err = pipeline.generate(&p).expect_err("must be rejected");
        assert_eq!(
            err.kind(),
            ErrorKind::ConfigurationError,
            "{map_size} x {plate_count}"
        );
    }
    assert_eq!(sim.calls(), 0);
}

#[test]
fn closer_orbit_gives_a_warmer_world() {
    let sim = Arc::new(IslandSimulator::default());
    let pipeline = PipelineBuilder::new()
        .simulator(sim)
        .build()
        .expect("build");
    let at = |distance_to_sun: f32| {
        let p = GenerationParams {
            climate: Some(ClimateParams {
                axial_tilt: 0.0,
                distance_to_sun,
            }),
            ..params(42)
        };
        pipeline.generate(&p).expect("run")
    };
    let near = at(0.85);
    let far = at(1.15);
    assert!(near.summary.mean_temperature > far.summary.mean_temperature);
}

#[test]
fn simulator_failure_is_a_native_error_with_no_world() {
    let err = PipelineBuilder::new()
        .simulator(Arc::new(StuckSimulator))
        .build()
        .expect("build")
        .generate(&params(3))
        .expect_err("stuck");
    assert_eq!(err.kind(), ErrorKind::NativeSimulationError);
    assert_eq!(err.stage(), Some(PlateSimulationStage::NAME));
}

#[test]
fn cancelled_token_stops_before_the_first_stage() {
    let sim = Arc::new(IslandSimulator::default());
    let token = CancellationToken::new();
    let pipeline = PipelineBuilder::new()
        .simulator(sim.clone())
        .cancellation(token.clone())
        .build()
        .expect("build");
    token.cancel();
    let err = pipeline.generate(&params(3)).expect_err("cancelled");
    assert!(matches!(
        err,
        GenerationError::Cancelled {
            before: PlateSimulationStage::NAME
        }
    ));
    assert_eq!(sim.calls(), 0);
}

#[test]
fn high_quality_preset_erodes_the_terrain() {
    let world = PipelineBuilder::new()
        .simulator(Arc::new(IslandSimulator::default()))
        .preset(Preset::HighQuality)
        .build()
        .expect("build")
        .generate(&params(9))
        .expect("run");
    assert_ne!(world.terrain, world.elevation);
    let erosion_runs = world.timings.iter().filter(|t| t.stage == "erosion").count();
    assert_eq!(erosion_runs, 4);
    for (x, y) in world.ocean_mask.iter_coords() {
        if *world.ocean_mask.get(x, y) {
            assert_eq!(world.terrain.get(x, y), world.elevation.get(x, y));
        }
    }
}

#[test]
fn custom_stage_list_runs_in_order() {
    let sim = Arc::new(IslandSimulator::default());
    let mut stages = foundation_stages(sim);
    stages.extend(climate_stages());
    stages.push(Arc::new(AnalysisStage));
    let world = PipelineBuilder::new()
        .stages(stages)
        .build()
        .expect("build")
        .generate(&params(11))
        .expect("run");
    let order: Vec<&str> = world.timings.iter().map(|t| t.stage.as_str()).collect();
    assert_eq!(
        order,
        [
            "plate-simulation",
            "elevation-post-process",
            "temperature",
            "base-precipitation",
            "rain-shadow",
            "coastal-moisture",
            "analysis"
        ]
    );
    assert_eq!(world.terrain, world.elevation);
}

#[test]
fn retained_intermediates_are_bounded() {
    let p = GenerationParams {
        retain_intermediates: true,
        ..params(13)
    };
    let world = PipelineBuilder::new()
        .simulator(Arc::new(IslandSimulator::default()))
        .build()
        .expect("build")
        .generate(&p)
        .expect("run");
    let debug = world.intermediates.expect("intermediates kept");
    let min = p.rain_shadow.min_retained;
    assert!(debug
        .rain_shadow_factor
        .as_slice()
        .iter()
        .all(|f| (min..=1.0).contains(f)));
    assert!(world
        .precipitation
        .as_slice()
        .iter()
        .all(|v| (0.0..=1.0).contains(v)));
}

#[test]
fn thresholds_are_ordered() {
    let world = PipelineBuilder::new()
        .simulator(Arc::new(IslandSimulator::default()))
        .build()
        .expect("build")
        .generate(&params(17))
        .expect("run");
    for t in [world.thresholds, world.terrain_thresholds] {
        assert!(t.sea_level <= t.hill_level);
        assert!(t.hill_level <= t.mountain_level);
        assert!(t.mountain_level <= t.peak_level);
    }
    let p = world.precipitation_thresholds;
    assert!(p.low <= p.medium && p.medium <= p.high);
}
