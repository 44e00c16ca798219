use anyhow::{Context, Result};
use mapgen_core::export::export_world;
use mapgen_core::{GenerationParams, PipelineBuilder, Preset};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut params = GenerationParams {
        seed: 42,
        ..GenerationParams::default()
    };
    let mut preset = Preset::FastPreview;
    for arg in std::env::args().skip(1) {
        if let Some(path) = arg.strip_prefix("--params=") {
            params = GenerationParams::from_json_file(path)
                .with_context(|| format!("loading parameters from {path}"))?;
        } else if let Some(size) = arg.strip_prefix("--size=") {
            params.map_size = size.parse().context("--size expects an integer")?;
        } else if let Some(seed) = arg.strip_prefix("--seed=") {
            params.seed = seed.parse().context("--seed expects an integer")?;
        } else if arg == "--high-quality" {
            preset = Preset::HighQuality;
        } else if arg == "--debug-layers" {
            params.retain_intermediates = true;
        }
    }

    let world = PipelineBuilder::new()
        .preset(preset)
        .build()?
        .generate(&params)?;

    let out_dir = format!(
        "exports/world_seed{}_{}x{}",
        params.seed, world.width, world.height
    );
    export_world(&world, &out_dir)?;

    println!("exported: {out_dir}");
    println!("checksum: {}", world.diagnostics.checksum);
    Ok(())
}
