use std::collections::VecDeque;

use tracing::warn;

use super::{ensure_finite, PipelineStage};
use crate::context::PipelineContext;
use crate::error::StageError;
use crate::grid::Grid2D;
use crate::params::CoastalParams;
use crate::units::relative_excess;

/// Distance of cells no ocean can reach.
pub const UNREACHABLE: u32 = u32::MAX;

/// 4-neighbour BFS distance to the nearest ocean cell.
pub fn coast_distance(ocean_mask: &Grid2D<bool>) -> Grid2D<u32> {
    let (w, h) = ocean_mask.dimensions();
    let mut distance = Grid2D::new(w, h, UNREACHABLE);
    let mut queue = VecDeque::new();
    for (x, y) in ocean_mask.iter_coords() {
        if *ocean_mask.get(x, y) {
            *distance.get_mut(x, y) = 0;
            queue.push_back((x, y));
        }
    }
    while let Some((x, y)) = queue.pop_front() {
        let next = distance.get(x, y).saturating_add(1);
        for (nx, ny) in ocean_mask.neighbors4(x, y) {
            if *distance.get(nx, ny) == UNREACHABLE {
                *distance.get_mut(nx, ny) = next;
                queue.push_back((nx, ny));
            }
        }
    }
    distance
}

/// Extra moisture for a cell `distance` steps from the sea, damped by how far
/// it rises above `sea_level`.
pub fn coastal_bonus(distance: u32, elevation: f32, sea_level: f32, params: &CoastalParams) -> f32 {
    if distance == UNREACHABLE {
        return 0.0;
    }
    let decay = (-(distance as f32) / params.decay_range).exp();
    let resistance = 1.0 / (1.0 + relative_excess(elevation, sea_level));
    params.max_bonus * decay * resistance
}

#[derive(Clone, Copy, Debug, Default)]
pub struct CoastalMoistureStage;

impl CoastalMoistureStage {
    pub const NAME: &'static str = "coastal-moisture";
}

impl PipelineStage for CoastalMoistureStage {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn execute(
        &self,
        ctx: &PipelineContext,
        iteration: u32,
    ) -> Result<PipelineContext, StageError> {
        let terrain = ctx.terrain()?;
        let sea_level = ctx.terrain_thresholds()?.sea_level;
        let ocean_mask = ctx.require_ocean_mask()?;
        let shadowed = ctx.require_shadowed_precipitation()?;
        let params = &ctx.params().coastal;

        let distance = coast_distance(ocean_mask);
        if ocean_mask.as_slice().iter().all(|&o| !o) {
            warn!("no ocean cells, coastal moisture adds nothing");
        }
        let (w, h) = terrain.dimensions();
        let precipitation = Grid2D::from_fn(w, h, |x, y| {
            let bonus = coastal_bonus(*distance.get(x, y), *terrain.get(x, y), sea_level, params);
            (shadowed.get(x, y) + bonus).clamp(0.0, 1.0)
        });
        ensure_finite("precipitation", &precipitation)?;
        stage_event!(
            iteration,
            mean = precipitation.mean(),
            "coastal moisture added"
        );

        ctx.clone()
            .with_coast_distance(Self::NAME, distance)?
            .with_precipitation(Self::NAME, precipitation)
    }
}
