//! Orographic rain shadow.
//!
//! Every cell looks upwind along its latitude band's prevailing wind. Each
//! upwind cell that stands clearly above it strips some moisture first.

use super::{ensure_finite, PipelineStage};
use crate::context::PipelineContext;
use crate::error::StageError;
use crate::grid::Grid2D;
use crate::params::RainShadowParams;
use crate::units::SEA_LEVEL_RAW;

const COS_30: f32 = 0.866_025_4;

/// Latitude in degrees for row `y`, positive in the north. Row `0` is the
/// north edge and the equator sits at `0.5 + axial_tilt` of the height.
pub fn latitude_degrees(y: usize, height: usize, axial_tilt: f32) -> f32 {
    let v = y as f32 / height.max(1) as f32;
    (0.5 + axial_tilt - v) * 180.0
}

/// Unit vector the wind blows toward, with `y` growing southward.
pub fn prevailing_wind(latitude: f32) -> (f32, f32) {
    let abs = latitude.abs();
    let northern = if abs < 30.0 {
        // Trade winds from the north-east.
        (-COS_30, 0.5)
    } else if abs < 60.0 {
        // Westerlies from the south-west.
        (COS_30, -0.5)
    } else {
        // Polar easterlies.
        (-COS_30, 0.5)
    };
    if latitude >= 0.0 {
        northern
    } else {
        (northern.0, -northern.1)
    }
}

/// Fraction of moisture each cell keeps, in `[min_retained, 1]`.
pub fn rain_shadow_factor(
    elevation: &Grid2D<f32>,
    axial_tilt: f32,
    params: &RainShadowParams,
) -> Grid2D<f32> {
    let (w, h) = elevation.dimensions();
    let margin = params.margin * SEA_LEVEL_RAW;
    Grid2D::from_fn(w, h, |x, y| {
        let (wx, wy) = prevailing_wind(latitude_degrees(y, h, axial_tilt));
        let here = *elevation.get(x, y);
        let mut blocking = 0.0f32;
        for k in 1..=params.trace_distance {
            let ux = (x as f32 - wx * k as f32).round() as isize;
            let uy = (y as f32 - wy * k as f32).round() as isize;
            if !elevation.in_bounds(ux, uy) {
                break;
            }
            if *elevation.get(ux as usize, uy as usize) > here + margin {
                blocking += params.blocking_per_cell;
            }
        }
        (1.0 - blocking).clamp(params.min_retained, 1.0)
    })
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RainShadowStage;

impl RainShadowStage {
    pub const NAME: &'static str = "rain-shadow";
}

impl PipelineStage for RainShadowStage {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn execute(
        &self,
        ctx: &PipelineContext,
        iteration: u32,
    ) -> Result<PipelineContext, StageError> {
        let terrain = ctx.terrain()?;
        let base = ctx.require_base_precipitation()?;
        let factor =
            rain_shadow_factor(terrain, ctx.climate().axial_tilt, &ctx.params().rain_shadow);
        let (w, h) = factor.dimensions();
        let shadowed = Grid2D::from_fn(w, h, |x, y| base.get(x, y) * factor.get(x, y));
        ensure_finite("shadowed_precipitation", &shadowed)?;
        stage_event!(
            iteration,
            mean_factor = factor.mean(),
            "rain shadow applied"
        );
        ctx.clone()
            .with_rain_shadow_factor(Self::NAME, factor)?
            .with_shadowed_precipitation(Self::NAME, shadowed)
    }
}
