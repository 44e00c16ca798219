//! Elevation units.
//!
//! Heights come out of the plate simulation in RAW units. [`SEA_LEVEL_RAW`]
//! is the only sea-level constant in the crate; every conversion and every
//! elevation-relative margin is expressed in terms of it.

/// Sea level in RAW elevation units.
pub const SEA_LEVEL_RAW: f32 = 1.0;

/// Metres represented by one [`SEA_LEVEL_RAW`] of relief.
pub const METRES_PER_SEA_LEVEL: f32 = 2_500.0;

/// Metres above (positive) or below (negative) sea level.
#[inline]
pub fn raw_to_metres(raw: f32) -> f32 {
    (raw - SEA_LEVEL_RAW) / SEA_LEVEL_RAW * METRES_PER_SEA_LEVEL
}

/// Elevation excess over `base`, measured in sea-level units.
#[inline]
pub fn relative_excess(elevation: f32, base: f32) -> f32 {
    (elevation - base).max(0.0) / SEA_LEVEL_RAW
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sea_level_is_zero_metres() {
        assert_eq!(raw_to_metres(SEA_LEVEL_RAW), 0.0);
        assert_eq!(raw_to_metres(2.0 * SEA_LEVEL_RAW), METRES_PER_SEA_LEVEL);
    }

    #[test]
    fn excess_is_zero_below_base() {
        assert_eq!(relative_excess(0.5, 1.0), 0.0);
        let excess = relative_excess(1.5, 1.0);
        assert!((excess - 0.5 / SEA_LEVEL_RAW).abs() < 1e-6);
    }
}
