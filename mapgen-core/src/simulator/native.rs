//! Adapter over the `platesim` C ABI. All pointer handling for the native
//! simulation lives in this file.

use std::ptr::NonNull;
use std::slice;

use platesim::{
    platesim_create, platesim_destroy, platesim_get_heightmap, platesim_get_platesmap,
    platesim_step, PlateSimHandle, PlateSimParams, STEP_FINISHED, STEP_RUNNING,
};
use tracing::{debug, trace};

use super::{PlateSimulationParams, PlateSimulator, SimulationResult};
use crate::error::SimError;
use crate::grid::Grid2D;

/// Runs the native plate tectonics library.
#[derive(Clone, Copy, Debug, Default)]
pub struct NativePlateSimulator;

impl PlateSimulator for NativePlateSimulator {
    fn name(&self) -> &str {
        "platesim"
    }

    fn generate(&self, params: &PlateSimulationParams) -> Result<SimulationResult, SimError> {
        let native = to_native(params)?;
        let expected = params
            .width
            .checked_mul(params.height)
            .ok_or_else(|| SimError::InvalidDimensions("width * height overflows".into()))?;

        let mut handle = NativeHandle::create(&native)?;

        let mut status = STEP_RUNNING;
        let mut steps = 0u32;
        while steps < params.step_budget {
            status = handle.step();
            steps += 1;
            if status < 0 {
                return Err(SimError::StepFailed {
                    step: steps,
                    code: status,
                });
            }
            if status == STEP_FINISHED {
                break;
            }
        }
        if status != STEP_FINISHED {
            return Err(SimError::NonConvergence { steps });
        }
        trace!(steps, "native simulation settled");

        let heights = handle.heightmap(expected)?;
        let plates = handle.plates(expected)?;
        drop(handle);

        let mismatch = |buffer: &'static str, actual: usize| SimError::MarshalSizeMismatch {
            buffer,
            expected,
            actual,
        };
        let heights_len = heights.len();
        let heightmap = Grid2D::from_vec(params.width, params.height, heights)
            .ok_or_else(|| mismatch("heightmap", heights_len))?;
        let plates_len = plates.len();
        let plate_ids = Grid2D::from_vec(params.width, params.height, plates)
            .ok_or_else(|| mismatch("platesmap", plates_len))?;

        debug!(
            seed = params.seed,
            width = params.width,
            height = params.height,
            plates = params.plate_count,
            steps,
            "plate simulation finished"
        );
        Ok(SimulationResult {
            heightmap,
            plate_ids,
            steps,
        })
    }
}

fn to_native(params: &PlateSimulationParams) -> Result<PlateSimParams, SimError> {
    let narrow = |name: &str, v: usize| {
        u32::try_from(v).map_err(|_| SimError::InvalidDimensions(format!("{name} {v} exceeds u32")))
    };
    Ok(PlateSimParams {
        seed: params.seed,
        width: narrow("width", params.width)?,
        height: narrow("height", params.height)?,
        plate_count: narrow("plate count", params.plate_count)?,
        ocean_ratio: params.ocean_ratio,
        erosion_period: params.erosion_period,
        folding_ratio: params.folding_ratio,
        cycle_count: params.cycle_count,
        steps_per_cycle: params.steps_per_cycle,
    })
}

/// Owns a live native handle and destroys it exactly once, on drop.
struct NativeHandle(NonNull<PlateSimHandle>);

impl NativeHandle {
    fn create(params: &PlateSimParams) -> Result<Self, SimError> {
        // SAFETY: `params` is a valid reference for the duration of the call.
        let raw = unsafe { platesim_create(params) };
        NonNull::new(raw)
            .map(Self)
            .ok_or(SimError::NativeCreateFailed)
    }

    fn step(&mut self) -> i32 {
        // SAFETY: the handle is live until `drop` and `&mut self` rules out
        // any concurrent use of it.
        unsafe { platesim_step(self.0.as_ptr()) }
    }

    fn heightmap(&self, expected: usize) -> Result<Vec<f32>, SimError> {
        // SAFETY: the handle is live and `len` points at a local.
        copy_buffer("heightmap", expected, |len| unsafe {
            platesim_get_heightmap(self.0.as_ptr(), len)
        })
    }

    fn plates(&self, expected: usize) -> Result<Vec<u32>, SimError> {
        // SAFETY: the handle is live and `len` points at a local.
        copy_buffer("platesmap", expected, |len| unsafe {
            platesim_get_platesmap(self.0.as_ptr(), len)
        })
    }
}

impl Drop for NativeHandle {
    fn drop(&mut self) {
        // SAFETY: the pointer came from `platesim_create` and this is the only
        // place it is destroyed.
        unsafe { platesim_destroy(self.0.as_ptr()) }
    }
}

/// Copies a handle-owned buffer out before the handle goes away.
fn copy_buffer<T: Copy>(
    buffer: &'static str,
    expected: usize,
    get: impl FnOnce(*mut usize) -> *const T,
) -> Result<Vec<T>, SimError> {
    let mut len = 0usize;
    let ptr = get(&mut len);
    if ptr.is_null() {
        return Err(SimError::NullBuffer { buffer });
    }
    if len != expected {
        return Err(SimError::MarshalSizeMismatch {
            buffer,
            expected,
            actual: len,
        });
    }
    // SAFETY: the getter returned a non-null pointer to `len` initialised
    // values owned by a handle that outlives this call.
    let values = unsafe { slice::from_raw_parts(ptr, len) };
    Ok(values.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(seed: u64) -> PlateSimulationParams {
        PlateSimulationParams {
            seed,
            width: 48,
            height: 40,
            plate_count: 6,
            ocean_ratio: 0.65,
            erosion_period: 10,
            folding_ratio: 0.02,
            cycle_count: 2,
            steps_per_cycle: 12,
            step_budget: 40,
        }
    }

    #[test]
    fn same_seed_is_bit_identical() {
        let a = NativePlateSimulator.generate(&params(3)).expect("run a");
        let b = NativePlateSimulator.generate(&params(3)).expect("run b");
        assert_eq!(a.heightmap, b.heightmap);
        assert_eq!(a.plate_ids, b.plate_ids);
        assert_eq!(a.steps, 24);
    }

    #[test]
    fn marshals_full_grid() {
        let out = NativePlateSimulator.generate(&params(4)).expect("run");
        assert_eq!(out.heightmap.dimensions(), (48, 40));
        assert_eq!(out.plate_ids.dimensions(), (48, 40));
        assert!(out.heightmap.first_non_finite().is_none());
        assert!(out.plate_ids.as_slice().iter().all(|&id| id < 6));
    }

    #[test]
    fn short_budget_is_non_convergence() {
        let mut p = params(5);
        p.step_budget = 10;
        let err = NativePlateSimulator.generate(&p).expect_err("must not settle");
        assert_eq!(err, SimError::NonConvergence { steps: 10 });
    }

    #[test]
    fn rejected_params_fail_creation() {
        let mut p = params(6);
        p.plate_count = 0;
        let err = NativePlateSimulator.generate(&p).expect_err("create must fail");
        assert_eq!(err, SimError::NativeCreateFailed);
    }

    #[test]
    fn buffer_size_mismatch_is_reported() {
        let data = [0.0f32; 6];
        let err = copy_buffer("heightmap", 8, |len| {
            // SAFETY: `len` points at a local in `copy_buffer`.
            unsafe { *len = data.len() };
            data.as_ptr()
        })
        .expect_err("size mismatch");
        assert_eq!(
            err,
            SimError::MarshalSizeMismatch {
                buffer: "heightmap",
                expected: 8,
                actual: 6
            }
        );
    }
}
