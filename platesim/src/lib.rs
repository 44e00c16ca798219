//! Plate tectonics simulation behind a C ABI.
//!
//! The library is consumed exclusively through the five `platesim_*`
//! functions below: create a handle, step it, read the two result buffers,
//! destroy it. Buffers returned by the getters are owned by the handle and
//! stay valid until the next `platesim_step` or `platesim_destroy` call.

use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

mod sim;

use sim::{SimConfig, Simulation};

pub const STEP_RUNNING: i32 = 0;
pub const STEP_FINISHED: i32 = 1;
pub const STEP_INVALID_HANDLE: i32 = -1;

static LIVE_HANDLES: AtomicUsize = AtomicUsize::new(0);

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct PlateSimParams {
    pub seed: u64,
    pub width: u32,
    pub height: u32,
    pub plate_count: u32,
    /// Share of the surface that starts as oceanic crust, in `[0, 1]`.
    pub ocean_ratio: f32,
    pub erosion_period: u32,
    pub folding_ratio: f32,
    pub cycle_count: u32,
    pub steps_per_cycle: u32,
}

impl PlateSimParams {
    fn to_config(self) -> Option<SimConfig> {
        Some(SimConfig {
            seed: self.seed,
            width: usize::try_from(self.width).ok()?,
            height: usize::try_from(self.height).ok()?,
            plate_count: usize::try_from(self.plate_count).ok()?,
            ocean_ratio: self.ocean_ratio,
            erosion_period: self.erosion_period,
            folding_ratio: self.folding_ratio,
            cycle_count: self.cycle_count,
            steps_per_cycle: self.steps_per_cycle,
        })
    }
}

/// Opaque simulation handle.
pub struct PlateSimHandle {
    sim: Simulation,
}

/// Number of handles created and not yet destroyed, across all threads.
pub fn live_handles() -> usize {
    LIVE_HANDLES.load(Ordering::SeqCst)
}

/// Creates a simulation, returning null when the parameters are rejected.
///
/// # Safety
///
/// `params` must be null or point to a readable `PlateSimParams`.
#[no_mangle]
pub unsafe extern "C" fn platesim_create(params: *const PlateSimParams) -> *mut PlateSimHandle {
    // SAFETY: the caller guarantees `params` is null or valid for reads.
    let Some(params) = (unsafe { params.as_ref() }) else {
        return ptr::null_mut();
    };
    let Some(sim) = params.to_config().and_then(Simulation::new) else {
        return ptr::null_mut();
    };
    LIVE_HANDLES.fetch_add(1, Ordering::SeqCst);
    Box::into_raw(Box::new(PlateSimHandle { sim }))
}

/// Advances the simulation one timestep.
///
/// Returns [`STEP_FINISHED`] once every cycle has run, [`STEP_RUNNING`]
/// before that, and [`STEP_INVALID_HANDLE`] for a null handle.
///
/// # Safety
///
/// `handle` must be null or a live pointer obtained from [`platesim_create`]
/// with no other outstanding reference to it.
#[no_mangle]
pub unsafe extern "C" fn platesim_step(handle: *mut PlateSimHandle) -> i32 {
    // SAFETY: the caller guarantees `handle` is null or live and unaliased.
    let Some(handle) = (unsafe { handle.as_mut() }) else {
        return STEP_INVALID_HANDLE;
    };
    if handle.sim.step() {
        STEP_FINISHED
    } else {
        STEP_RUNNING
    }
}

/// Returns the row-major heightmap and writes its element count to `len`.
///
/// # Safety
///
/// `handle` must be null or live; `len` must be null or writable.
#[no_mangle]
pub unsafe extern "C" fn platesim_get_heightmap(
    handle: *const PlateSimHandle,
    len: *mut usize,
) -> *const f32 {
    // SAFETY: the caller guarantees `handle` is null or live.
    let Some(handle) = (unsafe { handle.as_ref() }) else {
        return ptr::null();
    };
    let heights = handle.sim.heights();
    // SAFETY: the caller guarantees `len` is null or writable.
    if let Some(len) = unsafe { len.as_mut() } {
        *len = heights.len();
    }
    heights.as_ptr()
}

/// Returns the row-major plate-id map and writes its element count to `len`.
///
/// # Safety
///
/// `handle` must be null or live; `len` must be null or writable.
#[no_mangle]
pub unsafe extern "C" fn platesim_get_platesmap(
    handle: *const PlateSimHandle,
    len: *mut usize,
) -> *const u32 {
    // SAFETY: the caller guarantees `handle` is null or live.
    let Some(handle) = (unsafe { handle.as_ref() }) else {
        return ptr::null();
    };
    let plates = handle.sim.plate_map();
    // SAFETY: the caller guarantees `len` is null or writable.
    if let Some(len) = unsafe { len.as_mut() } {
        *len = plates.len();
    }
    plates.as_ptr()
}

/// Releases a handle. Null is ignored.
///
/// # Safety
///
/// `handle` must be null or a pointer from [`platesim_create`] that has not
/// been destroyed yet.
#[no_mangle]
pub unsafe extern "C" fn platesim_destroy(handle: *mut PlateSimHandle) {
    if handle.is_null() {
        return;
    }
    // SAFETY: non-null handles come from `Box::into_raw` in `platesim_create`
    // and the caller guarantees this is the only destroy call.
    drop(unsafe { Box::from_raw(handle) });
    LIVE_HANDLES.fetch_sub(1, Ordering::SeqCst);
}
