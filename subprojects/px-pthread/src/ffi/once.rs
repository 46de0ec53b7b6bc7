//! FFI bindings for the `px-pthread` crate - One-time initialization

use core::ffi::c_int;

use crate::{
    error::{Error, errno_of},
    once::Once,
};

/// One-time initialization routine.
pub type InitRoutine = unsafe extern "C-unwind" fn();

/// Runs `init` once per control.
///
/// # Safety
///
/// `control` must point to a valid [`Once`] and `init` must be safe to call.
#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn __px_pthread_once(control: *mut Once, init: InitRoutine) -> c_int {
    match unsafe { control.as_ref() } {
        // SAFETY: The caller guarantees `init` is safe to call.
        Some(control) => errno_of(control.call_once(|| unsafe { init() })),
        None => Error::InvalidArgument.to_errno(),
    }
}
