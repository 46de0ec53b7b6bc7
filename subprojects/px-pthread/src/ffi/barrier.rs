//! FFI bindings for the `px-pthread` crate - Barrier

use core::ffi::{c_int, c_uint, c_void};

use crate::{
    barrier::{Barrier, BarrierWaitResult},
    error::{Error, errno_of},
};

/// Returned by `wait` to the one thread elected per cycle.
pub const BARRIER_SERIAL_THREAD: c_int = -1;

/// Initializes a barrier for `count` threads. The attribute object is
/// ignored.
///
/// # Safety
///
/// `barrier` must be valid for writes of a [`Barrier`] no thread waits on.
/// The storage must be uninitialized or hold a destroyed barrier.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __px_pthread_barrier_init(
    barrier: *mut Barrier,
    _attr: *const c_void,
    count: c_uint,
) -> c_int {
    if barrier.is_null() {
        return Error::InvalidArgument.to_errno();
    }

    match Barrier::new(count) {
        Ok(new) => {
            unsafe { barrier.write(new) };
            0
        }
        Err(err) => err.to_errno(),
    }
}

/// # Safety
///
/// `barrier` must point to a valid [`Barrier`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __px_pthread_barrier_destroy(barrier: *mut Barrier) -> c_int {
    match unsafe { barrier.as_ref() } {
        Some(barrier) => errno_of(barrier.destroy()),
        None => Error::InvalidArgument.to_errno(),
    }
}

/// # Safety
///
/// `barrier` must point to a valid [`Barrier`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __px_pthread_barrier_wait(barrier: *mut Barrier) -> c_int {
    let Some(barrier) = (unsafe { barrier.as_ref() }) else {
        return Error::InvalidArgument.to_errno();
    };

    match barrier.wait() {
        Ok(BarrierWaitResult::Serial) => BARRIER_SERIAL_THREAD,
        Ok(BarrierWaitResult::Waiter) => 0,
        Err(err) => err.to_errno(),
    }
}
