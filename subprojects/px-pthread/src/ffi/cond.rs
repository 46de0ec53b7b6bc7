//! FFI bindings for the `px-pthread` crate - Condition variable

use core::ffi::c_int;

use super::{deadline_from_timespec, duration_from_timespec};
use crate::{
    condvar::{CondAttr, Condvar},
    error::{Error, errno_of},
    mutex::Mutex,
};

/// Initializes a condition variable.
///
/// # Safety
///
/// `cond` must be valid for writes of a [`Condvar`] no thread waits on, and
/// `attr` must be null or point to an initialized [`CondAttr`]. The storage
/// must be uninitialized or hold a destroyed condition variable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __px_pthread_cond_init(cond: *mut Condvar, attr: *const CondAttr) -> c_int {
    if cond.is_null() {
        return Error::InvalidArgument.to_errno();
    }
    unsafe { cond.write(Condvar::new()) };
    errno_of(unsafe { &*cond }.init(unsafe { attr.as_ref() }))
}

/// # Safety
///
/// `cond` must point to a valid [`Condvar`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __px_pthread_cond_destroy(cond: *mut Condvar) -> c_int {
    match unsafe { cond.as_ref() } {
        Some(cond) => errno_of(cond.destroy()),
        None => Error::InvalidArgument.to_errno(),
    }
}

/// Waits on `cond`, releasing `mutex` for the duration of the wait.
///
/// # Safety
///
/// `cond` and `mutex` must point to a valid [`Condvar`] and [`Mutex`].
#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn __px_pthread_cond_wait(cond: *mut Condvar, mutex: *mut Mutex) -> c_int {
    let (Some(cond), Some(mutex)) = (unsafe { cond.as_ref() }, unsafe { mutex.as_ref() }) else {
        return Error::InvalidArgument.to_errno();
    };
    errno_of(cond.wait(mutex))
}

/// Waits on `cond` until the absolute wall-clock time `abstime`.
///
/// # Safety
///
/// `cond` and `mutex` must point to a valid [`Condvar`] and [`Mutex`], and
/// `abstime` to a valid `timespec`.
#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn __px_pthread_cond_timedwait(
    cond: *mut Condvar,
    mutex: *mut Mutex,
    abstime: *const libc::timespec,
) -> c_int {
    let (Some(cond), Some(mutex)) = (unsafe { cond.as_ref() }, unsafe { mutex.as_ref() }) else {
        return Error::InvalidArgument.to_errno();
    };
    let Some(deadline) = unsafe { abstime.as_ref() }.and_then(deadline_from_timespec) else {
        return Error::InvalidArgument.to_errno();
    };
    errno_of(cond.timed_wait(mutex, deadline))
}

/// Waits on `cond` for at most `reltime`.
///
/// # Safety
///
/// `cond` and `mutex` must point to a valid [`Condvar`] and [`Mutex`], and
/// `reltime` to a valid `timespec`.
#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn __px_pthread_cond_timedwait_relative_np(
    cond: *mut Condvar,
    mutex: *mut Mutex,
    reltime: *const libc::timespec,
) -> c_int {
    let (Some(cond), Some(mutex)) = (unsafe { cond.as_ref() }, unsafe { mutex.as_ref() }) else {
        return Error::InvalidArgument.to_errno();
    };
    let Some(timeout) = unsafe { reltime.as_ref() }.and_then(duration_from_timespec) else {
        return Error::InvalidArgument.to_errno();
    };
    errno_of(cond.timed_wait_relative(mutex, timeout))
}

/// # Safety
///
/// `cond` must point to a valid [`Condvar`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __px_pthread_cond_signal(cond: *mut Condvar) -> c_int {
    match unsafe { cond.as_ref() } {
        Some(cond) => errno_of(cond.signal()),
        None => Error::InvalidArgument.to_errno(),
    }
}

/// # Safety
///
/// `cond` must point to a valid [`Condvar`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __px_pthread_cond_broadcast(cond: *mut Condvar) -> c_int {
    match unsafe { cond.as_ref() } {
        Some(cond) => errno_of(cond.broadcast()),
        None => Error::InvalidArgument.to_errno(),
    }
}
