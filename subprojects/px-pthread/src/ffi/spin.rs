//! FFI bindings for the `px-pthread` crate - Spinlock

use core::ffi::c_int;

use crate::{
    error::{Error, errno_of},
    spinlock::Spinlock,
};

/// Initializes a spinlock. Process-shared spinlocks are rejected.
///
/// # Safety
///
/// `lock` must be valid for writes of a [`Spinlock`] not held by any thread.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __px_pthread_spin_init(lock: *mut Spinlock, pshared: c_int) -> c_int {
    if lock.is_null() || pshared == libc::PTHREAD_PROCESS_SHARED {
        return Error::InvalidArgument.to_errno();
    }
    unsafe { lock.write(Spinlock::new()) };
    errno_of(unsafe { &*lock }.init())
}

/// # Safety
///
/// `lock` must point to a valid [`Spinlock`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __px_pthread_spin_destroy(lock: *mut Spinlock) -> c_int {
    match unsafe { lock.as_ref() } {
        Some(lock) => errno_of(lock.destroy()),
        None => Error::InvalidArgument.to_errno(),
    }
}

/// # Safety
///
/// `lock` must point to a valid [`Spinlock`].
#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn __px_pthread_spin_lock(lock: *mut Spinlock) -> c_int {
    match unsafe { lock.as_ref() } {
        Some(lock) => errno_of(lock.lock()),
        None => Error::InvalidArgument.to_errno(),
    }
}

/// # Safety
///
/// `lock` must point to a valid [`Spinlock`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __px_pthread_spin_trylock(lock: *mut Spinlock) -> c_int {
    match unsafe { lock.as_ref() } {
        Some(lock) => errno_of(lock.try_lock()),
        None => Error::InvalidArgument.to_errno(),
    }
}

/// # Safety
///
/// `lock` must point to a valid [`Spinlock`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __px_pthread_spin_unlock(lock: *mut Spinlock) -> c_int {
    match unsafe { lock.as_ref() } {
        Some(lock) => errno_of(lock.unlock()),
        None => Error::InvalidArgument.to_errno(),
    }
}
