//! FFI bindings for the `px-pthread` crate - Mutex

use core::ffi::c_int;

use super::deadline_from_timespec;
use crate::{
    error::{Error, errno_of},
    mutex::{Mutex, MutexAttr, MutexKind},
};

/// Initializes a mutex.
///
/// # Safety
///
/// `mutex` must be valid for writes of a [`Mutex`] not in use by any thread,
/// and `attr` must be null or point to an initialized [`MutexAttr`]. The
/// storage must be uninitialized or hold a destroyed mutex: a live mutex is
/// overwritten without being dropped.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __px_pthread_mutex_init(mutex: *mut Mutex, attr: *const MutexAttr) -> c_int {
    if mutex.is_null() {
        return Error::InvalidArgument.to_errno();
    }

    let kind = unsafe { attr.as_ref() }.map_or(MutexKind::Normal, MutexAttr::kind);
    unsafe { mutex.write(Mutex::with_kind(kind)) };
    errno_of(unsafe { &*mutex }.init(unsafe { attr.as_ref() }))
}

/// # Safety
///
/// `mutex` must point to a valid [`Mutex`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __px_pthread_mutex_destroy(mutex: *mut Mutex) -> c_int {
    match unsafe { mutex.as_ref() } {
        Some(mutex) => errno_of(mutex.destroy()),
        None => Error::InvalidArgument.to_errno(),
    }
}

/// # Safety
///
/// `mutex` must point to a valid [`Mutex`].
#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn __px_pthread_mutex_lock(mutex: *mut Mutex) -> c_int {
    match unsafe { mutex.as_ref() } {
        Some(mutex) => errno_of(mutex.lock()),
        None => Error::InvalidArgument.to_errno(),
    }
}

/// # Safety
///
/// `mutex` must point to a valid [`Mutex`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __px_pthread_mutex_trylock(mutex: *mut Mutex) -> c_int {
    match unsafe { mutex.as_ref() } {
        Some(mutex) => errno_of(mutex.try_lock()),
        None => Error::InvalidArgument.to_errno(),
    }
}

/// Locks the mutex, giving up at the absolute wall-clock time `abstime`.
///
/// # Safety
///
/// `mutex` must point to a valid [`Mutex`] and `abstime` to a valid
/// `timespec`.
#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn __px_pthread_mutex_timedlock(
    mutex: *mut Mutex,
    abstime: *const libc::timespec,
) -> c_int {
    let (Some(mutex), Some(abstime)) = (unsafe { mutex.as_ref() }, unsafe { abstime.as_ref() })
    else {
        return Error::InvalidArgument.to_errno();
    };
    let Some(deadline) = deadline_from_timespec(abstime) else {
        return Error::InvalidArgument.to_errno();
    };
    errno_of(mutex.timed_lock(deadline))
}

/// # Safety
///
/// `mutex` must point to a valid [`Mutex`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __px_pthread_mutex_unlock(mutex: *mut Mutex) -> c_int {
    match unsafe { mutex.as_ref() } {
        Some(mutex) => errno_of(mutex.unlock()),
        None => Error::InvalidArgument.to_errno(),
    }
}

/// # Safety
///
/// `attr` must be valid for writes of a [`MutexAttr`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __px_pthread_mutexattr_init(attr: *mut MutexAttr) -> c_int {
    if attr.is_null() {
        return Error::InvalidArgument.to_errno();
    }
    unsafe { attr.write(MutexAttr::new()) };
    0
}

/// # Safety
///
/// `attr` must point to an initialized [`MutexAttr`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __px_pthread_mutexattr_settype(attr: *mut MutexAttr, kind: c_int) -> c_int {
    let (Some(attr), Some(kind)) = (unsafe { attr.as_mut() }, MutexKind::from_raw(kind)) else {
        return Error::InvalidArgument.to_errno();
    };
    attr.set_kind(kind);
    0
}

/// # Safety
///
/// `attr` must point to an initialized [`MutexAttr`] and `kind` must be
/// valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __px_pthread_mutexattr_gettype(
    attr: *const MutexAttr,
    kind: *mut c_int,
) -> c_int {
    let (Some(attr), Some(kind)) = (unsafe { attr.as_ref() }, unsafe { kind.as_mut() }) else {
        return Error::InvalidArgument.to_errno();
    };
    *kind = attr.kind().to_raw();
    0
}

/// # Safety
///
/// `attr` must point to an initialized [`MutexAttr`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __px_pthread_mutexattr_setpshared(
    attr: *mut MutexAttr,
    pshared: c_int,
) -> c_int {
    let Some(attr) = (unsafe { attr.as_mut() }) else {
        return Error::InvalidArgument.to_errno();
    };
    errno_of(attr.set_process_shared(pshared == libc::PTHREAD_PROCESS_SHARED))
}
