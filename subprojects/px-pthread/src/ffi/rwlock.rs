//! FFI bindings for the `px-pthread` crate - Read-write lock

use core::ffi::c_int;

use super::deadline_from_timespec;
use crate::{
    error::{Error, Result, errno_of},
    rwlock::{RwLock, RwLockAttr},
    time::Deadline,
};

/// Initializes a read-write lock.
///
/// # Safety
///
/// `lock` must be valid for writes of an [`RwLock`] not held by any thread,
/// and `attr` must be null or point to an initialized [`RwLockAttr`]. The
/// storage must be uninitialized or hold a destroyed lock.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __px_pthread_rwlock_init(lock: *mut RwLock, attr: *const RwLockAttr) -> c_int {
    if lock.is_null() {
        return Error::InvalidArgument.to_errno();
    }
    unsafe { lock.write(RwLock::new()) };
    errno_of(unsafe { &*lock }.init(unsafe { attr.as_ref() }))
}

/// # Safety
///
/// `lock` must be null or point to a valid [`RwLock`].
unsafe fn with_lock(lock: *mut RwLock, op: impl FnOnce(&RwLock) -> Result<()>) -> c_int {
    match unsafe { lock.as_ref() } {
        Some(lock) => errno_of(op(lock)),
        None => Error::InvalidArgument.to_errno(),
    }
}

/// # Safety
///
/// `lock` and `abstime` must be null or valid.
unsafe fn with_deadline(
    lock: *mut RwLock,
    abstime: *const libc::timespec,
    op: impl FnOnce(&RwLock, Deadline) -> Result<()>,
) -> c_int {
    let Some(deadline) = unsafe { abstime.as_ref() }.and_then(deadline_from_timespec) else {
        return Error::InvalidArgument.to_errno();
    };
    unsafe { with_lock(lock, |lock| op(lock, deadline)) }
}

/// # Safety
///
/// `lock` must point to a valid [`RwLock`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __px_pthread_rwlock_destroy(lock: *mut RwLock) -> c_int {
    unsafe { with_lock(lock, RwLock::destroy) }
}

/// # Safety
///
/// `lock` must point to a valid [`RwLock`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __px_pthread_rwlock_rdlock(lock: *mut RwLock) -> c_int {
    unsafe { with_lock(lock, RwLock::read_lock) }
}

/// # Safety
///
/// `lock` must point to a valid [`RwLock`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __px_pthread_rwlock_wrlock(lock: *mut RwLock) -> c_int {
    unsafe { with_lock(lock, RwLock::write_lock) }
}

/// # Safety
///
/// `lock` must point to a valid [`RwLock`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __px_pthread_rwlock_tryrdlock(lock: *mut RwLock) -> c_int {
    unsafe { with_lock(lock, RwLock::try_read_lock) }
}

/// # Safety
///
/// `lock` must point to a valid [`RwLock`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __px_pthread_rwlock_trywrlock(lock: *mut RwLock) -> c_int {
    unsafe { with_lock(lock, RwLock::try_write_lock) }
}

/// # Safety
///
/// `lock` must point to a valid [`RwLock`] and `abstime` to a valid
/// `timespec`.
#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn __px_pthread_rwlock_timedrdlock(
    lock: *mut RwLock,
    abstime: *const libc::timespec,
) -> c_int {
    unsafe { with_deadline(lock, abstime, |lock, deadline| lock.timed_read_lock(deadline)) }
}

/// # Safety
///
/// `lock` must point to a valid [`RwLock`] and `abstime` to a valid
/// `timespec`.
#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn __px_pthread_rwlock_timedwrlock(
    lock: *mut RwLock,
    abstime: *const libc::timespec,
) -> c_int {
    unsafe { with_deadline(lock, abstime, |lock, deadline| lock.timed_write_lock(deadline)) }
}

/// # Safety
///
/// `lock` must point to a valid [`RwLock`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __px_pthread_rwlock_unlock(lock: *mut RwLock) -> c_int {
    unsafe { with_lock(lock, RwLock::unlock) }
}
