//! Thread lifecycle
//!
//! Threads live in a fixed-capacity table owned by the runtime. Threads
//! created with [`create`] get their slot before they start; threads the
//! library did not start (the process's initial thread included) are
//! registered the first time they ask for their own handle. The initial
//! thread always gets [`ThreadHandle::INITIAL`].

use std::sync::Arc;

use crate::{
    error::{Error, Result},
    runtime,
};

mod attr;
mod create;
mod handle;
pub(crate) mod info;
mod join;
pub(crate) mod registry;

pub use self::{
    attr::{DetachState, SchedParam, ThreadAttr},
    create::create,
    handle::ThreadHandle,
    join::{detach, join},
};
use self::info::ThreadInfo;

/// Returns the calling thread's handle.
///
/// Threads not started by this library are registered on first call. Returns
/// [`ThreadHandle::INVALID`] if the thread table has no room left for them.
pub fn current() -> ThreadHandle {
    registry::current().map_or(ThreadHandle::INVALID, |info| info.handle)
}

/// Returns `true` if both handles name the same thread.
pub fn equal(a: ThreadHandle, b: ThreadHandle) -> bool {
    a == b
}

fn lookup(handle: ThreadHandle) -> Result<Arc<ThreadInfo>> {
    runtime::get()
        .threads
        .read()
        .get(handle)
        .cloned()
        .ok_or(Error::NoSuchThread)
}

/// Renames a thread.
///
/// Created threads accept names up to the configured name length, terminator
/// included. Registered threads keep the length of the name they had when
/// they were registered.
///
/// # Errors
///
/// - [`Error::InvalidArgument`] if the name contains a NUL byte.
/// - [`Error::NoSuchThread`] if the handle is stale or unknown.
/// - [`Error::OutOfRange`] if the name does not fit.
pub fn set_name(handle: ThreadHandle, name: &str) -> Result<()> {
    if name.contains('\0') {
        return Err(Error::InvalidArgument);
    }

    let target = lookup(handle)?;
    if name.len() + 1 > target.name_capacity {
        return Err(Error::OutOfRange);
    }

    let task = target.task().ok_or(Error::NoSuchThread)?;
    task.set_name(name);
    Ok(())
}

/// Returns a thread's name.
pub fn name(handle: ThreadHandle) -> Result<String> {
    let target = lookup(handle)?;
    let task = target.task().ok_or(Error::NoSuchThread)?;
    Ok(task.name())
}

/// Copies a thread's name into `buf` as a NUL-terminated string and returns
/// its length without the terminator.
///
/// # Errors
///
/// Returns [`Error::OutOfRange`] if `buf` cannot hold the name and its
/// terminator.
pub fn copy_name(handle: ThreadHandle, buf: &mut [u8]) -> Result<usize> {
    let name = name(handle)?;
    let len = name.len();
    if buf.len() < len + 1 {
        return Err(Error::OutOfRange);
    }

    buf[..len].copy_from_slice(name.as_bytes());
    buf[len] = 0;
    Ok(len)
}

/// Sets a thread's scheduling parameters.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] for a priority the host cannot
/// represent.
pub fn set_sched_param(handle: ThreadHandle, param: SchedParam) -> Result<()> {
    let priority = param.host_priority()?;
    let target = lookup(handle)?;
    let task = target.task().ok_or(Error::NoSuchThread)?;
    task.set_priority(priority);
    Ok(())
}

/// Returns a thread's scheduling parameters.
pub fn sched_param(handle: ThreadHandle) -> Result<SchedParam> {
    let target = lookup(handle)?;
    let task = target.task().ok_or(Error::NoSuchThread)?;
    Ok(SchedParam {
        priority: i32::from(task.priority()),
    })
}

/// Sets a thread's priority.
pub fn set_sched_prio(handle: ThreadHandle, priority: i32) -> Result<()> {
    set_sched_param(handle, SchedParam { priority })
}

/// Probes a thread.
///
/// Signal `0` checks that the handle names a live thread. Signal delivery is
/// not supported.
///
/// # Errors
///
/// Returns [`Error::NoSuchThread`] for a stale or unknown handle and
/// [`Error::InvalidArgument`] for any signal other than `0`.
pub fn kill(handle: ThreadHandle, sig: i32) -> Result<()> {
    lookup(handle)?;
    if sig != 0 {
        return Err(Error::InvalidArgument);
    }
    Ok(())
}
