//! FFI bindings for the `px-pthread` crate - Threads

use core::ffi::{c_char, c_int, c_void};
use std::ffi::CStr;

use crate::{
    error::{Error, errno_of},
    thread::{self, DetachState, SchedParam, ThreadAttr, ThreadHandle},
    value::{ExitStatus, Value},
};

/// Result reported by `join` for a canceled thread.
pub const CANCELED: *mut c_void = usize::MAX as *mut c_void;

/// Thread start routine.
pub type StartRoutine = unsafe extern "C-unwind" fn(*mut c_void) -> *mut c_void;

/// Starts a new thread running `start(arg)`.
///
/// # Safety
///
/// * `thread` must be valid for writes.
/// * `attr` must be null or point to an initialized [`ThreadAttr`].
/// * `start` must be safe to call with `arg` from another thread.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __px_pthread_create(
    thread: *mut u32,
    attr: *const ThreadAttr,
    start: StartRoutine,
    arg: *mut c_void,
) -> c_int {
    if thread.is_null() {
        return Error::InvalidArgument.to_errno();
    }

    let attr = unsafe { attr.as_ref() };
    let arg = Value::from_ptr(arg);
    let result = thread::create(attr, move || {
        // SAFETY: The caller guarantees `start` accepts `arg`.
        Value::from_ptr(unsafe { start(arg.as_ptr()) })
    });

    match result {
        Ok(handle) => {
            unsafe { thread.write(handle.as_raw()) };
            0
        }
        Err(err) => err.to_errno(),
    }
}

/// Waits for a thread to terminate and stores its result in `retval`.
///
/// A canceled thread reports [`CANCELED`], a thread that panicked reports
/// null.
///
/// # Safety
///
/// `retval` must be null or valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn __px_pthread_join(thread: u32, retval: *mut *mut c_void) -> c_int {
    match thread::join(ThreadHandle::from_raw(thread)) {
        Ok(status) => {
            if !retval.is_null() {
                let value = match status {
                    ExitStatus::Exited(value) => value.as_ptr(),
                    ExitStatus::Canceled => CANCELED,
                    ExitStatus::Panicked => core::ptr::null_mut(),
                };
                unsafe { retval.write(value) };
            }
            0
        }
        Err(err) => err.to_errno(),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn __px_pthread_detach(thread: u32) -> c_int {
    errno_of(thread::detach(ThreadHandle::from_raw(thread)))
}

#[unsafe(no_mangle)]
pub extern "C" fn __px_pthread_self() -> u32 {
    thread::current().as_raw()
}

#[unsafe(no_mangle)]
pub extern "C" fn __px_pthread_equal(a: u32, b: u32) -> c_int {
    c_int::from(thread::equal(
        ThreadHandle::from_raw(a),
        ThreadHandle::from_raw(b),
    ))
}

/// Renames a thread.
///
/// # Safety
///
/// `name` must point to a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __px_pthread_setname_np(thread: u32, name: *const c_char) -> c_int {
    if name.is_null() {
        return Error::InvalidArgument.to_errno();
    }

    let Ok(name) = unsafe { CStr::from_ptr(name) }.to_str() else {
        return Error::InvalidArgument.to_errno();
    };
    errno_of(thread::set_name(ThreadHandle::from_raw(thread), name))
}

/// Copies a thread's name into `buf`.
///
/// # Safety
///
/// `buf` must be valid for writes of `len` bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __px_pthread_getname_np(thread: u32, buf: *mut c_char, len: usize) -> c_int {
    if buf.is_null() {
        return Error::InvalidArgument.to_errno();
    }

    let buf = unsafe { core::slice::from_raw_parts_mut(buf.cast::<u8>(), len) };
    errno_of(thread::copy_name(ThreadHandle::from_raw(thread), buf))
}

/// # Safety
///
/// `param` must point to a valid `sched_param`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __px_pthread_setschedparam(
    thread: u32,
    _policy: c_int,
    param: *const libc::sched_param,
) -> c_int {
    let Some(param) = (unsafe { param.as_ref() }) else {
        return Error::InvalidArgument.to_errno();
    };

    let param = SchedParam {
        priority: param.sched_priority,
    };
    errno_of(thread::set_sched_param(ThreadHandle::from_raw(thread), param))
}

/// Reports the thread's priority. The policy is always `SCHED_OTHER`.
///
/// # Safety
///
/// `policy` and `param` must be null or valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __px_pthread_getschedparam(
    thread: u32,
    policy: *mut c_int,
    param: *mut libc::sched_param,
) -> c_int {
    match thread::sched_param(ThreadHandle::from_raw(thread)) {
        Ok(sched) => {
            if let Some(policy) = unsafe { policy.as_mut() } {
                *policy = libc::SCHED_OTHER;
            }
            if let Some(param) = unsafe { param.as_mut() } {
                param.sched_priority = sched.priority;
            }
            0
        }
        Err(err) => err.to_errno(),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn __px_pthread_setschedprio(thread: u32, priority: c_int) -> c_int {
    errno_of(thread::set_sched_prio(ThreadHandle::from_raw(thread), priority))
}

#[unsafe(no_mangle)]
pub extern "C" fn __px_pthread_kill(thread: u32, sig: c_int) -> c_int {
    errno_of(thread::kill(ThreadHandle::from_raw(thread), sig))
}

/// Initializes thread attributes from the calling thread.
///
/// # Safety
///
/// `attr` must be valid for writes of a [`ThreadAttr`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __px_pthread_attr_init(attr: *mut ThreadAttr) -> c_int {
    if attr.is_null() {
        return Error::InvalidArgument.to_errno();
    }
    unsafe { attr.write(ThreadAttr::new()) };
    0
}

/// # Safety
///
/// `attr` must point to an initialized [`ThreadAttr`], not used afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __px_pthread_attr_destroy(attr: *mut ThreadAttr) -> c_int {
    if attr.is_null() {
        return Error::InvalidArgument.to_errno();
    }
    unsafe { core::ptr::drop_in_place(attr) };
    0
}

/// # Safety
///
/// `attr` must point to an initialized [`ThreadAttr`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __px_pthread_attr_setdetachstate(
    attr: *mut ThreadAttr,
    state: c_int,
) -> c_int {
    let Some(attr) = (unsafe { attr.as_mut() }) else {
        return Error::InvalidArgument.to_errno();
    };

    let state = match state {
        libc::PTHREAD_CREATE_JOINABLE => DetachState::Joinable,
        libc::PTHREAD_CREATE_DETACHED => DetachState::Detached,
        _ => return Error::InvalidArgument.to_errno(),
    };
    attr.set_detach_state(state);
    0
}

/// # Safety
///
/// `attr` must point to an initialized [`ThreadAttr`] and `state` must be
/// valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __px_pthread_attr_getdetachstate(
    attr: *const ThreadAttr,
    state: *mut c_int,
) -> c_int {
    let (Some(attr), false) = (unsafe { attr.as_ref() }, state.is_null()) else {
        return Error::InvalidArgument.to_errno();
    };

    let raw = match attr.detach_state() {
        DetachState::Joinable => libc::PTHREAD_CREATE_JOINABLE,
        DetachState::Detached => libc::PTHREAD_CREATE_DETACHED,
    };
    unsafe { state.write(raw) };
    0
}

/// # Safety
///
/// `attr` must point to an initialized [`ThreadAttr`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __px_pthread_attr_setstacksize(attr: *mut ThreadAttr, size: usize) -> c_int {
    let Some(attr) = (unsafe { attr.as_mut() }) else {
        return Error::InvalidArgument.to_errno();
    };
    errno_of(attr.set_stack_size(size))
}

/// # Safety
///
/// `attr` must point to an initialized [`ThreadAttr`] and `size` must be
/// valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __px_pthread_attr_getstacksize(
    attr: *const ThreadAttr,
    size: *mut usize,
) -> c_int {
    let (Some(attr), false) = (unsafe { attr.as_ref() }, size.is_null()) else {
        return Error::InvalidArgument.to_errno();
    };
    unsafe { size.write(attr.stack_size()) };
    0
}

/// # Safety
///
/// `attr` must point to an initialized [`ThreadAttr`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __px_pthread_attr_setstack(
    attr: *mut ThreadAttr,
    addr: *mut c_void,
    size: usize,
) -> c_int {
    let Some(attr) = (unsafe { attr.as_mut() }) else {
        return Error::InvalidArgument.to_errno();
    };
    errno_of(attr.set_stack(addr as usize, size))
}

/// # Safety
///
/// `attr` must point to an initialized [`ThreadAttr`] and `param` to a valid
/// `sched_param`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __px_pthread_attr_setschedparam(
    attr: *mut ThreadAttr,
    param: *const libc::sched_param,
) -> c_int {
    let (Some(attr), Some(param)) = (unsafe { attr.as_mut() }, unsafe { param.as_ref() }) else {
        return Error::InvalidArgument.to_errno();
    };

    errno_of(attr.set_sched_param(SchedParam {
        priority: param.sched_priority,
    }))
}

/// # Safety
///
/// `attr` must point to an initialized [`ThreadAttr`] and `param` must be
/// valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __px_pthread_attr_getschedparam(
    attr: *const ThreadAttr,
    param: *mut libc::sched_param,
) -> c_int {
    let (Some(attr), Some(param)) = (unsafe { attr.as_ref() }, unsafe { param.as_mut() }) else {
        return Error::InvalidArgument.to_errno();
    };
    param.sched_priority = attr.sched_param().priority;
    0
}
