//! FFI bindings for the `px-pthread` crate - Exit, cancellation and cleanup

use core::ffi::{c_int, c_void};

use crate::{
    cancel::{self, CancelState, CancelType},
    error::{Error, errno_of},
    thread::ThreadHandle,
    value::Value,
};

pub const CANCEL_ENABLE: c_int = 0;
pub const CANCEL_DISABLE: c_int = 1;
pub const CANCEL_DEFERRED: c_int = 0;
pub const CANCEL_ASYNCHRONOUS: c_int = 1;

/// Cleanup handler routine.
pub type CleanupRoutine = unsafe extern "C-unwind" fn(*mut c_void);

/// Terminates the calling thread with `retval` as its result.
#[unsafe(no_mangle)]
pub extern "C-unwind" fn __px_pthread_exit(retval: *mut c_void) -> ! {
    cancel::exit(Value::from_ptr(retval))
}

#[unsafe(no_mangle)]
pub extern "C-unwind" fn __px_pthread_cancel(thread: u32) -> c_int {
    errno_of(cancel::cancel(ThreadHandle::from_raw(thread)))
}

#[unsafe(no_mangle)]
pub extern "C-unwind" fn __px_pthread_testcancel() {
    cancel::test_cancel()
}

/// # Safety
///
/// `old` must be null or valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn __px_pthread_setcancelstate(state: c_int, old: *mut c_int) -> c_int {
    let state = match state {
        CANCEL_ENABLE => CancelState::Enabled,
        CANCEL_DISABLE => CancelState::Disabled,
        _ => return Error::InvalidArgument.to_errno(),
    };

    match cancel::set_cancel_state(state) {
        Ok(previous) => {
            if let Some(old) = unsafe { old.as_mut() } {
                *old = match previous {
                    CancelState::Enabled => CANCEL_ENABLE,
                    CancelState::Disabled => CANCEL_DISABLE,
                };
            }
            0
        }
        Err(err) => err.to_errno(),
    }
}

/// # Safety
///
/// `old` must be null or valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn __px_pthread_setcanceltype(kind: c_int, old: *mut c_int) -> c_int {
    let kind = match kind {
        CANCEL_DEFERRED => CancelType::Deferred,
        CANCEL_ASYNCHRONOUS => CancelType::Asynchronous,
        _ => return Error::InvalidArgument.to_errno(),
    };

    match cancel::set_cancel_type(kind) {
        Ok(previous) => {
            if let Some(old) = unsafe { old.as_mut() } {
                *old = match previous {
                    CancelType::Deferred => CANCEL_DEFERRED,
                    CancelType::Asynchronous => CANCEL_ASYNCHRONOUS,
                };
            }
            0
        }
        Err(err) => err.to_errno(),
    }
}

/// Pushes `routine(arg)` on the calling thread's cleanup stack.
///
/// # Safety
///
/// `routine` must be safe to call with `arg` on the calling thread.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __px_pthread_cleanup_push(routine: CleanupRoutine, arg: *mut c_void) -> c_int {
    let arg = Value::from_ptr(arg);
    errno_of(cancel::cleanup_push(move || {
        // SAFETY: The caller guarantees `routine` accepts `arg`.
        unsafe { routine(arg.as_ptr()) }
    }))
}

/// Pops the most recent cleanup handler, running it if `execute` is non-zero.
#[unsafe(no_mangle)]
pub extern "C-unwind" fn __px_pthread_cleanup_pop(execute: c_int) -> c_int {
    errno_of(cancel::cleanup_pop(execute != 0))
}
