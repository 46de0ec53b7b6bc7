//! FFI bindings for the `px-pthread` crate - Thread-specific data

use core::ffi::{c_int, c_void};

use crate::{
    error::{Error, errno_of},
    tls::{self, Key},
    value::Value,
};

/// Thread-specific data destructor.
pub type KeyDestructor = unsafe extern "C" fn(*mut c_void);

/// Creates a key, with an optional destructor.
///
/// # Safety
///
/// * `key` must be valid for writes.
/// * `destructor` must be safe to call from any exiting thread with the
///   values stored under the key.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __px_pthread_key_create(
    key: *mut u32,
    destructor: Option<KeyDestructor>,
) -> c_int {
    if key.is_null() {
        return Error::InvalidArgument.to_errno();
    }

    let result = match destructor {
        Some(destructor) => tls::key_create_with(move |value: Value| {
            // SAFETY: The caller guarantees `destructor` accepts the key's values.
            unsafe { destructor(value.as_ptr()) }
        }),
        None => tls::key_create(),
    };

    match result {
        Ok(created) => {
            unsafe { key.write(created.as_raw()) };
            0
        }
        Err(err) => err.to_errno(),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn __px_pthread_key_delete(key: u32) -> c_int {
    errno_of(tls::key_delete(Key::from_raw(key)))
}

#[unsafe(no_mangle)]
pub extern "C" fn __px_pthread_setspecific(key: u32, value: *const c_void) -> c_int {
    errno_of(tls::set_specific(Key::from_raw(key), Value::from_ptr(value)))
}

#[unsafe(no_mangle)]
pub extern "C" fn __px_pthread_getspecific(key: u32) -> *mut c_void {
    tls::get_specific(Key::from_raw(key)).as_ptr()
}
