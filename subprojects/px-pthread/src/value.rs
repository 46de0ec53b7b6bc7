//! Opaque pointer-sized values

use static_assertions::const_assert_eq;

/// An opaque pointer-sized value
///
/// Used for thread start arguments, thread results and thread-specific data.
/// The library never dereferences a `Value`; it only stores and hands it back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Value(usize);

const_assert_eq!(size_of::<Value>(), size_of::<*mut ()>());

impl Value {
    /// The null value.
    pub const NULL: Value = Value(0);

    /// Wraps a raw integer.
    pub const fn new(raw: usize) -> Self {
        Self(raw)
    }

    /// Returns the raw integer.
    pub const fn get(self) -> usize {
        self.0
    }

    /// Returns `true` for [`Value::NULL`].
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Wraps a pointer.
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(ptr as usize)
    }

    /// Reinterprets the value as a pointer.
    pub fn as_ptr<T>(self) -> *mut T {
        self.0 as *mut T
    }
}

impl From<usize> for Value {
    fn from(raw: usize) -> Self {
        Self(raw)
    }
}

impl From<Value> for usize {
    fn from(value: Value) -> Self {
        value.0
    }
}

/// How a thread terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// The start routine returned, or the thread called [`exit`](crate::exit).
    Exited(Value),
    /// The thread acted on a cancellation request.
    Canceled,
    /// The start routine panicked.
    Panicked,
}

impl ExitStatus {
    /// Returns the exit value of a thread that exited normally.
    pub fn value(self) -> Option<Value> {
        match self {
            ExitStatus::Exited(value) => Some(value),
            ExitStatus::Canceled | ExitStatus::Panicked => None,
        }
    }

    /// Returns `true` if the thread was canceled.
    pub fn is_canceled(self) -> bool {
        self == ExitStatus::Canceled
    }
}
