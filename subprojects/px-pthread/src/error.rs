//! Error codes

/// Thread library error
///
/// Every operation reports failure synchronously through this type. The
/// variants map one-to-one onto the classic errno values, see
/// [`Error::to_errno`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum Error {
    /// Null or unknown object, bad enum value, zero count, or an operation
    /// that is not valid in the object's current state.
    #[error("invalid argument")]
    InvalidArgument,
    /// The resource is held or in active use.
    #[error("resource busy")]
    Busy,
    /// Thread slots, TLS keys or wake-up bits are exhausted.
    #[error("resource temporarily unavailable")]
    Again,
    /// The handle does not name a live thread.
    #[error("no such thread")]
    NoSuchThread,
    /// The operation would deadlock the calling thread.
    #[error("resource deadlock would occur")]
    Deadlock,
    /// The caller does not own the resource.
    #[error("operation not permitted")]
    NotOwner,
    /// The deadline elapsed before the operation completed.
    #[error("operation timed out")]
    TimedOut,
    /// A name or buffer does not fit.
    #[error("result out of range")]
    OutOfRange,
}

impl Error {
    /// Returns the errno value of this error.
    pub fn to_errno(self) -> i32 {
        match self {
            Error::InvalidArgument => libc::EINVAL,
            Error::Busy => libc::EBUSY,
            Error::Again => libc::EAGAIN,
            Error::NoSuchThread => libc::ESRCH,
            Error::Deadlock => libc::EDEADLK,
            Error::NotOwner => libc::EPERM,
            Error::TimedOut => libc::ETIMEDOUT,
            Error::OutOfRange => libc::ERANGE,
        }
    }

    /// Maps an errno value back to an error, if it is one of ours.
    pub fn from_errno(errno: i32) -> Option<Self> {
        Some(match errno {
            libc::EINVAL => Error::InvalidArgument,
            libc::EBUSY => Error::Busy,
            libc::EAGAIN => Error::Again,
            libc::ESRCH => Error::NoSuchThread,
            libc::EDEADLK => Error::Deadlock,
            libc::EPERM => Error::NotOwner,
            libc::ETIMEDOUT => Error::TimedOut,
            libc::ERANGE => Error::OutOfRange,
            _ => return None,
        })
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Converts a result into an errno return code, `0` on success.
pub fn errno_of<T>(result: Result<T>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(err) => err.to_errno(),
    }
}
