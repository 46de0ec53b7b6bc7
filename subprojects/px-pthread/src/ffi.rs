//! FFI bindings for the `px-pthread` crate
//!
//! Every entry point returns `0` on success or an errno value. Objects are
//! passed by pointer to caller-provided storage of the crate's own types.
//! Entry points that can act on a cancellation request are `extern
//! "C-unwind"`: cancellation unwinds through the caller's frames.

use std::time::{Duration, SystemTime};

use crate::time::Deadline;

mod barrier;
mod cancel;
mod cond;
mod key;
mod mutex;
mod once;
mod rwlock;
mod spin;
mod thread;

/// Converts an absolute `timespec` on the wall clock into a deadline.
///
/// Returns `None` for a negative time or a nanosecond field out of range.
fn deadline_from_timespec(ts: &libc::timespec) -> Option<Deadline> {
    let secs = u64::try_from(ts.tv_sec).ok()?;
    let nanos = u32::try_from(ts.tv_nsec).ok().filter(|n| *n < 1_000_000_000)?;
    let at = SystemTime::UNIX_EPOCH.checked_add(Duration::new(secs, nanos))?;
    Some(Deadline::Absolute(at))
}

/// Converts a relative `timespec` into a duration.
fn duration_from_timespec(ts: &libc::timespec) -> Option<Duration> {
    let secs = u64::try_from(ts.tv_sec).ok()?;
    let nanos = u32::try_from(ts.tv_nsec).ok().filter(|n| *n < 1_000_000_000)?;
    Some(Duration::new(secs, nanos))
}
