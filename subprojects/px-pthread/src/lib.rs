//! # px-pthread
//!
//! POSIX-style threads and synchronization on top of the `px-exec` host
//! executive.
//!
//! The host only offers tasks, per-task signal bits, a shared/exclusive
//! semaphore, mailboxes and timer requests. This crate builds the classic
//! thread API on them: joinable and detached threads, mutexes with three
//! ownership disciplines, condition variables with FIFO wake-up and timed
//! waits, reader-writer locks, barriers, spinlocks, one-time initialization,
//! thread-specific data, and deferred or asynchronous cancellation with
//! cleanup handlers.
//!
//! All state lives in a process-wide runtime that starts on first use, or
//! explicitly with [`init`].
//!
//! # Exit and cancellation
//!
//! [`exit`] and acted-upon cancellation requests unwind the calling thread to
//! its start trampoline. Code that catches unwinds (`catch_unwind`) must let
//! these pass through. The crate must not be built with `panic = "abort"`.

#[cfg(feature = "ffi")]
mod ffi;

mod barrier;
mod cancel;
mod condvar;
mod config;
mod error;
mod lifecycle;
mod mutex;
mod once;
mod runtime;
mod rwlock;
mod spinlock;
pub mod thread;
mod time;
mod tls;
mod value;
mod wake;

#[doc(inline)]
pub use self::{
    barrier::{Barrier, BarrierWaitResult},
    cancel::{
        CancelState, CancelType, cancel, cleanup_pop, cleanup_push, exit, set_cancel_state,
        set_cancel_type, test_cancel,
    },
    condvar::{CondAttr, Condvar},
    config::{Config, ConfigError, MAX_TABLE_CAPACITY, MIN_STACK_SIZE},
    error::{Error, Result, errno_of},
    mutex::{Mutex, MutexAttr, MutexKind},
    once::Once,
    runtime::{InitError, init, shutdown},
    rwlock::{RwLock, RwLockAttr},
    spinlock::Spinlock,
    thread::{
        DetachState, SchedParam, ThreadAttr, ThreadHandle, create, current, detach, equal, join,
    },
    time::Deadline,
    tls::{Destructor, Key, get_specific, key_create, key_create_with, key_delete, set_specific},
    value::{ExitStatus, Value},
};
