//! # px-exec
//!
//! A minimal host executive emulated on top of OS threads.
//!
//! The executive offers exactly the facilities a small message-passing kernel
//! would: preemptively scheduled tasks, a fixed set of per-task wake-up signal
//! bits, a recursive shared/exclusive semaphore, mailboxes and asynchronous
//! timer requests. Nothing more. Higher level synchronization (condition
//! variables, barriers, thread joins) is expected to be built on top of these.
//!
//! # Signal bits
//!
//! Every task owns 32 signal bits. The low 16 are reserved by the executive
//! (see [`SignalSet`]), the upper 16 can be allocated with [`signal::alloc`].
//!
//! # Exceptions
//!
//! A task may install an exception handler for a subset of its signal bits.
//! The handler runs on the task itself, at the next executive entry point
//! (signal wait, yield or delay) after one of the bits arrives, unless the
//! task currently holds exceptions with [`task::hold_exceptions`].

pub mod port;
pub mod sched;
pub mod semaphore;
pub mod signal;
pub mod sync;
pub mod task;
pub mod timer;

#[doc(inline)]
pub use self::{
    port::Port,
    semaphore::Semaphore,
    signal::{SignalBit, SignalSet},
    sync::SemLock,
    task::{Task, TaskId, TaskRef, TaskSpec},
    timer::TimerRequest,
};
