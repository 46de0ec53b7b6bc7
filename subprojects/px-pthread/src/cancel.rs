//! Cancellation and cleanup handlers
//!
//! A cancellation request sets the target's pending flag and raises
//! [`SignalSet::CTRL_C`] on its task. Deferred targets notice the flag at the
//! next cancellation point: [`test_cancel`], [`join`], and the condition
//! waits. Asynchronous targets additionally run a task exception handler on
//! `CTRL_C`, which acts at the next host entry point (signal wait, yield or
//! delay) outside sections that hold exceptions.
//!
//! Acting on a request runs the cleanup handlers in LIFO order and unwinds the
//! thread to its start trampoline with an [`ExitStatus::Canceled`] result.
//! Asynchronous cancellation is unsafe around code that manipulates
//! non-reentrant state; only enable it around pure computation.
//!
//! [`join`]: crate::join

use std::{
    panic, process,
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
};

use bitflags::bitflags;
use parking_lot::Mutex;
use px_exec::SignalSet;

use crate::{
    error::{Error, Result},
    runtime,
    thread::{ThreadHandle, info::ThreadInfo, registry},
    tls,
    value::{ExitStatus, Value},
};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct CancelFlags: u8 {
        const DISABLED = 1 << 0;
        const ASYNCHRONOUS = 1 << 1;
        const PENDING = 1 << 2;
        /// The thread is already on its way out.
        const ACTING = 1 << 3;
    }
}

/// Whether cancellation requests are acted upon
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CancelState {
    #[default]
    Enabled,
    Disabled,
}

/// When enabled cancellation requests are acted upon
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CancelType {
    /// At cancellation points only.
    #[default]
    Deferred,
    /// As soon as the thread enters the host.
    Asynchronous,
}

type CleanupHandler = Box<dyn FnOnce() + Send>;

/// Unwind payload carrying a thread's exit status to its trampoline.
pub(crate) struct ThreadExit(pub(crate) ExitStatus);

/// Per-thread cancellation state
pub(crate) struct CancelControl {
    flags: AtomicU8,
    cleanup: Mutex<Vec<CleanupHandler>>,
}

impl CancelControl {
    pub(crate) fn new() -> Self {
        Self {
            flags: AtomicU8::new(0),
            cleanup: Mutex::new(Vec::new()),
        }
    }

    fn flags(&self) -> CancelFlags {
        CancelFlags::from_bits_retain(self.flags.load(Ordering::Acquire))
    }

    /// Sets or clears `flag`, returning the previous flags.
    fn update(&self, flag: CancelFlags, on: bool) -> CancelFlags {
        let previous = if on {
            self.flags.fetch_or(flag.bits(), Ordering::AcqRel)
        } else {
            self.flags.fetch_and(!flag.bits(), Ordering::AcqRel)
        };
        CancelFlags::from_bits_retain(previous)
    }

    /// Returns `true` if a pending request must be acted upon at a
    /// cancellation point.
    pub(crate) fn should_act(&self) -> bool {
        let flags = self.flags();
        flags.contains(CancelFlags::PENDING)
            && !flags.intersects(CancelFlags::DISABLED | CancelFlags::ACTING)
    }

    fn should_act_async(&self) -> bool {
        self.should_act() && self.flags().contains(CancelFlags::ASYNCHRONOUS)
    }

    /// Stops acting on further requests.
    pub(crate) fn disable(&self) {
        self.update(CancelFlags::DISABLED | CancelFlags::ACTING, true);
    }

    fn push(&self, handler: CleanupHandler) {
        self.cleanup.lock().push(handler);
    }

    fn pop(&self) -> Option<CleanupHandler> {
        self.cleanup.lock().pop()
    }

    /// Runs and drops all cleanup handlers, newest first.
    fn run_cleanup(&self) {
        // A handler may push or pop handlers itself
        while let Some(handler) = self.pop() {
            handler();
        }
    }
}

fn me() -> Result<Arc<ThreadInfo>> {
    registry::current().ok_or(Error::Again)
}

/// Sets the calling thread's cancel state and returns the previous one.
///
/// Enabling cancellation on an asynchronous thread with a pending request
/// acts on it immediately.
pub fn set_cancel_state(state: CancelState) -> Result<CancelState> {
    let me = me()?;
    let previous = me
        .cancel
        .update(CancelFlags::DISABLED, state == CancelState::Disabled);

    if me.cancel.should_act_async() {
        act(&me);
    }

    Ok(if previous.contains(CancelFlags::DISABLED) {
        CancelState::Disabled
    } else {
        CancelState::Enabled
    })
}

/// Sets the calling thread's cancel type and returns the previous one.
pub fn set_cancel_type(kind: CancelType) -> Result<CancelType> {
    let me = me()?;
    let asynchronous = kind == CancelType::Asynchronous;
    let previous = me.cancel.update(CancelFlags::ASYNCHRONOUS, asynchronous);

    if let Some(task) = me.task() {
        if asynchronous {
            task.set_exception(SignalSet::CTRL_C, Arc::new(async_cancel_hook));
        } else {
            task.clear_exception();
        }
    }

    if me.cancel.should_act_async() {
        act(&me);
    }

    Ok(if previous.contains(CancelFlags::ASYNCHRONOUS) {
        CancelType::Asynchronous
    } else {
        CancelType::Deferred
    })
}

fn async_cancel_hook(_: SignalSet) {
    if let Some(me) = registry::cached() {
        if me.cancel.should_act_async() {
            act(&me);
        }
    }
}

/// Requests cancellation of `handle`.
///
/// # Errors
///
/// Returns [`Error::NoSuchThread`] if the handle does not name a live thread.
pub fn cancel(handle: ThreadHandle) -> Result<()> {
    let target = runtime::get()
        .threads
        .read()
        .get(handle)
        .cloned()
        .ok_or(Error::NoSuchThread)?;

    log::debug!("cancellation requested for thread {handle}");
    target.cancel.update(CancelFlags::PENDING, true);

    let is_self = registry::cached().is_some_and(|me| Arc::ptr_eq(&me, &target));
    if is_self {
        if target.cancel.should_act_async() {
            act(&target);
        }
        return Ok(());
    }

    // A thread that has not bound its task yet sees the flag on its first
    // cancellation point
    if let Some(task) = target.task() {
        task.signal(SignalSet::CTRL_C);
    }

    Ok(())
}

/// Acts on a pending cancellation request of the calling thread.
pub fn test_cancel() {
    if let Some(me) = registry::cached() {
        if me.cancel.should_act() {
            act(&me);
        }
    }
}

/// Pushes a cleanup handler, run if the thread is canceled or exits before
/// the matching [`cleanup_pop`].
pub fn cleanup_push<F>(handler: F) -> Result<()>
where
    F: FnOnce() + Send + 'static,
{
    me()?.cancel.push(Box::new(handler));
    Ok(())
}

/// Pops the most recently pushed cleanup handler, running it if `execute`.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] if no handler is pushed.
pub fn cleanup_pop(execute: bool) -> Result<()> {
    let handler = me()?.cancel.pop().ok_or(Error::InvalidArgument)?;
    if execute {
        handler();
    }
    Ok(())
}

/// Terminates the calling thread with `value` as its result.
///
/// Cleanup handlers run first, newest first. Thread-specific data destructors
/// run once the thread has unwound to its start trampoline.
///
/// Threads this library did not start have no trampoline. Their destructors
/// run before unwinding. The initial thread then waits for the created
/// threads, see [`shutdown`], and ends the process with status 0. Any other
/// such thread unwinds out of its own entry point.
///
/// [`shutdown`]: crate::shutdown
pub fn exit(value: Value) -> ! {
    let me = registry::cached();
    if let Some(me) = me.as_deref() {
        log::debug!("thread {} exiting", me.handle);
        me.cancel.disable();
        me.cancel.run_cleanup();
    }
    unwind(me.as_deref(), ExitStatus::Exited(value))
}

/// Acts on a cancellation request: runs the cleanup handlers and unwinds the
/// thread.
pub(crate) fn act(me: &ThreadInfo) -> ! {
    log::debug!("thread {} acting on cancellation", me.handle);
    me.cancel.disable();
    me.cancel.run_cleanup();
    unwind(Some(me), ExitStatus::Canceled)
}

fn unwind(me: Option<&ThreadInfo>, status: ExitStatus) -> ! {
    if let Some(me) = me.filter(|me| me.adopted) {
        tls::run_destructors(me, runtime::get().config.destructor_iterations);

        if me.handle == ThreadHandle::INITIAL {
            log::debug!("initial thread exited, waiting for the remaining threads");
            runtime::shutdown();
            process::exit(0);
        }
        log::warn!(
            "thread {} was not started by this library, unwinding out of its entry point",
            me.handle
        );
    }
    panic::resume_unwind(Box::new(ThreadExit(status)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_act_requires_enabled_pending() {
        let control = CancelControl::new();
        assert!(!control.should_act());

        control.update(CancelFlags::PENDING, true);
        assert!(control.should_act());
        assert!(!control.should_act_async());

        control.update(CancelFlags::DISABLED, true);
        assert!(!control.should_act());
    }

    #[test]
    fn test_cleanup_runs_lifo() {
        let control = CancelControl::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let order = Arc::clone(&order);
            control.push(Box::new(move || order.lock().push(i)));
        }
        control.run_cleanup();

        assert_eq!(*order.lock(), vec![2, 1, 0]);
        assert!(control.pop().is_none());
    }

    #[test]
    fn test_exit_on_registered_thread() {
        use std::sync::atomic::AtomicUsize;

        let cleaned = Arc::new(AtomicUsize::new(0));
        let destroyed = Arc::new(AtomicUsize::new(0));

        let (cleanup, sink) = (Arc::clone(&cleaned), Arc::clone(&destroyed));
        let status = std::thread::spawn(move || {
            let key = tls::key_create_with(move |value| {
                sink.store(value.get(), Ordering::Release);
            })
            .unwrap();
            tls::set_specific(key, Value::new(8)).unwrap();
            cleanup_push(move || cleanup.store(1, Ordering::Release)).unwrap();

            let payload = panic::catch_unwind(|| -> Value { exit(Value::new(4)) }).unwrap_err();
            tls::key_delete(key).unwrap();
            payload.downcast::<ThreadExit>().ok().map(|exit| exit.0)
        })
        .join()
        .unwrap();

        assert_eq!(status, Some(ExitStatus::Exited(Value::new(4))));
        assert_eq!(cleaned.load(Ordering::Acquire), 1);
        assert_eq!(destroyed.load(Ordering::Acquire), 8);
    }
}
