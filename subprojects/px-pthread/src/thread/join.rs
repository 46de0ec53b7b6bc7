use std::sync::{Arc, atomic::Ordering};

use px_exec::{SignalSet, signal, task};

use super::{handle::ThreadHandle, info::ThreadInfo, registry};
use crate::{
    cancel,
    error::{Error, Result},
    runtime,
    value::ExitStatus,
    wake::WakeBit,
};

/// Waits for a thread to terminate and returns how it ended.
///
/// The thread's slot is released once its status has been collected. This is
/// a cancellation point.
///
/// # Errors
///
/// - [`Error::Deadlock`] if a thread tries to join itself.
/// - [`Error::NoSuchThread`] if the handle is stale or unknown.
/// - [`Error::InvalidArgument`] if the thread is detached, was not created by
///   this library, or is already being joined.
pub fn join(handle: ThreadHandle) -> Result<ExitStatus> {
    cancel::test_cancel();

    let me = registry::current();
    if me.as_ref().is_some_and(|me| me.handle == handle) {
        return Err(Error::Deadlock);
    }

    let target = {
        let threads = runtime::get().threads.read();
        let target = threads.get(handle).ok_or(Error::NoSuchThread)?;
        if target.adopted || target.detached.load(Ordering::Acquire) {
            return Err(Error::InvalidArgument);
        }
        if target.joining.swap(true, Ordering::AcqRel) {
            return Err(Error::InvalidArgument);
        }
        Arc::clone(target)
    };

    let status = wait_exit(&target, me.as_deref());

    runtime::get().threads.write().release(handle);
    log::debug!("joined thread {handle}: {status:?}");

    Ok(status)
}

fn wait_exit(target: &ThreadInfo, me: Option<&ThreadInfo>) -> ExitStatus {
    let wake = WakeBit::take();
    let _hold = task::hold_exceptions();

    target.exit.bind(task::current(), wake.mask());

    let status = loop {
        if let Some(status) = target.exit.get() {
            break status;
        }

        let fired = signal::wait(wake.mask() | SignalSet::CTRL_C);
        if !fired.contains(SignalSet::CTRL_C) {
            continue;
        }

        if let Some(me) = me.filter(|me| me.cancel.should_act()) {
            target.exit.unbind();
            target.joining.store(false, Ordering::Release);
            cancel::act(me);
        }
    };

    target.exit.unbind();
    status
}

/// Marks a thread as detached; its slot is released as soon as it exits.
///
/// A thread that has already exited is reaped immediately.
///
/// # Errors
///
/// Returns [`Error::NoSuchThread`] if the handle is stale or unknown, and
/// [`Error::InvalidArgument`] if the thread is already detached or being
/// joined.
pub fn detach(handle: ThreadHandle) -> Result<()> {
    let mut threads = runtime::get().threads.write();

    let (finished, adopted) = {
        let target = threads.get(handle).ok_or(Error::NoSuchThread)?;
        if target.detached.load(Ordering::Acquire) || target.joining.load(Ordering::Acquire) {
            return Err(Error::InvalidArgument);
        }
        target.detached.store(true, Ordering::Release);
        (target.finished.load(Ordering::Acquire), target.adopted)
    };

    if finished && !adopted {
        threads.release(handle);
        log::debug!("reaped exited thread {handle} on detach");
    } else {
        log::debug!("detached thread {handle}");
    }

    Ok(())
}
