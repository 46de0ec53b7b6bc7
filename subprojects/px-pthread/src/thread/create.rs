use std::{
    panic::{self, AssertUnwindSafe},
    sync::{Arc, atomic::Ordering},
};

use px_exec::{TaskSpec, task};

use super::{
    attr::{DetachState, ThreadAttr},
    handle::ThreadHandle,
    info::ThreadInfo,
    registry,
};
use crate::{
    cancel::ThreadExit,
    error::{Error, Result},
    runtime, tls,
    value::{ExitStatus, Value},
};

/// Starts a new thread running `start`.
///
/// Without attributes the thread is joinable and inherits the calling
/// thread's priority and stack size. The value returned by `start` becomes
/// the thread's result.
///
/// # Errors
///
/// Returns [`Error::Again`] if the thread table is full or the host cannot
/// start another task, and [`Error::InvalidArgument`] for a priority the host
/// cannot represent.
pub fn create<F>(attr: Option<&ThreadAttr>, start: F) -> Result<ThreadHandle>
where
    F: FnOnce() -> Value + Send + 'static,
{
    let runtime = runtime::get();
    let attr = attr.cloned().unwrap_or_default();
    let priority = attr.sched_param().host_priority()?;
    let detached = attr.detach_state() == DetachState::Detached;

    let mut threads = runtime.threads.write();
    let info = threads
        .allocate(|handle| ThreadInfo::new(handle, false, runtime.config.name_len, detached))
        .ok_or(Error::Again)?;
    let handle = info.handle;

    let spec = TaskSpec::new(format!("pthread thread #{}", handle.index()))
        .priority(priority)
        .stack_size(attr.stack_size());

    let child = Arc::clone(&info);
    match task::spawn(spec, move || trampoline(child, start)) {
        Ok(task) => info.bind_task(task),
        Err(err) => {
            log::warn!("failed to start thread {handle}: {err}");
            threads.release(handle);
            return Err(Error::Again);
        }
    }
    drop(threads);

    log::debug!("created thread {handle}");
    Ok(handle)
}

fn trampoline<F>(info: Arc<ThreadInfo>, start: F)
where
    F: FnOnce() -> Value,
{
    info.bind_task(task::current());
    registry::install(Arc::clone(&info));

    // Escape point for exit and cancellation
    let status = match panic::catch_unwind(AssertUnwindSafe(start)) {
        Ok(value) => ExitStatus::Exited(value),
        Err(payload) => match payload.downcast::<ThreadExit>() {
            Ok(exit) => exit.0,
            Err(_) => {
                log::error!("thread {} terminated by panic", info.handle);
                ExitStatus::Panicked
            }
        },
    };

    info.cancel.disable();
    if let Some(task) = info.task() {
        task.clear_exception();
    }

    tls::run_destructors(&info, runtime::get().config.destructor_iterations);

    finish(&info, status);
}

/// Posts the exit status for the joiner, or releases the slot of a detached
/// thread.
fn finish(info: &ThreadInfo, status: ExitStatus) {
    let mut threads = runtime::get().threads.write();

    if info.detached.load(Ordering::Acquire) {
        threads.release(info.handle);
        log::debug!("detached thread {} exited: {status:?}", info.handle);
    } else {
        info.finished.store(true, Ordering::Release);
        info.exit.put(status);
        log::debug!("thread {} exited: {status:?}", info.handle);
    }
}
