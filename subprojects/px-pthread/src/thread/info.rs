use std::sync::{OnceLock, atomic::AtomicBool};

use px_exec::{Port, TaskRef};

use super::handle::ThreadHandle;
use crate::{cancel::CancelControl, tls::TlsValues, value::ExitStatus};

/// Thread control block
///
/// Owned by the thread table. Created threads get theirs before the native
/// task starts; pre-existing threads get one the first time they identify
/// themselves.
pub(crate) struct ThreadInfo {
    pub(crate) handle: ThreadHandle,
    task: OnceLock<TaskRef>,
    /// The thread was not started by this library.
    pub(crate) adopted: bool,
    /// Name buffer size, terminator included.
    pub(crate) name_capacity: usize,
    pub(crate) detached: AtomicBool,
    /// A joiner is waiting on `exit`.
    pub(crate) joining: AtomicBool,
    /// The exit status has been posted to `exit`.
    pub(crate) finished: AtomicBool,
    pub(crate) exit: Port<ExitStatus>,
    pub(crate) cancel: CancelControl,
    pub(crate) tls: TlsValues,
}

impl ThreadInfo {
    pub(crate) fn new(
        handle: ThreadHandle,
        adopted: bool,
        name_capacity: usize,
        detached: bool,
    ) -> Self {
        Self {
            handle,
            task: OnceLock::new(),
            adopted,
            name_capacity,
            detached: AtomicBool::new(detached),
            joining: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            exit: Port::new(),
            cancel: CancelControl::new(),
            tls: TlsValues::new(),
        }
    }

    /// Returns the backing task, once known.
    ///
    /// Both the creator and the new thread bind it, whichever runs first.
    pub(crate) fn task(&self) -> Option<&TaskRef> {
        self.task.get()
    }

    pub(crate) fn bind_task(&self, task: TaskRef) {
        let _ = self.task.set(task);
    }
}
