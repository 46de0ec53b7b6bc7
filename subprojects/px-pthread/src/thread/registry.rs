//! Thread table
//!
//! A fixed-capacity arena of thread control blocks with a free list. Slot 0 is
//! reserved for the process's initial thread and never handed to created
//! threads. Every release bumps the slot's generation, which is part of the
//! handle. A slot whose generation would wrap is retired, so a stale handle
//! never names a later occupant.
//!
//! The table lives in the runtime behind a process-wide [`SemLock`]. Lock
//! order: thread table first, then any per-thread state.
//!
//! [`SemLock`]: px_exec::SemLock

use std::{cell::OnceCell, sync::Arc};

use px_exec::task;

use super::{handle::ThreadHandle, info::ThreadInfo};
use crate::runtime;

/// Native name of the process's initial thread.
const INITIAL_THREAD_NAME: &str = "main";

thread_local! {
    static CURRENT: OnceCell<Arc<ThreadInfo>> = const { OnceCell::new() };
}

struct Slot {
    generation: u16,
    retired: bool,
    thread: Option<Arc<ThreadInfo>>,
}

pub(crate) struct Registry {
    slots: Vec<Slot>,
    free: Vec<usize>,
}

impl Registry {
    pub(crate) fn new(capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|_| Slot {
                generation: 0,
                retired: false,
                thread: None,
            })
            .collect();

        // Popped from the back: index 1 is handed out first
        let free = (1..capacity).rev().collect();

        Self { slots, free }
    }

    /// Takes a free slot for a new control block.
    ///
    /// Slots of dead adopted threads are reclaimed when the free list runs dry.
    pub(crate) fn allocate<F>(&mut self, make: F) -> Option<Arc<ThreadInfo>>
    where
        F: FnOnce(ThreadHandle) -> ThreadInfo,
    {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.sweep();
                self.free.pop()?
            }
        };

        Some(self.occupy(index, make))
    }

    /// Takes slot 0, falling back to a regular slot if it is occupied by a
    /// live thread.
    pub(crate) fn claim_initial<F>(&mut self, make: F) -> Option<Arc<ThreadInfo>>
    where
        F: FnOnce(ThreadHandle) -> ThreadInfo,
    {
        let stale = self.slots[0]
            .thread
            .as_ref()
            .is_some_and(|info| !is_live_adoption(info));
        if stale {
            let handle = ThreadHandle::new(0, self.slots[0].generation);
            self.release(handle);
        }

        if self.slots[0].thread.is_none() && !self.slots[0].retired {
            Some(self.occupy(0, make))
        } else {
            self.allocate(make)
        }
    }

    fn occupy<F>(&mut self, index: usize, make: F) -> Arc<ThreadInfo>
    where
        F: FnOnce(ThreadHandle) -> ThreadInfo,
    {
        let slot = &mut self.slots[index];
        let info = Arc::new(make(ThreadHandle::new(index, slot.generation)));
        slot.thread = Some(Arc::clone(&info));
        info
    }

    /// Resolves a handle to its live control block.
    pub(crate) fn get(&self, handle: ThreadHandle) -> Option<&Arc<ThreadInfo>> {
        let slot = self.slots.get(handle.index())?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.thread.as_ref()
    }

    /// Clears the slot named by `handle` and makes it reusable.
    pub(crate) fn release(&mut self, handle: ThreadHandle) -> Option<Arc<ThreadInfo>> {
        let index = handle.index();
        let slot = self.slots.get_mut(index)?;
        if slot.generation != handle.generation() {
            return None;
        }

        let info = slot.thread.take()?;
        match slot.generation.checked_add(1) {
            Some(generation) => slot.generation = generation,
            None => {
                log::warn!("retiring thread slot {index} after {} reuses", u16::MAX);
                slot.retired = true;
                return Some(info);
            }
        }
        if index != 0 {
            self.free.push(index);
        }

        Some(info)
    }

    /// Releases the slots of adopted threads whose native thread has exited.
    pub(crate) fn sweep(&mut self) -> usize {
        let dead: Vec<_> = self
            .threads()
            .filter(|info| info.adopted && !is_live_adoption(info))
            .map(|info| info.handle)
            .collect();

        for handle in &dead {
            log::trace!("reclaiming slot of exited thread {handle}");
            self.release(*handle);
        }

        dead.len()
    }

    /// Iterates over all live control blocks.
    pub(crate) fn threads(&self) -> impl Iterator<Item = &Arc<ThreadInfo>> {
        self.slots.iter().filter_map(|slot| slot.thread.as_ref())
    }
}

fn is_live_adoption(info: &ThreadInfo) -> bool {
    !info.adopted || info.task().is_some_and(|task| task.is_alive())
}

/// Returns the calling thread's control block if it already has one.
pub(crate) fn cached() -> Option<Arc<ThreadInfo>> {
    CURRENT
        .try_with(|cell| cell.get().map(Arc::clone))
        .ok()
        .flatten()
}

/// Returns the calling thread's control block, registering the thread if it
/// was not started by this library.
///
/// Returns `None` if the thread table is full.
pub(crate) fn current() -> Option<Arc<ThreadInfo>> {
    cached().or_else(|| adopt(false))
}

/// Binds `info` to the calling thread.
pub(crate) fn install(info: Arc<ThreadInfo>) {
    let _ = CURRENT.try_with(|cell| cell.set(info));
}

/// Registers the calling thread.
///
/// The initial thread takes slot 0; it is recognised by name, or named
/// explicitly by `initial` during runtime startup.
pub(crate) fn adopt(initial: bool) -> Option<Arc<ThreadInfo>> {
    let runtime = runtime::get();
    let task = task::current();
    let name_capacity = task.name().len() + 1;
    let initial = initial || task.name() == INITIAL_THREAD_NAME;

    let make = |handle| {
        let info = ThreadInfo::new(handle, true, name_capacity, false);
        info.bind_task(Arc::clone(&task));
        info
    };

    let registered = {
        let mut threads = runtime.threads.write();
        if initial {
            threads.claim_initial(make)
        } else {
            threads.allocate(make)
        }
    };

    match registered {
        Some(info) => {
            log::debug!("registered {} as thread {}", task.id(), info.handle);
            install(Arc::clone(&info));
            Some(info)
        }
        None => {
            log::warn!("thread table full, cannot register {}", task.id());
            None
        }
    }
}
