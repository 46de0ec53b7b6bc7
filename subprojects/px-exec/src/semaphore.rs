//! Recursive shared/exclusive semaphore
//!
//! The semaphore can be held exclusively by one task (recursively) or shared
//! by any number of tasks. Blocked requests are queued in arrival order and
//! ownership is handed off directly on release: the releasing task grants the
//! lock to the head of the queue (or to the run of shared requests at the head)
//! and raises [`SignalSet::SINGLE`] on the new holders.
//!
//! Requesting shared access while holding the semaphore exclusively succeeds
//! and counts as one more level of nesting. A shared holder requesting
//! exclusive access blocks forever.

use std::{collections::VecDeque, fmt};

use parking_lot::Mutex;

use crate::{
    signal::SignalSet,
    task::{self, TaskId, TaskRef},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Exclusive,
    Shared,
}

struct Waiter {
    ticket: u64,
    task: TaskRef,
    mode: Mode,
}

struct State {
    /// Exclusive owner. Never set while `shared` is non-empty.
    owner: Option<TaskId>,
    /// Total hold count, shared and exclusive.
    nest: u32,
    /// One entry per shared hold.
    shared: Vec<TaskId>,
    queue: VecDeque<Waiter>,
    next_ticket: u64,
}

impl State {
    fn try_acquire(&mut self, mode: Mode, me: TaskId) -> bool {
        match mode {
            Mode::Exclusive => match self.owner {
                Some(owner) if owner == me => {
                    self.nest += 1;
                    true
                }
                None if self.shared.is_empty() && self.queue.is_empty() => {
                    self.owner = Some(me);
                    self.nest = 1;
                    true
                }
                _ => false,
            },
            Mode::Shared => match self.owner {
                Some(owner) if owner == me => {
                    self.nest += 1;
                    true
                }
                // Queued writers block new readers, but not readers that
                // already hold the lock
                None if self.queue.is_empty() || self.shared.contains(&me) => {
                    self.shared.push(me);
                    self.nest += 1;
                    true
                }
                _ => false,
            },
        }
    }

    fn release(&mut self, me: TaskId) -> Result<(), ReleaseError> {
        if self.owner == Some(me) {
            self.nest -= 1;
            if self.nest == 0 {
                self.owner = None;
                self.grant_waiters();
            }
            return Ok(());
        }

        let Some(pos) = self.shared.iter().rposition(|id| *id == me) else {
            return Err(ReleaseError::NotHeld);
        };

        self.shared.swap_remove(pos);
        self.nest -= 1;
        if self.shared.is_empty() {
            self.grant_waiters();
        }

        Ok(())
    }

    /// Grants the lock to as many queued requests as can hold it together.
    fn grant_waiters(&mut self) {
        if self.owner.is_some() {
            return;
        }

        while let Some(head) = self.queue.front() {
            match head.mode {
                Mode::Exclusive if !self.shared.is_empty() => break,
                Mode::Exclusive => {
                    let Some(waiter) = self.queue.pop_front() else {
                        break;
                    };
                    self.owner = Some(waiter.task.id());
                    self.nest = 1;
                    waiter.task.signal(SignalSet::SINGLE);
                    break;
                }
                Mode::Shared => {
                    let Some(waiter) = self.queue.pop_front() else {
                        break;
                    };
                    self.shared.push(waiter.task.id());
                    self.nest += 1;
                    waiter.task.signal(SignalSet::SINGLE);
                }
            }
        }
    }
}

/// Recursive shared/exclusive semaphore
pub struct Semaphore {
    state: Mutex<State>,
}

impl Semaphore {
    /// Creates an unlocked semaphore.
    pub const fn new() -> Self {
        Self {
            state: parking_lot::const_mutex(State {
                owner: None,
                nest: 0,
                shared: Vec::new(),
                queue: VecDeque::new(),
                next_ticket: 0,
            }),
        }
    }

    /// Obtains the semaphore exclusively, blocking until it is available.
    pub fn obtain(&self) {
        // Without an abort mask the acquire can only end in success
        let _ = self.acquire(Mode::Exclusive, SignalSet::empty());
    }

    /// Obtains the semaphore in shared mode, blocking until it is available.
    pub fn obtain_shared(&self) {
        let _ = self.acquire(Mode::Shared, SignalSet::empty());
    }

    /// Obtains the semaphore exclusively unless a signal in `mask` arrives
    /// first.
    ///
    /// Returns the signals that aborted the request. A grant that races with
    /// an abort signal wins: the call then returns `Ok(())`.
    pub fn obtain_or_signal(&self, mask: SignalSet) -> Result<(), SignalSet> {
        self.acquire(Mode::Exclusive, mask - SignalSet::SINGLE)
    }

    /// Tries to obtain the semaphore exclusively without blocking.
    pub fn attempt(&self) -> bool {
        let me = task::current_id();
        self.state.lock().try_acquire(Mode::Exclusive, me)
    }

    /// Tries to obtain the semaphore in shared mode without blocking.
    pub fn attempt_shared(&self) -> bool {
        let me = task::current_id();
        self.state.lock().try_acquire(Mode::Shared, me)
    }

    /// Releases one level of the calling task's hold.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::NotHeld`] if the caller holds the semaphore in
    /// neither mode.
    pub fn release(&self) -> Result<(), ReleaseError> {
        let me = task::current_id();
        self.state.lock().release(me)
    }

    /// Returns the exclusive owner, if any.
    pub fn owner(&self) -> Option<TaskId> {
        self.state.lock().owner
    }

    /// Returns the total number of holds, shared and exclusive.
    pub fn nest_count(&self) -> u32 {
        self.state.lock().nest
    }

    /// Returns the number of blocked requests.
    pub fn waiter_count(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Returns `true` if the caller holds the semaphore in any mode.
    pub fn is_held_by_current(&self) -> bool {
        let me = task::current_id();
        let state = self.state.lock();
        state.owner == Some(me) || state.shared.contains(&me)
    }

    /// Returns `true` if the semaphore is held in any mode.
    pub fn is_locked(&self) -> bool {
        let state = self.state.lock();
        state.owner.is_some() || !state.shared.is_empty()
    }

    /// Frees the holder and waiter buffers once they are empty.
    pub fn shrink_to_fit(&self) {
        let mut state = self.state.lock();
        if state.shared.is_empty() {
            state.shared = Vec::new();
        }
        if state.queue.is_empty() {
            state.queue = VecDeque::new();
        }
    }

    fn acquire(&self, mode: Mode, abort: SignalSet) -> Result<(), SignalSet> {
        let me = task::current();

        let ticket = {
            let mut state = self.state.lock();
            if state.try_acquire(mode, me.id()) {
                return Ok(());
            }

            let ticket = state.next_ticket;
            state.next_ticket += 1;
            state.queue.push_back(Waiter {
                ticket,
                task: TaskRef::clone(&me),
                mode,
            });
            ticket
        };

        log::trace!("{} blocked on semaphore ({mode:?})", me.id());

        loop {
            let fired = me.wait_signals(SignalSet::SINGLE | abort, false);

            let mut state = self.state.lock();
            let Some(pos) = state.queue.iter().position(|w| w.ticket == ticket) else {
                // Granted. Drop a handoff signal the wait did not consume.
                me.set_signals(SignalSet::empty(), SignalSet::SINGLE);
                return Ok(());
            };

            let aborted = fired & abort;
            if !aborted.is_empty() {
                state.queue.remove(pos);
                // Leaving the queue may unblock requests that queued behind us
                state.grant_waiters();
                return Err(aborted);
            }
        }
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Semaphore")
            .field("owner", &state.owner)
            .field("nest", &state.nest)
            .field("shared", &state.shared.len())
            .field("waiters", &state.queue.len())
            .finish()
    }
}

/// Error returned by [`Semaphore::release`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ReleaseError {
    /// The calling task does not hold the semaphore.
    #[error("semaphore is not held by the calling task")]
    NotHeld,
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, mpsc},
        thread,
        time::Duration,
    };

    use super::*;
    use crate::task::{TaskSpec, spawn};

    fn wait_for_waiters(sem: &Semaphore, count: usize) {
        for _ in 0..500 {
            if sem.waiter_count() == count {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("waiters never queued");
    }

    #[test]
    fn test_exclusive_recursion() {
        let sem = Semaphore::new();

        sem.obtain();
        assert!(sem.attempt());
        assert_eq!(sem.nest_count(), 2);
        assert_eq!(sem.owner(), Some(task::current_id()));

        assert_eq!(sem.release(), Ok(()));
        assert_eq!(sem.release(), Ok(()));
        assert_eq!(sem.release(), Err(ReleaseError::NotHeld));
        assert!(!sem.is_locked());
    }

    #[test]
    fn test_attempt_fails_when_held_elsewhere() {
        let sem = Arc::new(Semaphore::new());
        sem.obtain();

        let (tx, rx) = mpsc::channel();
        let other = Arc::clone(&sem);
        spawn(TaskSpec::new("attempt"), move || {
            tx.send((other.attempt(), other.attempt_shared())).unwrap();
        })
        .unwrap();

        let (exclusive, shared) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(!exclusive);
        assert!(!shared);
        sem.release().unwrap();
    }

    #[test]
    fn test_shared_holders() {
        let sem = Arc::new(Semaphore::new());
        sem.obtain_shared();

        let (tx, rx) = mpsc::channel();
        let other = Arc::clone(&sem);
        spawn(TaskSpec::new("reader"), move || {
            other.obtain_shared();
            tx.send(other.nest_count()).unwrap();
            other.release().unwrap();
        })
        .unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 2);
        assert!(sem.is_held_by_current());
        sem.release().unwrap();
    }

    #[test]
    fn test_shrink_frees_idle_buffers() {
        let sem = Semaphore::new();
        sem.obtain_shared();
        sem.release().unwrap();
        assert!(sem.state.lock().shared.capacity() > 0);

        sem.shrink_to_fit();
        let state = sem.state.lock();
        assert_eq!(state.shared.capacity(), 0);
        assert_eq!(state.queue.capacity(), 0);
    }

    #[test]
    fn test_shared_on_own_exclusive_nests() {
        let sem = Semaphore::new();
        sem.obtain();
        assert!(sem.attempt_shared());
        assert_eq!(sem.nest_count(), 2);
        sem.release().unwrap();
        sem.release().unwrap();
        assert!(!sem.is_locked());
    }

    #[test]
    fn test_handoff_in_arrival_order() {
        let sem = Arc::new(Semaphore::new());
        let (tx, rx) = mpsc::channel();
        sem.obtain();

        for n in 0..3 {
            let waiter = Arc::clone(&sem);
            let tx = tx.clone();
            spawn(TaskSpec::new(format!("waiter {n}")), move || {
                waiter.obtain();
                tx.send(n).unwrap();
                waiter.release().unwrap();
            })
            .unwrap();
            wait_for_waiters(&sem, n + 1);
        }

        sem.release().unwrap();
        let order: Vec<_> = (0..3)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_obtain_or_signal_aborts() {
        let sem = Arc::new(Semaphore::new());
        sem.obtain();

        let (tx, rx) = mpsc::channel();
        let other = Arc::clone(&sem);
        let child = spawn(TaskSpec::new("abortable"), move || {
            tx.send(other.obtain_or_signal(SignalSet::CTRL_D)).unwrap();
        })
        .unwrap();

        wait_for_waiters(&sem, 1);
        child.signal(SignalSet::CTRL_D);

        let result = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(result, Err(SignalSet::CTRL_D));
        assert_eq!(sem.waiter_count(), 0);
        sem.release().unwrap();
    }

    #[test]
    fn test_writer_waits_for_readers() {
        let sem = Arc::new(Semaphore::new());
        sem.obtain_shared();

        let (tx, rx) = mpsc::channel();
        let other = Arc::clone(&sem);
        spawn(TaskSpec::new("writer"), move || {
            other.obtain();
            tx.send(()).unwrap();
            other.release().unwrap();
        })
        .unwrap();

        wait_for_waiters(&sem, 1);
        assert!(rx.try_recv().is_err());

        sem.release().unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }
}
