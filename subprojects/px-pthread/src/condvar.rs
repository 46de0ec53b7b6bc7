//! # Condition variable
//!
//! Waiters queue up in arrival order, each with a wake-up bit of its own.
//! [`Condvar::signal`] marks the oldest unsignaled waiter and raises its bit;
//! [`Condvar::broadcast`] does so for every waiter. A waiter removes its own
//! record once it holds the mutex again.
//!
//! A timed wait also waits on the bit of a timer request armed for the
//! remaining time. It reports [`Error::TimedOut`] only if the timer fired and
//! the waiter was not signaled. When a thread runs out of signal bits it waits
//! on a shared fallback bit, and may then wake spuriously. Callers re-check
//! their predicate after every wait.

use std::{
    collections::VecDeque,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use px_exec::{SemLock, SignalSet, TaskRef, TimerRequest, signal, task};

use crate::{
    cancel,
    error::{Error, Result},
    lifecycle::ObjectState,
    mutex::Mutex,
    thread::registry,
    time::Deadline,
    wake::WakeBit,
};

struct Waiter {
    id: u64,
    task: TaskRef,
    mask: SignalSet,
    signaled: bool,
}

/// Condition variable attributes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CondAttr {
    _private: (),
}

impl CondAttr {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only process-private condition variables are supported.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `shared` is set.
    pub fn set_process_shared(&mut self, shared: bool) -> Result<&mut Self> {
        if shared {
            return Err(Error::InvalidArgument);
        }
        Ok(self)
    }
}

/// A condition variable
pub struct Condvar {
    state: ObjectState,
    waiters: SemLock<VecDeque<Waiter>>,
    next_id: AtomicU64,
}

impl Condvar {
    /// Creates a condition variable, initialized on first use.
    pub const fn new() -> Self {
        Self {
            state: ObjectState::new(),
            waiters: SemLock::new(VecDeque::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// # Errors
    ///
    /// Returns [`Error::Busy`] if the condition variable is already
    /// initialized.
    pub fn init(&self, _attr: Option<&CondAttr>) -> Result<()> {
        self.state.init()
    }

    /// Releases `mutex` and waits until signaled, then relocks it.
    ///
    /// This is a cancellation point. A canceled waiter holds the mutex again
    /// when its cleanup handlers run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotOwner`] if the caller does not hold `mutex`.
    pub fn wait(&self, mutex: &Mutex) -> Result<()> {
        self.wait_inner(mutex, None, true)
    }

    /// Like [`Condvar::wait`], giving up at `deadline`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TimedOut`] if the deadline passes before the waiter is
    /// signaled; the mutex is locked again either way. Returns
    /// [`Error::Again`] if no timer request can be opened.
    pub fn timed_wait(&self, mutex: &Mutex, deadline: impl Into<Deadline>) -> Result<()> {
        self.wait_inner(mutex, Some(deadline.into()), true)
    }

    /// Like [`Condvar::timed_wait`] with a deadline relative to now.
    pub fn timed_wait_relative(&self, mutex: &Mutex, timeout: Duration) -> Result<()> {
        self.wait_inner(mutex, Some(Deadline::Relative(timeout)), true)
    }

    /// Waits without acting on cancellation requests.
    pub(crate) fn wait_uncancelable(&self, mutex: &Mutex) -> Result<()> {
        self.wait_inner(mutex, None, false)
    }

    fn wait_inner(&self, mutex: &Mutex, deadline: Option<Deadline>, cancelable: bool) -> Result<()> {
        self.state.ensure_ready()?;
        if !mutex.is_locked_by_current() {
            return Err(Error::NotOwner);
        }

        let me = registry::current();
        let _hold = task::hold_exceptions();
        if cancelable {
            cancel::test_cancel();
        }

        let mut timer = match deadline {
            Some(deadline) => {
                let mut timer = TimerRequest::open().map_err(|_| Error::Again)?;
                timer.arm(deadline.remaining()).map_err(|_| Error::Again)?;
                Some(timer)
            }
            None => None,
        };
        let timer_mask = timer.as_ref().map_or(SignalSet::empty(), TimerRequest::mask);

        let wake = WakeBit::take();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.waiters.write().push_back(Waiter {
            id,
            task: task::current(),
            mask: wake.mask(),
            signaled: false,
        });

        mutex.release_for_wait();

        let mut woken = false;
        let mut expired = false;
        let mut canceled = false;
        loop {
            let fired = signal::wait(wake.mask() | timer_mask | SignalSet::CTRL_C);
            if fired.intersects(wake.mask()) {
                woken = true;
                break;
            }
            if fired.intersects(timer_mask) {
                expired = true;
                break;
            }
            if cancelable && me.as_ref().is_some_and(|me| me.cancel.should_act()) {
                canceled = true;
                break;
            }
        }

        mutex.reacquire_after_wait();

        let signaled = {
            let mut waiters = self.waiters.write();
            waiters
                .iter()
                .position(|waiter| waiter.id == id)
                .and_then(|pos| waiters.remove(pos))
                .is_some_and(|waiter| waiter.signaled)
        };

        if let Some(timer) = timer.as_mut() {
            timer.abort();
            timer.wait();
        }
        drop(wake);

        if canceled {
            // Pass on a wake-up this waiter will not consume
            if signaled {
                self.wake_oldest();
            }
            if let Some(me) = me.as_deref() {
                cancel::act(me);
            }
        }

        if expired && !woken && !signaled {
            log::trace!("condition wait timed out");
            return Err(Error::TimedOut);
        }
        Ok(())
    }

    /// Wakes the oldest waiter.
    pub fn signal(&self) -> Result<()> {
        self.state.ensure_ready()?;
        self.wake_oldest();
        Ok(())
    }

    /// Wakes every waiter.
    pub fn broadcast(&self) -> Result<()> {
        self.state.ensure_ready()?;
        for waiter in self.waiters.write().iter_mut().filter(|w| !w.signaled) {
            waiter.signaled = true;
            waiter.task.signal(waiter.mask);
        }
        Ok(())
    }

    fn wake_oldest(&self) {
        let mut waiters = self.waiters.write();
        if let Some(waiter) = waiters.iter_mut().find(|w| !w.signaled) {
            waiter.signaled = true;
            waiter.task.signal(waiter.mask);
        }
    }

    /// Returns the number of threads blocked in a wait.
    pub fn waiter_count(&self) -> usize {
        self.waiters.read().len()
    }

    /// Destroys the condition variable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] while threads wait on it, and
    /// [`Error::InvalidArgument`] if it is already destroyed.
    pub fn destroy(&self) -> Result<()> {
        self.state.destroy(|| !self.waiters.read().is_empty())?;
        *self.waiters.write() = VecDeque::new();
        self.waiters.shrink_to_fit();
        Ok(())
    }
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}
