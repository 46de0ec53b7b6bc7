//! # Once
//!
//! One-time initialization. The state moves from `INCOMPLETE` to `RUNNING` to
//! `COMPLETE`; only the thread that moves it to `RUNNING` runs the routine,
//! and the others sleep on a condition variable until it completes.
//!
//! If the routine unwinds (it panicked, or its thread exited or was canceled)
//! the state goes back to `INCOMPLETE` and one of the waiting threads takes
//! over.

use std::sync::atomic::{AtomicU8, Ordering};

use crate::{condvar::Condvar, error::Result, mutex::Mutex};

const INCOMPLETE: u8 = 0;
const RUNNING: u8 = 1;
const COMPLETE: u8 = 2;

/// A one-time initialization control
pub struct Once {
    state: AtomicU8,
    mutex: Mutex,
    cond: Condvar,
}

impl Once {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(INCOMPLETE),
            mutex: Mutex::new(),
            cond: Condvar::new(),
        }
    }

    /// Returns `true` once the routine has run to completion.
    pub fn is_completed(&self) -> bool {
        self.state.load(Ordering::Acquire) == COMPLETE
    }

    /// Runs `init` unless it, or another routine, already completed on this
    /// control. Returns once the routine has completed.
    pub fn call_once<F>(&self, init: F) -> Result<()>
    where
        F: FnOnce(),
    {
        if self.is_completed() {
            return Ok(());
        }

        self.mutex.lock()?;
        loop {
            match self.state.load(Ordering::Relaxed) {
                COMPLETE => return self.mutex.unlock(),
                RUNNING => self.cond.wait_uncancelable(&self.mutex)?,
                _ => break,
            }
        }
        self.state.store(RUNNING, Ordering::Relaxed);
        self.mutex.unlock()?;

        let mut guard = Finish {
            once: self,
            completed: false,
        };
        init();
        guard.completed = true;

        Ok(())
    }
}

impl Default for Once {
    fn default() -> Self {
        Self::new()
    }
}

/// Publishes the routine's outcome, also when it unwinds.
struct Finish<'a> {
    once: &'a Once,
    completed: bool,
}

impl Drop for Finish<'_> {
    fn drop(&mut self) {
        let state = if self.completed { COMPLETE } else { INCOMPLETE };

        let _ = self.once.mutex.lock();
        self.once.state.store(state, Ordering::Release);
        let _ = self.once.cond.broadcast();
        let _ = self.once.mutex.unlock();
    }
}
