//! # Spinlock
//!
//! A busy-waiting lock on one atomically exchanged flag. [`Spinlock::lock`]
//! yields between attempts but offers no protection against priority
//! inversion: a high-priority thread spinning on a lock held by a preempted
//! lower-priority thread only makes progress when the host schedules the
//! holder. Keep critical sections short.

use std::sync::atomic::{AtomicBool, Ordering};

use px_exec::sched;

use crate::{
    error::{Error, Result},
    lifecycle::ObjectState,
};

/// A spinlock
pub struct Spinlock {
    state: ObjectState,
    locked: AtomicBool,
}

impl Spinlock {
    /// Creates an unlocked spinlock, initialized on first use.
    pub const fn new() -> Self {
        Self {
            state: ObjectState::new(),
            locked: AtomicBool::new(false),
        }
    }

    /// # Errors
    ///
    /// Returns [`Error::Busy`] if the spinlock is already initialized.
    pub fn init(&self) -> Result<()> {
        self.state.init()?;
        self.locked.store(false, Ordering::Release);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`Error::Busy`] if the lock is taken.
    pub fn try_lock(&self) -> Result<()> {
        self.state.ensure_ready()?;
        if self.locked.swap(true, Ordering::Acquire) {
            return Err(Error::Busy);
        }
        Ok(())
    }

    pub fn lock(&self) -> Result<()> {
        loop {
            match self.try_lock() {
                Err(Error::Busy) => sched::yield_now(),
                other => return other,
            }
        }
    }

    /// Releases the lock.
    ///
    /// The lock has no owner: any thread may release it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotOwner`] if the lock is not taken.
    pub fn unlock(&self) -> Result<()> {
        if !self.locked.swap(false, Ordering::Release) {
            return Err(Error::NotOwner);
        }
        Ok(())
    }

    /// Destroys the spinlock.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] if the lock is taken, and
    /// [`Error::InvalidArgument`] if it is already destroyed.
    pub fn destroy(&self) -> Result<()> {
        self.state.destroy(|| self.locked.load(Ordering::Acquire))
    }
}

impl Default for Spinlock {
    fn default() -> Self {
        Self::new()
    }
}
