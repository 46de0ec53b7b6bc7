//! # Read-write lock
//!
//! A thin layer over the host semaphore's shared and exclusive modes. The lock
//! keeps no reader count of its own: [`RwLock::unlock`] releases one level of
//! whatever the caller holds, as tracked by the semaphore's nesting counter.
//! A thread that holds the lock in both modes (a read lock taken on top of its
//! own write lock) cannot choose which level it releases.
//!
//! Timed acquisition polls the non-blocking variant, yielding between
//! attempts.

use std::time::Instant;

use px_exec::{Semaphore, sched};

use crate::{
    error::{Error, Result},
    lifecycle::ObjectState,
    time::Deadline,
};

/// Read-write lock attributes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RwLockAttr {
    _private: (),
}

impl RwLockAttr {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only process-private locks are supported.
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

/// A reader-writer lock
pub struct RwLock {
    state: ObjectState,
    lock: Semaphore,
}

impl RwLock {
    /// Creates a lock, initialized on first use.
    pub const fn new() -> Self {
        Self {
            state: ObjectState::new(),
            lock: Semaphore::new(),
        }
    }

    /// # Errors
    ///
    /// Returns [`Error::Busy`] if the lock is already initialized.
    pub fn init(&self, _attr: Option<&RwLockAttr>) -> Result<()> {
        self.state.init()
    }

    /// Locks for reading, blocking while a writer holds or waits for the
    /// lock.
    ///
    /// A thread that holds the write lock gets an additional read level.
    pub fn read_lock(&self) -> Result<()> {
        self.state.ensure_ready()?;
        self.lock.obtain_shared();
        Ok(())
    }

    /// Locks for writing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Deadlock`] if the caller already holds the lock in
    /// any mode.
    pub fn write_lock(&self) -> Result<()> {
        self.state.ensure_ready()?;
        if self.lock.is_held_by_current() {
            return Err(Error::Deadlock);
        }
        self.lock.obtain();
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`Error::Busy`] if the lock cannot be taken right away.
    pub fn try_read_lock(&self) -> Result<()> {
        self.state.ensure_ready()?;
        if self.lock.attempt_shared() {
            Ok(())
        } else {
            Err(Error::Busy)
        }
    }

    /// # Errors
    ///
    /// Returns [`Error::Busy`] if the lock is held in any mode, the caller
    /// included.
    pub fn try_write_lock(&self) -> Result<()> {
        self.state.ensure_ready()?;
        if self.lock.is_held_by_current() || !self.lock.attempt() {
            return Err(Error::Busy);
        }
        Ok(())
    }

    /// Locks for reading, giving up at `deadline`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TimedOut`] if the deadline passes first.
    pub fn timed_read_lock(&self, deadline: impl Into<Deadline>) -> Result<()> {
        self.state.ensure_ready()?;
        let until = deadline.into().to_instant();
        poll_until(until, || self.lock.attempt_shared())
    }

    /// Locks for writing, giving up at `deadline`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TimedOut`] if the deadline passes first, and
    /// [`Error::Deadlock`] if the caller already holds the lock.
    pub fn timed_write_lock(&self, deadline: impl Into<Deadline>) -> Result<()> {
        self.state.ensure_ready()?;
        if self.lock.is_held_by_current() {
            return Err(Error::Deadlock);
        }
        let until = deadline.into().to_instant();
        poll_until(until, || self.lock.attempt())
    }

    /// Releases one level of the caller's hold, read or write.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotOwner`] if the caller holds the lock in neither
    /// mode.
    pub fn unlock(&self) -> Result<()> {
        self.lock.release().map_err(|_| Error::NotOwner)
    }

    /// Destroys the lock.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] while the lock is held, and
    /// [`Error::InvalidArgument`] if it is already destroyed.
    pub fn destroy(&self) -> Result<()> {
        self.state.destroy(|| self.lock.nest_count() > 0)?;
        self.lock.shrink_to_fit();
        Ok(())
    }
}

impl Default for RwLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Retries `attempt` with a yield in between until it succeeds or `until`
/// passes. `None` never expires.
fn poll_until(until: Option<Instant>, mut attempt: impl FnMut() -> bool) -> Result<()> {
    loop {
        if attempt() {
            return Ok(());
        }
        if until.is_some_and(|until| Instant::now() >= until) {
            return Err(Error::TimedOut);
        }
        sched::yield_now();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_write_relock_deadlocks() {
        let lock = RwLock::new();
        lock.write_lock().unwrap();
        assert_eq!(lock.write_lock(), Err(Error::Deadlock));
        assert_eq!(lock.try_write_lock(), Err(Error::Busy));
        assert_eq!(
            lock.timed_write_lock(Duration::from_millis(5)),
            Err(Error::Deadlock)
        );
        lock.unlock().unwrap();
        assert_eq!(lock.unlock(), Err(Error::NotOwner));
    }

    #[test]
    fn test_read_on_own_write_nests() {
        let lock = RwLock::new();
        lock.write_lock().unwrap();
        lock.read_lock().unwrap();
        assert_eq!(lock.destroy(), Err(Error::Busy));

        lock.unlock().unwrap();
        lock.unlock().unwrap();
        assert_eq!(lock.destroy(), Ok(()));
    }

    #[test]
    fn test_readers_share() {
        let lock = RwLock::new();
        lock.read_lock().unwrap();
        lock.try_read_lock().unwrap();
        assert_eq!(lock.try_write_lock(), Err(Error::Busy));
        lock.unlock().unwrap();
        lock.unlock().unwrap();
        lock.try_write_lock().unwrap();
        lock.unlock().unwrap();
    }
}
