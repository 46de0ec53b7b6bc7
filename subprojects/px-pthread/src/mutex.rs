//! # Mutex
//!
//! An exclusive lock built on the host semaphore, with three ownership
//! disciplines:
//!
//! * [`MutexKind::Normal`]: no deadlock detection. Relocking from the owner
//!   blocks forever (a timed lock returns [`Error::TimedOut`]).
//! * [`MutexKind::Recursive`]: the owner may relock; every lock needs its
//!   unlock.
//! * [`MutexKind::ErrorCheck`]: relocking from the owner returns
//!   [`Error::Deadlock`].
//!
//! Unlocking a mutex the caller does not own returns [`Error::NotOwner`] under
//! every discipline.

use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};

use px_exec::{Semaphore, SignalSet, TimerRequest, signal};

use crate::{
    error::{Error, Result},
    lifecycle::ObjectState,
    time::Deadline,
};

/// Ownership discipline of a [`Mutex`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum MutexKind {
    #[default]
    Normal = 0,
    Recursive = 1,
    ErrorCheck = 2,
}

impl MutexKind {
    /// Maps a `PTHREAD_MUTEX_*` type value.
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            libc::PTHREAD_MUTEX_NORMAL => Some(MutexKind::Normal),
            libc::PTHREAD_MUTEX_RECURSIVE => Some(MutexKind::Recursive),
            libc::PTHREAD_MUTEX_ERRORCHECK => Some(MutexKind::ErrorCheck),
            _ => None,
        }
    }

    pub fn to_raw(self) -> i32 {
        match self {
            MutexKind::Normal => libc::PTHREAD_MUTEX_NORMAL,
            MutexKind::Recursive => libc::PTHREAD_MUTEX_RECURSIVE,
            MutexKind::ErrorCheck => libc::PTHREAD_MUTEX_ERRORCHECK,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => MutexKind::Recursive,
            2 => MutexKind::ErrorCheck,
            _ => MutexKind::Normal,
        }
    }
}

/// Mutex attributes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MutexAttr {
    kind: MutexKind,
}

impl MutexAttr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(&self) -> MutexKind {
        self.kind
    }

    pub fn set_kind(&mut self, kind: MutexKind) -> &mut Self {
        self.kind = kind;
        self
    }

    /// Only process-private mutexes are supported.
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

/// A mutual exclusion lock
pub struct Mutex {
    state: ObjectState,
    kind: AtomicU8,
    lock: Semaphore,
    /// Number of condition waits that released this mutex.
    cond_users: AtomicU32,
}

impl Mutex {
    /// Creates a [`MutexKind::Normal`] mutex, initialized on first use.
    pub const fn new() -> Self {
        Self::with_kind(MutexKind::Normal)
    }

    /// Creates a mutex with the given discipline, initialized on first use.
    pub const fn with_kind(kind: MutexKind) -> Self {
        Self {
            state: ObjectState::new(),
            kind: AtomicU8::new(kind as u8),
            lock: Semaphore::new(),
            cond_users: AtomicU32::new(0),
        }
    }

    /// Initializes the mutex with `attr`, or the default attributes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] if the mutex is already initialized.
    pub fn init(&self, attr: Option<&MutexAttr>) -> Result<()> {
        let kind = attr.map_or(MutexKind::Normal, MutexAttr::kind);
        if self.lock.is_locked() {
            return Err(Error::Busy);
        }
        self.state.init()?;
        self.kind.store(kind as u8, Ordering::Release);
        Ok(())
    }

    pub fn kind(&self) -> MutexKind {
        MutexKind::from_u8(self.kind.load(Ordering::Acquire))
    }

    /// Locks the mutex, blocking until it is available.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Deadlock`] when an [`MutexKind::ErrorCheck`] mutex is
    /// relocked by its owner, and [`Error::InvalidArgument`] for a destroyed
    /// mutex.
    pub fn lock(&self) -> Result<()> {
        self.state.ensure_ready()?;

        if self.lock.is_held_by_current() {
            match self.kind() {
                MutexKind::ErrorCheck => return Err(Error::Deadlock),
                MutexKind::Normal => self_deadlock(),
                MutexKind::Recursive => {}
            }
        }

        self.lock.obtain();
        Ok(())
    }

    /// Locks the mutex if it is available.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] if another thread holds the mutex, or the
    /// caller holds a non-recursive mutex.
    pub fn try_lock(&self) -> Result<()> {
        self.state.ensure_ready()?;

        if self.lock.is_held_by_current() && self.kind() != MutexKind::Recursive {
            return Err(Error::Busy);
        }

        if self.lock.attempt() {
            Ok(())
        } else {
            Err(Error::Busy)
        }
    }

    /// Locks the mutex, giving up at `deadline`.
    ///
    /// # Errors
    ///
    /// - [`Error::TimedOut`] if the deadline passes first, including when a
    ///   [`MutexKind::Normal`] mutex is relocked by its owner.
    /// - [`Error::Deadlock`] when an [`MutexKind::ErrorCheck`] mutex is
    ///   relocked by its owner.
    /// - [`Error::Again`] if no timer request can be opened.
    pub fn timed_lock(&self, deadline: impl Into<Deadline>) -> Result<()> {
        let deadline = deadline.into();

        match self.try_lock() {
            Err(Error::Busy) => {}
            other => return other,
        }

        let self_held = self.lock.is_held_by_current();
        if self_held && self.kind() == MutexKind::ErrorCheck {
            return Err(Error::Deadlock);
        }

        let remaining = deadline.remaining();
        if remaining.is_zero() {
            return Err(Error::TimedOut);
        }

        let mut timer = TimerRequest::open().map_err(|_| Error::Again)?;
        timer.arm(remaining).map_err(|_| Error::Again)?;

        if self_held {
            while !timer.check() {
                signal::wait(timer.mask());
            }
            return Err(Error::TimedOut);
        }

        // Dropping the timer aborts and drains it
        self.lock
            .obtain_or_signal(timer.mask())
            .map_err(|_| Error::TimedOut)
    }

    /// Releases one level of the caller's hold.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotOwner`] if the caller does not hold the mutex.
    pub fn unlock(&self) -> Result<()> {
        self.lock.release().map_err(|_| Error::NotOwner)
    }

    /// Returns `true` if the mutex is held by the calling thread.
    pub fn is_locked_by_current(&self) -> bool {
        self.lock.is_held_by_current()
    }

    /// Destroys the mutex.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] if the mutex is locked or released by an
    /// ongoing condition wait, and [`Error::InvalidArgument`] if it is already
    /// destroyed.
    pub fn destroy(&self) -> Result<()> {
        self.state.destroy(|| {
            self.lock.is_locked() || self.cond_users.load(Ordering::Acquire) > 0
        })?;
        self.lock.shrink_to_fit();
        Ok(())
    }

    /// Releases one level for a condition wait.
    pub(crate) fn release_for_wait(&self) {
        self.cond_users.fetch_add(1, Ordering::AcqRel);
        // The caller checked ownership
        let _ = self.lock.release();
    }

    /// Relocks after a condition wait.
    pub(crate) fn reacquire_after_wait(&self) {
        self.lock.obtain();
        self.cond_users.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

/// Blocks the calling thread forever.
///
/// Exceptions are still delivered, so an asynchronous cancellation can end
/// the wait.
fn self_deadlock() -> ! {
    log::warn!("normal mutex relocked by its owner, blocking forever");
    loop {
        signal::wait(SignalSet::empty());
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_kind_from_raw() {
        for kind in [MutexKind::Normal, MutexKind::Recursive, MutexKind::ErrorCheck] {
            assert_eq!(MutexKind::from_raw(kind.to_raw()), Some(kind));
        }
        assert_eq!(MutexKind::from_raw(42), None);
    }

    #[test]
    fn test_errorcheck_relock() {
        let mutex = Mutex::with_kind(MutexKind::ErrorCheck);
        mutex.lock().unwrap();
        assert_eq!(mutex.lock(), Err(Error::Deadlock));
        assert_eq!(mutex.try_lock(), Err(Error::Busy));
        mutex.unlock().unwrap();
        assert_eq!(mutex.unlock(), Err(Error::NotOwner));
    }

    #[test]
    fn test_recursive_nests() {
        let mutex = Mutex::with_kind(MutexKind::Recursive);
        mutex.lock().unwrap();
        mutex.lock().unwrap();
        mutex.try_lock().unwrap();
        assert_eq!(mutex.destroy(), Err(Error::Busy));

        for _ in 0..3 {
            mutex.unlock().unwrap();
        }
        assert!(!mutex.is_locked_by_current());
        assert_eq!(mutex.destroy(), Ok(()));
    }

    #[test]
    fn test_normal_timed_relock_times_out() {
        let mutex = Mutex::new();
        mutex.lock().unwrap();

        let result = mutex.timed_lock(Duration::from_millis(20));
        assert_eq!(result, Err(Error::TimedOut));
        mutex.unlock().unwrap();
    }

    #[test]
    fn test_destroyed_mutex_is_invalid() {
        let mutex = Mutex::new();
        mutex.destroy().unwrap();
        assert_eq!(mutex.lock(), Err(Error::InvalidArgument));
        assert_eq!(mutex.destroy(), Err(Error::InvalidArgument));

        mutex.init(None).unwrap();
        assert_eq!(mutex.init(None), Err(Error::Busy));
        mutex.lock().unwrap();
        mutex.unlock().unwrap();
    }
}
