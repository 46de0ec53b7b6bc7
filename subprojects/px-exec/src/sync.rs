//! # Semaphore lock
//!
//! A reader-writer lock that owns its data, built on [`Semaphore`].
//!
//! Unlike the bare semaphore, a `SemLock` is not re-entrant: acquiring it again
//! from a task that already holds it in any mode would hand out aliasing
//! references, so it panics instead.

use std::{
    cell::UnsafeCell,
    fmt,
    marker::PhantomData,
    ops::{Deref, DerefMut},
};

use crate::semaphore::Semaphore;

/// A reader-writer lock protecting a value of type `T`
pub struct SemLock<T: ?Sized> {
    inner: Semaphore,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Send for SemLock<T> {}
unsafe impl<T: ?Sized + Send + Sync> Sync for SemLock<T> {}

impl<T> SemLock<T> {
    /// Creates a new unlocked `SemLock`.
    pub const fn new(value: T) -> Self {
        Self {
            inner: Semaphore::new(),
            data: UnsafeCell::new(value),
        }
    }

    /// Consumes the lock, returning the underlying data.
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> SemLock<T> {
    /// Locks with shared read access, blocking the current task until it can
    /// be acquired.
    ///
    /// # Panics
    ///
    /// Panics if the calling task already holds the lock.
    pub fn read(&self) -> SemReadGuard<'_, T> {
        self.assert_not_held();
        self.inner.obtain_shared();
        SemReadGuard {
            lock: self,
            _marker: PhantomData,
        }
    }

    /// Locks with exclusive write access, blocking the current task until it
    /// can be acquired.
    ///
    /// # Panics
    ///
    /// Panics if the calling task already holds the lock.
    pub fn write(&self) -> SemWriteGuard<'_, T> {
        self.assert_not_held();
        self.inner.obtain();
        SemWriteGuard {
            lock: self,
            _marker: PhantomData,
        }
    }

    /// Frees the lock's internal buffers while no task holds or waits on it.
    pub fn shrink_to_fit(&self) {
        self.inner.shrink_to_fit();
    }

    /// Attempts to acquire exclusive write access without blocking.
    pub fn try_write(&self) -> Option<SemWriteGuard<'_, T>> {
        if self.inner.is_held_by_current() || !self.inner.attempt() {
            return None;
        }
        Some(SemWriteGuard {
            lock: self,
            _marker: PhantomData,
        })
    }

    /// Returns a mutable reference to the underlying data.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    fn assert_not_held(&self) {
        assert!(
            !self.inner.is_held_by_current(),
            "SemLock acquired recursively"
        );
    }

    fn unlock(&self) {
        // The guard proves the hold
        let _ = self.inner.release();
    }
}

impl<T: Default> Default for SemLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for SemLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SemLock")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

/// RAII guard for shared access to a [`SemLock`]
#[must_use = "if unused the SemLock will immediately unlock"]
#[clippy::has_significant_drop]
pub struct SemReadGuard<'a, T: ?Sized + 'a> {
    lock: &'a SemLock<T>,
    _marker: PhantomData<*const ()>,
}

unsafe impl<T: ?Sized + Sync> Sync for SemReadGuard<'_, T> {}

impl<T: ?Sized> Deref for SemReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for SemReadGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

/// RAII guard for exclusive access to a [`SemLock`]
#[must_use = "if unused the SemLock will immediately unlock"]
#[clippy::has_significant_drop]
pub struct SemWriteGuard<'a, T: ?Sized + 'a> {
    lock: &'a SemLock<T>,
    _marker: PhantomData<*const ()>,
}

unsafe impl<T: ?Sized + Sync> Sync for SemWriteGuard<'_, T> {}

impl<T: ?Sized> Deref for SemWriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for SemWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for SemWriteGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}
