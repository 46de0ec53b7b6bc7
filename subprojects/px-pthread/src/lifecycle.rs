use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::{Error, Result};

const UNINIT: u8 = 0;
const READY: u8 = 1;
const DESTROYED: u8 = 2;

/// Init/destroy state of a synchronization object
///
/// Statically declared objects start uninitialized and become ready on first
/// use with their default attributes.
pub(crate) struct ObjectState(AtomicU8);

impl ObjectState {
    pub(crate) const fn new() -> Self {
        Self(AtomicU8::new(UNINIT))
    }

    pub(crate) const fn ready() -> Self {
        Self(AtomicU8::new(READY))
    }

    /// Marks a lazily declared object ready.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for a destroyed object.
    pub(crate) fn ensure_ready(&self) -> Result<()> {
        match self
            .0
            .compare_exchange(UNINIT, READY, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) | Err(READY) => Ok(()),
            Err(_) => Err(Error::InvalidArgument),
        }
    }

    /// Marks the object ready after an explicit init.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] if the object is already initialized.
    pub(crate) fn init(&self) -> Result<()> {
        if self.0.load(Ordering::Acquire) == READY {
            return Err(Error::Busy);
        }
        self.0.store(READY, Ordering::Release);
        Ok(())
    }

    /// Marks the object destroyed unless `busy` reports it in use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the object is already destroyed
    /// and [`Error::Busy`] if it is in use.
    pub(crate) fn destroy(&self, busy: impl FnOnce() -> bool) -> Result<()> {
        if self.0.load(Ordering::Acquire) == DESTROYED {
            return Err(Error::InvalidArgument);
        }
        if busy() {
            return Err(Error::Busy);
        }
        self.0.store(DESTROYED, Ordering::Release);
        Ok(())
    }
}
