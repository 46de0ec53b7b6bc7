//! # Barrier
//!
//! A reusable rendezvous point for a fixed number of threads, built from one
//! [`Mutex`] and one [`Condvar`].
//!
//! Every cycle has two phases. While filling, arriving threads count
//! themselves in and wait. The last arrival switches the barrier to draining
//! and wakes everyone. While draining, threads count themselves out; the last
//! one to leave resets the barrier and wakes threads that already arrived for
//! the next cycle. That last thread is the one that gets
//! [`BarrierWaitResult::Serial`].

use std::sync::atomic::{AtomicU32, Ordering};

use crate::{
    condvar::Condvar,
    error::{Error, Result},
    lifecycle::ObjectState,
    mutex::Mutex,
};

/// Set in the state while the barrier drains.
const DRAINING: u32 = 1 << 31;

/// Outcome of [`Barrier::wait`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierWaitResult {
    /// Returned to exactly one thread per cycle.
    Serial,
    /// Returned to every other thread.
    Waiter,
}

impl BarrierWaitResult {
    pub fn is_serial(self) -> bool {
        self == BarrierWaitResult::Serial
    }
}

/// A thread barrier
pub struct Barrier {
    state: ObjectState,
    parties: u32,
    /// Arrival count, with [`DRAINING`] set during the second phase.
    count: AtomicU32,
    mutex: Mutex,
    cond: Condvar,
}

impl Barrier {
    /// Creates a barrier for `parties` threads.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `parties` is zero or does not fit
    /// the arrival counter.
    pub fn new(parties: u32) -> Result<Self> {
        if parties == 0 || parties >= DRAINING {
            return Err(Error::InvalidArgument);
        }

        Ok(Self {
            state: ObjectState::ready(),
            parties,
            count: AtomicU32::new(0),
            mutex: Mutex::new(),
            cond: Condvar::new(),
        })
    }

    pub fn parties(&self) -> u32 {
        self.parties
    }

    /// Waits until all parties have arrived.
    ///
    /// Not a cancellation point.
    pub fn wait(&self) -> Result<BarrierWaitResult> {
        self.state.ensure_ready()?;
        self.mutex.lock()?;
        let result = self.rendezvous();
        self.mutex.unlock()?;
        result
    }

    /// Runs one party through the cycle. Called with the mutex held.
    fn rendezvous(&self) -> Result<BarrierWaitResult> {
        // Threads of the next cycle wait for the previous one to drain
        while self.count.load(Ordering::Relaxed) & DRAINING != 0 {
            self.cond.wait_uncancelable(&self.mutex)?;
        }

        let arrived = self.count.load(Ordering::Relaxed) + 1;
        if arrived == self.parties {
            self.count.store(DRAINING | arrived, Ordering::Relaxed);
            self.cond.broadcast()?;
        } else {
            self.count.store(arrived, Ordering::Relaxed);
            while self.count.load(Ordering::Relaxed) & DRAINING == 0 {
                self.cond.wait_uncancelable(&self.mutex)?;
            }
        }

        let left = (self.count.load(Ordering::Relaxed) & !DRAINING) - 1;
        if left == 0 {
            self.count.store(0, Ordering::Relaxed);
            self.cond.broadcast()?;
            Ok(BarrierWaitResult::Serial)
        } else {
            self.count.store(DRAINING | left, Ordering::Relaxed);
            Ok(BarrierWaitResult::Waiter)
        }
    }

    /// Destroys the barrier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] while a party is inside [`Barrier::wait`], and
    /// [`Error::InvalidArgument`] if the barrier is already destroyed.
    pub fn destroy(&self) -> Result<()> {
        self.state.ensure_ready()?;

        // A party that entered but has not counted itself yet holds the lock
        self.mutex.try_lock()?;
        let destroyed = self
            .state
            .destroy(|| {
                self.count.load(Ordering::Relaxed) != 0 || self.cond.waiter_count() != 0
            })
            .and_then(|()| self.cond.destroy());
        self.mutex.unlock()?;
        destroyed?;

        self.mutex.destroy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_parties() {
        assert!(matches!(Barrier::new(0), Err(Error::InvalidArgument)));
    }

    #[test]
    fn test_single_party_is_serial() {
        let barrier = Barrier::new(1).unwrap();
        assert_eq!(barrier.wait(), Ok(BarrierWaitResult::Serial));
        assert_eq!(barrier.wait(), Ok(BarrierWaitResult::Serial));
        assert_eq!(barrier.destroy(), Ok(()));
        assert_eq!(barrier.destroy(), Err(Error::InvalidArgument));
    }

    #[test]
    fn test_destroy_while_party_entering_is_busy() {
        let barrier = Barrier::new(2).unwrap();

        // Stand-in for a party that took the lock but has not counted itself
        barrier.mutex.lock().unwrap();
        let destroyed =
            std::thread::scope(|scope| scope.spawn(|| barrier.destroy()).join().unwrap());
        assert_eq!(destroyed, Err(Error::Busy));
        barrier.mutex.unlock().unwrap();

        assert_eq!(barrier.destroy(), Ok(()));
        assert_eq!(barrier.wait(), Err(Error::InvalidArgument));
    }

    #[test]
    fn test_failed_wait_releases_lock() {
        let barrier = Barrier::new(2).unwrap();
        barrier.cond.destroy().unwrap();

        assert_eq!(barrier.wait(), Err(Error::InvalidArgument));
        assert!(!barrier.mutex.is_locked_by_current());
        assert_eq!(barrier.mutex.try_lock(), Ok(()));
        barrier.mutex.unlock().unwrap();
    }
}
