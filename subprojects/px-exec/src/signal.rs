//! Per-task signal bits.
//!
//! A task waits on a mask of signal bits and is woken as soon as any of them is
//! raised. Bits are sticky: a bit raised while the task is not waiting stays set
//! until a wait consumes it or it is cleared with [`set`].

use bitflags::bitflags;
use static_assertions::const_assert;

use crate::task;

bitflags! {
    /// A set of task signal bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[repr(transparent)]
    pub struct SignalSet: u32 {
        /// Semaphore ownership handoff
        const SINGLE = 1 << 4;
        /// Break signal, used to deliver cancellation requests
        const CTRL_C = 1 << 12;
        /// Break signal D
        const CTRL_D = 1 << 13;
        /// Break signal E, the shared fallback wake-up bit
        const CTRL_E = 1 << 14;
        /// Break signal F
        const CTRL_F = 1 << 15;

        const _ = !0;
    }
}

/// First signal number handed out by [`alloc`].
pub const FIRST_USER_SIGNAL: u8 = 16;

/// Number of allocatable signal bits per task.
pub const USER_SIGNAL_COUNT: u8 = 32 - FIRST_USER_SIGNAL;

/// Mask covering all allocatable bits.
pub(crate) const USER_SIGNAL_MASK: u32 = !0u32 << FIRST_USER_SIGNAL;

const_assert!(SignalSet::CTRL_F.bits() < (1 << FIRST_USER_SIGNAL));

/// An allocated signal bit of the current task
///
/// A `SignalBit` is only meaningful for the task that allocated it. It must be
/// returned with [`free`] by that same task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignalBit(u8);

impl SignalBit {
    pub(crate) fn from_number(number: u8) -> Self {
        debug_assert!((FIRST_USER_SIGNAL..32).contains(&number));
        Self(number)
    }

    /// Returns the signal number (`16..=31`).
    pub fn number(self) -> u8 {
        self.0
    }

    /// Returns the single-bit set for this signal.
    pub fn mask(self) -> SignalSet {
        SignalSet::from_bits_retain(1 << self.0)
    }
}

/// Allocates a free signal bit for the current task.
///
/// The returned bit starts cleared. Returns `None` when all user bits are in
/// use.
pub fn alloc() -> Option<SignalBit> {
    task::current().alloc_signal()
}

/// Returns a signal bit to the current task's pool.
///
/// Any pending occurrence of the bit is discarded.
pub fn free(bit: SignalBit) {
    task::current().free_signal(bit)
}

/// Waits until at least one bit of `mask` is raised on the current task.
///
/// Returns the raised subset of `mask` and clears it. This is an exception
/// delivery point.
pub fn wait(mask: SignalSet) -> SignalSet {
    task::current().wait_signals(mask, true)
}

/// Sets the bits of `mask` in the current task's received set to the values in
/// `new`, returning the previous received set.
///
/// `set(SignalSet::empty(), mask)` clears the bits of `mask`.
pub fn set(new: SignalSet, mask: SignalSet) -> SignalSet {
    task::current().set_signals(new, mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_distinct_user_bits() {
        let a = alloc().expect("first bit");
        let b = alloc().expect("second bit");

        assert_ne!(a, b);
        assert!(a.number() >= FIRST_USER_SIGNAL);
        assert!(b.number() >= FIRST_USER_SIGNAL);

        free(a);
        free(b);
    }

    #[test]
    fn test_alloc_exhaustion() {
        let bits: Vec<_> = (0..USER_SIGNAL_COUNT).map_while(|_| alloc()).collect();
        assert_eq!(bits.len(), USER_SIGNAL_COUNT as usize);
        assert!(alloc().is_none());

        for bit in bits {
            free(bit);
        }

        let again = alloc().expect("bit after free");
        free(again);
    }

    #[test]
    fn test_set_returns_previous() {
        set(SignalSet::CTRL_F, SignalSet::CTRL_F);

        let old = set(SignalSet::empty(), SignalSet::CTRL_F);
        let now = set(SignalSet::empty(), SignalSet::empty());

        assert!(old.contains(SignalSet::CTRL_F));
        assert!(!now.contains(SignalSet::CTRL_F));
    }

    #[test]
    fn test_wait_consumes_raised_subset() {
        let both = SignalSet::CTRL_D | SignalSet::CTRL_F;
        set(both, both);

        let got = wait(SignalSet::CTRL_D);
        assert_eq!(got, SignalSet::CTRL_D);

        let left = set(SignalSet::empty(), SignalSet::CTRL_F);
        assert!(left.contains(SignalSet::CTRL_F));
        assert!(!left.contains(SignalSet::CTRL_D));
    }
}
