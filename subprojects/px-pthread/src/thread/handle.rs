use std::fmt;

use static_assertions::const_assert_eq;

/// Opaque thread handle
///
/// A handle packs the thread table index in its low 16 bits and the slot's
/// generation in its high 16 bits. Reusing a slot bumps its generation, so a
/// stale handle never resolves to the slot's next occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ThreadHandle(u32);

const_assert_eq!(size_of::<ThreadHandle>(), 4);

impl ThreadHandle {
    /// Handle of the process's initial thread.
    pub const INITIAL: ThreadHandle = ThreadHandle(0);

    /// Sentinel returned when the calling thread cannot be registered.
    pub const INVALID: ThreadHandle = ThreadHandle(u32::MAX);

    pub(crate) fn new(index: usize, generation: u16) -> Self {
        debug_assert!(index < 0xFFFF);
        Self(((generation as u32) << 16) | index as u32)
    }

    pub(crate) fn index(self) -> usize {
        (self.0 & 0xFFFF) as usize
    }

    pub(crate) fn generation(self) -> u16 {
        (self.0 >> 16) as u16
    }

    /// Returns the raw handle value.
    pub const fn as_raw(self) -> u32 {
        self.0
    }

    /// Rebuilds a handle from its raw value.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns `false` for [`ThreadHandle::INVALID`].
    pub const fn is_valid(self) -> bool {
        self.0 != u32::MAX
    }
}

impl fmt::Display for ThreadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "#{}.{}", self.index(), self.generation())
        } else {
            f.write_str("#invalid")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack() {
        let handle = ThreadHandle::new(12, 3);
        assert_eq!(handle.index(), 12);
        assert_eq!(handle.generation(), 3);
        assert_eq!(ThreadHandle::from_raw(handle.as_raw()), handle);
    }

    #[test]
    fn test_initial_is_slot_zero() {
        assert_eq!(ThreadHandle::new(0, 0), ThreadHandle::INITIAL);
        assert!(!ThreadHandle::INVALID.is_valid());
    }
}
