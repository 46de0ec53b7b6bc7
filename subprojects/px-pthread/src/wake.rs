use px_exec::{SignalBit, SignalSet, signal};

/// A wake-up bit owned by the current task for the duration of one wait
///
/// Falls back to the shared [`SignalSet::CTRL_E`] bit when the task has no
/// free signal bit left. Waits on the fallback bit may wake spuriously.
pub(crate) struct WakeBit {
    bit: Option<SignalBit>,
}

impl WakeBit {
    pub(crate) fn take() -> Self {
        let bit = signal::alloc();
        if bit.is_none() {
            log::warn!("signal bits exhausted, waiting on the shared fallback bit");
            signal::set(SignalSet::empty(), SignalSet::CTRL_E);
        }
        Self { bit }
    }

    pub(crate) fn mask(&self) -> SignalSet {
        self.bit.map_or(SignalSet::CTRL_E, SignalBit::mask)
    }
}

impl Drop for WakeBit {
    fn drop(&mut self) {
        if let Some(bit) = self.bit {
            signal::free(bit);
        }
    }
}
