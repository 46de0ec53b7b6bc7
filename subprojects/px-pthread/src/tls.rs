//! Thread-specific data
//!
//! Keys are process-wide slots in a fixed-capacity table kept by the runtime.
//! Each thread stores its values in its own control block, tagged with the
//! generation of the key they were set under. Deleting a key bumps the slot's
//! generation, so values set under the old key become inert once the slot is
//! reused. A slot whose generation would wrap is retired instead.

use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use parking_lot::Mutex;

use crate::{
    cancel::ThreadExit,
    error::{Error, Result},
    runtime,
    thread::{info::ThreadInfo, registry},
    value::Value,
};

/// Destructor run at thread exit for each non-null value of a key.
pub type Destructor = Arc<dyn Fn(Value) + Send + Sync>;

/// Thread-specific data key
///
/// Packs the key table index in the low 16 bits and the slot generation in
/// the high 16 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Key(u32);

impl Key {
    fn new(index: usize, generation: u16) -> Self {
        Self(((generation as u32) << 16) | index as u32)
    }

    fn index(self) -> usize {
        (self.0 & 0xFFFF) as usize
    }

    fn generation(self) -> u16 {
        (self.0 >> 16) as u16
    }

    pub const fn as_raw(self) -> u32 {
        self.0
    }

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }
}

struct KeySlot {
    in_use: bool,
    /// Generation space exhausted; the slot is never handed out again.
    retired: bool,
    generation: u16,
    destructor: Option<Destructor>,
}

pub(crate) struct KeyTable {
    slots: Vec<KeySlot>,
}

impl KeyTable {
    pub(crate) fn new(capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|_| KeySlot {
                in_use: false,
                retired: false,
                generation: 0,
                destructor: None,
            })
            .collect();
        Self { slots }
    }

    fn create(&mut self, destructor: Option<Destructor>) -> Option<Key> {
        let (index, slot) = self
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| !slot.in_use && !slot.retired)?;

        slot.in_use = true;
        slot.destructor = destructor;
        Some(Key::new(index, slot.generation))
    }

    fn delete(&mut self, key: Key) -> bool {
        let Some(slot) = self.slots.get_mut(key.index()) else {
            return false;
        };
        if !slot.in_use || slot.generation != key.generation() {
            return false;
        }

        slot.in_use = false;
        slot.destructor = None;
        match slot.generation.checked_add(1) {
            Some(generation) => slot.generation = generation,
            None => {
                log::warn!("retiring key slot {} after {} reuses", key.index(), u16::MAX);
                slot.retired = true;
            }
        }
        true
    }

    fn is_live(&self, key: Key) -> bool {
        self.slots
            .get(key.index())
            .is_some_and(|slot| slot.in_use && slot.generation == key.generation())
    }

    fn destructor(&self, key: Key) -> Option<&Destructor> {
        if !self.is_live(key) {
            return None;
        }
        self.slots[key.index()].destructor.as_ref()
    }
}

/// Values of one thread, indexed by key slot
pub(crate) struct TlsValues(Mutex<Vec<Option<(u16, Value)>>>);

impl TlsValues {
    pub(crate) fn new() -> Self {
        Self(Mutex::new(Vec::new()))
    }

    fn set(&self, key: Key, value: Value) {
        let mut values = self.0.lock();
        let index = key.index();
        if values.len() <= index {
            values.resize(index + 1, None);
        }
        values[index] = Some((key.generation(), value));
    }

    fn get(&self, key: Key) -> Value {
        match self.0.lock().get(key.index()) {
            Some(Some((generation, value))) if *generation == key.generation() => *value,
            _ => Value::NULL,
        }
    }

    /// Clears all values, returning the non-null ones with their keys.
    fn take_all(&self) -> Vec<(Key, Value)> {
        self.0
            .lock()
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| {
                let (generation, value) = slot.take()?;
                (!value.is_null()).then(|| (Key::new(index, generation), value))
            })
            .collect()
    }
}

/// Creates a key without a destructor.
///
/// # Errors
///
/// Returns [`Error::Again`] if the key table is full.
pub fn key_create() -> Result<Key> {
    create(None)
}

/// Creates a key whose non-null values are passed to `destructor` when a
/// thread exits.
///
/// # Errors
///
/// Returns [`Error::Again`] if the key table is full.
pub fn key_create_with<F>(destructor: F) -> Result<Key>
where
    F: Fn(Value) + Send + Sync + 'static,
{
    create(Some(Arc::new(destructor)))
}

fn create(destructor: Option<Destructor>) -> Result<Key> {
    let key = runtime::get()
        .keys
        .write()
        .create(destructor)
        .ok_or(Error::Again)?;

    log::trace!("created key {:#x}", key.0);
    Ok(key)
}

/// Deletes a key.
///
/// No destructor runs; values still held by threads become inert.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] if the key is not live.
pub fn key_delete(key: Key) -> Result<()> {
    if !runtime::get().keys.write().delete(key) {
        return Err(Error::InvalidArgument);
    }
    Ok(())
}

/// Associates `value` with `key` on the calling thread.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] if the key is not live, and
/// [`Error::Again`] if the calling thread cannot be registered.
pub fn set_specific(key: Key, value: Value) -> Result<()> {
    if !runtime::get().keys.read().is_live(key) {
        return Err(Error::InvalidArgument);
    }

    let me = registry::current().ok_or(Error::Again)?;
    me.tls.set(key, value);
    Ok(())
}

/// Returns the calling thread's value for `key`, null if none is set or the
/// key is not live.
pub fn get_specific(key: Key) -> Value {
    if !runtime::get().keys.read().is_live(key) {
        return Value::NULL;
    }

    registry::cached().map_or(Value::NULL, |me| me.tls.get(key))
}

/// Runs the destructors of the exiting thread's values in at most
/// `iterations` passes.
///
/// Each pass clears every value before calling its destructor. Destructors
/// that set new values cause another pass. A destructor that panics or exits
/// the thread does not stop the others.
pub(crate) fn run_destructors(info: &ThreadInfo, iterations: usize) {
    for _ in 0..iterations {
        let calls: Vec<_> = {
            let keys = runtime::get().keys.read();
            info.tls
                .take_all()
                .into_iter()
                .filter_map(|(key, value)| Some((Arc::clone(keys.destructor(key)?), value)))
                .collect()
        };

        if calls.is_empty() {
            return;
        }

        for (destructor, value) in calls {
            let call = AssertUnwindSafe(|| destructor(value));
            match panic::catch_unwind(call) {
                Ok(()) => {}
                Err(payload) if payload.is::<ThreadExit>() => {
                    log::debug!("thread {} exited from a destructor", info.handle);
                }
                Err(_) => {
                    log::error!(
                        "thread-specific data destructor of thread {} panicked",
                        info.handle
                    );
                }
            }
        }
    }

    let leftover = info.tls.take_all().len();
    if leftover > 0 {
        log::warn!(
            "thread {} exited with {leftover} thread-specific values after {iterations} destructor passes",
            info.handle
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_until_full() {
        let mut table = KeyTable::new(2);
        assert!(table.create(None).is_some());
        assert!(table.create(None).is_some());
        assert!(table.create(None).is_none());
    }

    #[test]
    fn test_reused_slot_gets_new_key() {
        let mut table = KeyTable::new(1);

        let old = table.create(None).unwrap();
        assert!(table.delete(old));
        assert!(!table.delete(old));

        let new = table.create(None).unwrap();
        assert_eq!(old.index(), new.index());
        assert_ne!(old, new);
        assert!(!table.is_live(old));
        assert!(table.is_live(new));
    }

    #[test]
    fn test_slot_retires_instead_of_wrapping() {
        let mut table = KeyTable::new(1);
        table.slots[0].generation = u16::MAX - 1;

        let key = table.create(None).unwrap();
        assert!(table.delete(key));
        let last = table.create(None).unwrap();
        assert_eq!(last.generation(), u16::MAX);
        assert!(table.delete(last));

        assert!(table.create(None).is_none());
        assert!(!table.is_live(Key::new(0, 0)));
        assert!(!table.is_live(last));
    }

    #[test]
    fn test_values_of_old_key_are_inert() {
        let values = TlsValues::new();
        let old = Key::new(3, 0);
        let new = Key::new(3, 1);

        values.set(old, Value::new(7));
        assert_eq!(values.get(old), Value::new(7));
        assert_eq!(values.get(new), Value::NULL);
    }

    #[test]
    fn test_take_all_skips_null() {
        let values = TlsValues::new();
        values.set(Key::new(0, 0), Value::NULL);
        values.set(Key::new(1, 0), Value::new(5));

        let taken = values.take_all();
        assert_eq!(taken, vec![(Key::new(1, 0), Value::new(5))]);
        assert!(values.take_all().is_empty());
    }
}
