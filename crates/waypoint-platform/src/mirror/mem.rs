use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{MirrorRecord, MirrorStore};
use crate::MirrorError;

#[derive(Debug, Default)]
struct Slot {
    record: Option<MirrorRecord>,
    unavailable: bool,
    writes: usize,
}

/// In-memory mirror. Clones share the same slot, so a clone handed to a
/// second coordinator plays the role of the same tab after a restart.
#[derive(Debug, Clone, Default)]
pub struct MemMirror {
    slot: Arc<Mutex<Slot>>,
}

impl MemMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that reports itself unusable (isolated or private contexts).
    pub fn unavailable() -> Self {
        let mirror = Self::default();
        mirror.set_available(false);
        mirror
    }

    pub fn set_available(&self, available: bool) {
        self.lock().unavailable = !available;
    }

    pub fn record(&self) -> Option<MirrorRecord> {
        self.lock().record.clone()
    }

    pub fn writes(&self) -> usize {
        self.lock().writes
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MirrorStore for MemMirror {
    fn available(&self) -> bool {
        !self.lock().unavailable
    }

    fn read(&self) -> Result<Option<MirrorRecord>, MirrorError> {
        let slot = self.lock();
        if slot.unavailable {
            return Err(MirrorError::Unavailable);
        }
        Ok(slot.record.clone())
    }

    fn write(&self, record: &MirrorRecord) -> Result<(), MirrorError> {
        let mut slot = self.lock();
        if slot.unavailable {
            return Err(MirrorError::Unavailable);
        }
        slot.record = Some(record.clone());
        slot.writes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypoint_types::{Entry, EntryStack};

    #[test]
    fn clones_share_the_record() {
        let mirror = MemMirror::new();
        let stack = EntryStack::from_entries(
            vec![Entry::at_path("/a"), Entry::at_path("/b")],
            Some(0),
            Default::default(),
        )
        .unwrap();
        mirror.write(&MirrorRecord::from_stack(&stack)).unwrap();

        let restarted = mirror.clone();
        let restored = restarted.read().unwrap().unwrap().to_stack().unwrap();
        assert_eq!(restored.entries(), stack.entries());
        assert_eq!(restored.current_index(), 0);
        assert_eq!(mirror.writes(), 1);
    }

    #[test]
    fn unavailable_store_refuses_io() {
        let mirror = MemMirror::unavailable();
        assert!(!mirror.available());
        assert!(matches!(mirror.read(), Err(MirrorError::Unavailable)));
        mirror.set_available(true);
        assert!(mirror.read().unwrap().is_none());
    }
}
