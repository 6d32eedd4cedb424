//! Tab-scoped durable copy of the entry stack.

mod fs;
mod mem;

use serde::{Deserialize, Serialize};
use waypoint_types::{CondensedEntry, CondensedStack, EntryStack};

use crate::MirrorError;

pub use fs::FsMirror;
pub use mem::MemMirror;

/// Storage form of the full stack: current platform position plus
/// `[segments, state, key]` triples, the first of which sits at `offset`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorRecord {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub offset: usize,
    pub index: usize,
    pub entries: Vec<CondensedEntry>,
}

impl MirrorRecord {
    pub fn from_stack(stack: &EntryStack) -> Self {
        let condensed = stack.condense();
        Self {
            offset: condensed.offset,
            index: condensed.index,
            entries: condensed.entries,
        }
    }

    pub fn to_stack(&self) -> Result<EntryStack, MirrorError> {
        let condensed = CondensedStack {
            offset: self.offset,
            index: self.index,
            entries: self.entries.clone(),
        };
        Ok(EntryStack::from_condensed(&condensed)?)
    }
}

fn is_zero(offset: &usize) -> bool {
    *offset == 0
}

/// Durable side channel written after every commit and read once at startup.
pub trait MirrorStore: Send + Sync {
    /// Whether the scoped store can be used at all in this environment.
    fn available(&self) -> bool;
    fn read(&self) -> Result<Option<MirrorRecord>, MirrorError>;
    fn write(&self, record: &MirrorRecord) -> Result<(), MirrorError>;
}

impl<T: MirrorStore + ?Sized> MirrorStore for Box<T> {
    fn available(&self) -> bool {
        (**self).available()
    }

    fn read(&self) -> Result<Option<MirrorRecord>, MirrorError> {
        (**self).read()
    }

    fn write(&self, record: &MirrorRecord) -> Result<(), MirrorError> {
        (**self).write(record)
    }
}
