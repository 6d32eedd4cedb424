//! Navigation data model: entries, the ordered entry stack, and the path codec seam.

mod codec;
mod entry;
mod error;
mod stack;

pub use codec::{PathCodec, UrlPathCodec};
pub use entry::{Entry, EntryKey, EntryState, Segments};
pub use error::StackError;
pub use stack::{
    CondensedEntry, CondensedStack, Direction, EntryStack, JumpTarget, SetPatch, StackChange,
};
