//! Seams to the environment: the opaque platform history primitive, the
//! adapter that keeps it aligned with the entry stack, the tab-scoped mirror
//! store, and the memo cache consumed by the cache stage.

pub mod adapter;
pub mod blob;
pub mod cache;
mod error;
pub mod memory;
pub mod mirror;
mod primitive;

pub use adapter::{AdapterConfig, AdapterMode, PlatformHistoryAdapter, PlatformOp, Reconciliation};
pub use blob::EntryBlob;
pub use cache::{CacheKey, MemCache, MemoCache};
pub use error::{AdapterError, MirrorError, PlatformError};
pub use memory::{HistoryCall, MemoryHistory};
pub use mirror::{FsMirror, MemMirror, MirrorRecord, MirrorStore};
pub use primitive::{HistoryPrimitive, PopSignal};
