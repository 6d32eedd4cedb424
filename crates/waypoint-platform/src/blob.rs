use serde::{Deserialize, Serialize};
use waypoint_cbor::{from_cbor, to_canonical_cbor};
use waypoint_types::{CondensedStack, Entry, EntryKey, EntryStack, EntryState, Segments};

/// Payload written into the platform's per-entry opaque slot.
///
/// Identifies the entry it is attached to and, when enabled, carries a
/// condensed copy of the whole stack as seen from that entry. When the tab
/// mirror is unavailable this copy is the only way to recover the stack
/// after the user returns from a foreign destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryBlob {
    pub key: EntryKey,
    pub index: usize,
    #[serde(default)]
    pub state: EntryState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<CondensedStack>,
}

impl EntryBlob {
    /// Blob for the entry at stack index `index`. The embedded stack is
    /// centred on that entry; recorded positions are platform positions.
    pub fn for_entry(stack: &EntryStack, index: usize, embed_stack: bool) -> Option<Self> {
        let entry = stack.get(index)?;
        let position = stack.offset() + index;
        let condensed = embed_stack.then(|| {
            let mut condensed = stack.condense();
            condensed.index = position;
            condensed
        });
        Some(Self {
            key: entry.key.clone(),
            index: position,
            state: entry.state.clone(),
            stack: condensed,
        })
    }

    /// Canonical CBOR that fits in `budget` bytes where possible.
    ///
    /// Condensed entries farthest from this entry are dropped first; if even
    /// a single-entry stack is too large the stack is left out. The bare
    /// blob is returned regardless of size.
    pub fn encode(&self, budget: usize) -> Result<Vec<u8>, serde_cbor::Error> {
        let mut blob = self.clone();
        loop {
            let bytes = to_canonical_cbor(&blob)?;
            if bytes.len() <= budget {
                return Ok(bytes);
            }
            match blob.stack.as_mut().map(CondensedStack::trim_farthest) {
                Some(true) => {}
                Some(false) => {
                    log::debug!("dropping embedded stack from blob for {}", blob.key);
                    blob.stack = None;
                }
                None => return Ok(bytes),
            }
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, serde_cbor::Error> {
        from_cbor(bytes)
    }

    /// Whether the embedded stack still contains this blob's own entry.
    pub fn embeds_self(&self) -> bool {
        self.stack
            .as_ref()
            .is_some_and(|stack| stack.entries.iter().any(|e| e.2 == self.key))
    }

    /// Rebuilds the landed entry; the blob does not carry segments, so the
    /// caller supplies them from the platform URL.
    pub fn landed_entry(&self, segments: Segments) -> Entry {
        let mut entry = Entry::with_key(self.key.clone(), segments, self.state.clone());
        entry.index = self.index;
        entry
    }
}
