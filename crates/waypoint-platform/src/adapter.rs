use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use waypoint_types::{Entry, EntryKey, EntryStack, EntryState, PathCodec, Segments};

use crate::{AdapterError, EntryBlob, HistoryPrimitive, PopSignal};

const ECHO_CAPACITY: usize = 32;

#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub poll_interval: Duration,
    pub poll_attempts: u32,
    pub blob_budget: usize,
    pub embed_stack: bool,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            poll_attempts: 20,
            blob_budget: 16 * 1024,
            embed_stack: true,
        }
    }
}

/// Whether the environment offers a usable history primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterMode {
    Full,
    /// No primitive: the stack lives in memory and only the current URL exists.
    Degraded,
}

/// Platform-side effect of a committed stack change.
///
/// Every variant is applied against the stack as it looks *after* the commit.
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformOp {
    Push,
    Replace,
    Move(i64),
    /// Re-derive the owned part of platform history after a reset. The
    /// platform is walked back from `from_index` (showing `from_key`) to the
    /// entry keyed `from_first`, which is then overwritten.
    Rewrite {
        from_index: usize,
        from_key: EntryKey,
        from_first: EntryKey,
    },
}

impl PlatformOp {
    pub fn name(&self) -> &'static str {
        match self {
            PlatformOp::Push => "push",
            PlatformOp::Replace => "replace",
            PlatformOp::Move(_) => "move",
            PlatformOp::Rewrite { .. } => "rewrite",
        }
    }
}

/// Outcome of comparing a landed entry with the mirrored stack.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    /// The landed entry sits where its blob says it does.
    Aligned { index: usize },
    /// The stack disagreed with the landed entry and was rebuilt from it.
    Diverged { stack: EntryStack },
    /// The landed entry was not written by us.
    Foreign { entry: Entry },
}

/// Keeps the opaque platform history in step with the entry stack.
pub struct PlatformHistoryAdapter {
    primitive: Box<dyn HistoryPrimitive>,
    codec: Arc<dyn PathCodec>,
    config: AdapterConfig,
    mode: AdapterMode,
    echoes: VecDeque<EntryKey>,
}

impl std::fmt::Debug for PlatformHistoryAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformHistoryAdapter")
            .field("mode", &self.mode)
            .field("config", &self.config)
            .field("echoes", &self.echoes.len())
            .finish()
    }
}

impl PlatformHistoryAdapter {
    pub fn new(
        primitive: impl HistoryPrimitive + 'static,
        codec: Arc<dyn PathCodec>,
        config: AdapterConfig,
    ) -> Self {
        let mode = if primitive.supports_history() {
            AdapterMode::Full
        } else {
            log::warn!("history primitive unavailable; running in single-url mode");
            AdapterMode::Degraded
        };
        Self {
            primitive: Box::new(primitive),
            codec,
            config,
            mode,
            echoes: VecDeque::new(),
        }
    }

    pub fn mode(&self) -> AdapterMode {
        self.mode
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    pub fn codec(&self) -> &dyn PathCodec {
        self.codec.as_ref()
    }

    pub fn current_url(&self) -> String {
        self.primitive.current_url()
    }

    /// Decoded blob of the entry the platform currently shows, if it is one of ours.
    pub fn landed(&self) -> Option<EntryBlob> {
        self.primitive
            .current_blob()
            .and_then(|bytes| EntryBlob::decode(&bytes).ok())
    }

    /// Blob of the entry a pop signal landed on, when the entry is ours.
    pub fn landed_on(signal: &PopSignal) -> Option<EntryBlob> {
        decode_signal(signal)
    }

    /// Segments for a platform URL; an undecodable URL is kept as a bare path.
    pub fn segments_for(&self, url: &str) -> Segments {
        self.codec.decode(url).unwrap_or_else(|err| {
            log::warn!("keeping undecodable url '{url}' verbatim: {err}");
            Segments::path(url)
        })
    }

    /// Fresh entry for a location the platform shows but we never wrote.
    pub fn entry_from_url(&self, url: &str) -> Entry {
        Entry::new(self.segments_for(url), EntryState::default())
    }

    /// Performs the minimal primitive calls for `op` and attaches fresh blobs.
    ///
    /// Returns whether the platform was seen to reflect the new current entry.
    /// An unconfirmed operation is not an error.
    pub async fn apply(&mut self, op: &PlatformOp, stack: &EntryStack) -> Result<bool, AdapterError> {
        if self.mode == AdapterMode::Degraded {
            return Ok(true);
        }
        let index = stack.current_index();
        let key = stack.current().key.clone();
        match op {
            PlatformOp::Push => self.write(stack, index, Write::Push)?,
            PlatformOp::Replace => self.write(stack, index, Write::Replace)?,
            PlatformOp::Move(0) => {}
            PlatformOp::Move(delta) => {
                self.move_by(*delta, key.clone())?;
                if !self.confirm(&key).await {
                    return Ok(false);
                }
                // the move landed; a stale blob on the entry only costs a
                // divergence check on a later pop
                if self.config.embed_stack {
                    if let Err(err) = self.write(stack, index, Write::Replace) {
                        log::warn!("could not restamp entry {key} after moving: {err}");
                    }
                }
                return Ok(true);
            }
            PlatformOp::Rewrite {
                from_index,
                from_key,
                from_first,
            } => {
                let walked = *from_index as i64;
                if walked > 0 {
                    self.move_by(-walked, from_first.clone())?;
                    if !self.confirm(from_first).await {
                        log::warn!("platform did not reach the first owned entry; rewrite skipped");
                        return Ok(false);
                    }
                }
                if let Err(err) = self.write(stack, 0, Write::Replace) {
                    if let Err(undo) = self.compensate(walked, from_key.clone()) {
                        log::warn!("could not walk the platform back to {from_key}: {undo}");
                    }
                    return Err(err);
                }
                for i in 1..stack.len() {
                    self.write(stack, i, Write::Push)
                        .map_err(|err| AdapterError::partial(i, err))?;
                }
                let back = index as i64 - (stack.len() as i64 - 1);
                if back != 0 {
                    self.move_by(back, key.clone())
                        .map_err(|err| AdapterError::partial(stack.len(), err))?;
                }
            }
        }
        Ok(self.confirm(&key).await)
    }

    /// Polls the primitive until it shows `expected`, bounded by the configured attempts.
    pub async fn confirm(&mut self, expected: &EntryKey) -> bool {
        if self.mode == AdapterMode::Degraded {
            return true;
        }
        let attempts = self.config.poll_attempts;
        for attempt in 0..=attempts {
            if self.landed().is_some_and(|blob| &blob.key == expected) {
                return true;
            }
            if attempt < attempts {
                tokio::time::sleep(self.config.poll_interval).await;
            }
        }
        log::warn!(
            "platform did not show entry {expected} after {attempts} polls of {:?}",
            self.config.poll_interval
        );
        false
    }

    /// Moves the platform without touching the stack; the resulting signal is
    /// swallowed as an echo once it lands on `expected`.
    pub fn compensate(&mut self, delta: i64, expected: EntryKey) -> Result<(), AdapterError> {
        if self.mode == AdapterMode::Degraded || delta == 0 {
            return Ok(());
        }
        log::debug!("compensating platform by {delta} toward {expected}");
        self.expect_echo(expected);
        self.primitive.move_by_delta(delta)?;
        Ok(())
    }

    /// Whether `signal` is the platform reporting one of our own moves.
    pub fn take_echo(&mut self, signal: &PopSignal) -> bool {
        let Some(blob) = decode_signal(signal) else {
            return false;
        };
        match self.echoes.iter().position(|key| key == &blob.key) {
            Some(pos) => {
                self.echoes.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn pending_echoes(&self) -> usize {
        self.echoes.len()
    }

    /// Compares the entry being landed on with the stack. The landed entry
    /// is trusted; blobs of other entries are never consulted.
    pub fn reconcile(&self, signal: &PopSignal, stack: &EntryStack) -> Reconciliation {
        let Some(blob) = decode_signal(signal) else {
            return Reconciliation::Foreign {
                entry: self.entry_from_url(&signal.url),
            };
        };
        if stack.platform_position(&blob.key) == Some(blob.index) {
            return Reconciliation::Aligned {
                index: blob.index - stack.offset(),
            };
        }
        log::warn!(
            "landed on {} at {} but the stack disagrees; rebuilding from the landed entry",
            blob.key,
            blob.index
        );
        if blob.embeds_self() {
            if let Some(rebuilt) = blob
                .stack
                .as_ref()
                .and_then(|condensed| EntryStack::from_condensed(condensed).ok())
            {
                return Reconciliation::Diverged { stack: rebuilt };
            }
        }
        let landed = blob.landed_entry(self.segments_for(&signal.url));
        let rebuilt = match blob
            .index
            .checked_sub(stack.offset())
            .filter(|local| *local <= stack.len())
        {
            Some(local) => {
                let mut rebuilt = stack.clone();
                rebuilt.truncate_onto(local, landed);
                rebuilt
            }
            // nothing we hold is contiguous with the landed entry
            None => EntryStack::new(landed).with_offset(blob.index),
        };
        Reconciliation::Diverged { stack: rebuilt }
    }

    /// Moves the platform, expecting to land on `expected`. The echo is
    /// withdrawn if the primitive refuses the move.
    fn move_by(&mut self, delta: i64, expected: EntryKey) -> Result<(), AdapterError> {
        self.expect_echo(expected);
        if let Err(err) = self.primitive.move_by_delta(delta) {
            self.echoes.pop_back();
            return Err(err.into());
        }
        Ok(())
    }

    fn write(&mut self, stack: &EntryStack, index: usize, write: Write) -> Result<(), AdapterError> {
        let (url, blob) = self.write_args(stack, index)?;
        match write {
            Write::Push => self.primitive.push_entry(&url, blob)?,
            Write::Replace => self.primitive.replace_entry(&url, blob)?,
        }
        Ok(())
    }

    fn expect_echo(&mut self, key: EntryKey) {
        if self.echoes.len() == ECHO_CAPACITY {
            self.echoes.pop_front();
        }
        self.echoes.push_back(key);
    }

    fn write_args(&self, stack: &EntryStack, index: usize) -> Result<(String, Vec<u8>), AdapterError> {
        let entry = &stack.entries()[index];
        let url = self.codec.encode(&entry.segments);
        let blob = EntryBlob::for_entry(stack, index, self.config.embed_stack)
            .map(|blob| blob.encode(self.config.blob_budget))
            .transpose()?
            .unwrap_or_default();
        Ok((url, blob))
    }
}

#[derive(Clone, Copy)]
enum Write {
    Push,
    Replace,
}

fn decode_signal(signal: &PopSignal) -> Option<EntryBlob> {
    signal
        .blob
        .as_deref()
        .and_then(|bytes| EntryBlob::decode(bytes).ok())
}
