//! In-process stand-in for a browser-style session history.
//!
//! `MemoryHistory` behaves like the real primitive in the ways that matter
//! to the adapter: it holds entries the application did not write (foreign
//! destinations), it reports only the current entry, it emits a pop signal
//! for every traversal (including ones the application asked for), and it can
//! deliver moves late to mimic runtimes whose bookkeeping is asynchronous.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use crate::{HistoryPrimitive, PlatformError, PopSignal};

/// A call made against the primitive, recorded for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryCall {
    Push(String),
    Replace(String),
    Move(i64),
}

#[derive(Debug, Clone)]
struct Slot {
    url: String,
    blob: Option<Vec<u8>>,
    foreign: bool,
}

#[derive(Debug)]
struct Inner {
    slots: Vec<Slot>,
    index: usize,
    supports_history: bool,
    move_lag: u32,
    pending_moves: VecDeque<i64>,
    reads_until_apply: u32,
    listeners: Vec<mpsc::UnboundedSender<PopSignal>>,
    calls: Vec<HistoryCall>,
}

impl Inner {
    fn current(&self) -> &Slot {
        &self.slots[self.index]
    }

    fn traverse(&mut self, delta: i64) -> bool {
        let target = self.index as i64 + delta;
        if delta == 0 || target < 0 || target >= self.slots.len() as i64 {
            return false;
        }
        self.index = target as usize;
        let signal = PopSignal {
            url: self.current().url.clone(),
            blob: self.current().blob.clone(),
        };
        self.listeners.retain(|tx| tx.send(signal.clone()).is_ok());
        true
    }

    fn settle(&mut self) {
        if self.pending_moves.is_empty() {
            return;
        }
        if self.reads_until_apply > 0 {
            self.reads_until_apply -= 1;
            return;
        }
        while let Some(delta) = self.pending_moves.pop_front() {
            self.traverse(delta);
        }
    }
}

fn owned_slot(url: &str, blob: Vec<u8>) -> Slot {
    Slot {
        url: url.to_owned(),
        blob: Some(blob),
        foreign: false,
    }
}

/// Shared handle to a simulated history; clones observe the same history.
#[derive(Debug, Clone)]
pub struct MemoryHistory {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryHistory {
    /// History holding a single entry at `url` with no blob attached.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                slots: vec![Slot {
                    url: url.into(),
                    blob: None,
                    foreign: false,
                }],
                index: 0,
                supports_history: true,
                move_lag: 0,
                pending_moves: VecDeque::new(),
                reads_until_apply: 0,
                listeners: Vec::new(),
                calls: Vec::new(),
            })),
        }
    }

    /// Environment without a usable history mechanism.
    pub fn without_history_support(url: impl Into<String>) -> Self {
        let history = Self::new(url);
        history.lock().supports_history = false;
        history
    }

    /// Delay programmatic moves until the current entry has been read `reads` times.
    pub fn with_move_lag(self, reads: u32) -> Self {
        self.lock().move_lag = reads;
        self
    }

    /// Receiver for pop signals emitted on every traversal.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<PopSignal> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().listeners.push(tx);
        rx
    }

    /// User presses back. Returns false at the start of history.
    pub fn back(&self) -> bool {
        self.go(-1)
    }

    /// User presses forward. Returns false at the end of history.
    pub fn forward(&self) -> bool {
        self.go(1)
    }

    /// User-initiated traversal; applied immediately and signalled.
    pub fn go(&self, delta: i64) -> bool {
        self.lock().traverse(delta)
    }

    /// The user follows a link to a destination outside the application.
    pub fn visit_foreign(&self, url: impl Into<String>) {
        let mut inner = self.lock();
        let keep = inner.index + 1;
        inner.slots.truncate(keep);
        inner.slots.push(Slot {
            url: url.into(),
            blob: None,
            foreign: true,
        });
        inner.index += 1;
    }

    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn index(&self) -> usize {
        self.lock().index
    }

    pub fn urls(&self) -> Vec<String> {
        self.lock().slots.iter().map(|s| s.url.clone()).collect()
    }

    pub fn is_foreign(&self, index: usize) -> bool {
        self.lock().slots.get(index).is_some_and(|s| s.foreign)
    }

    pub fn blob_at(&self, index: usize) -> Option<Vec<u8>> {
        self.lock().slots.get(index).and_then(|s| s.blob.clone())
    }

    pub fn calls(&self) -> Vec<HistoryCall> {
        self.lock().calls.clone()
    }

    /// Applies any lagged moves right away.
    pub fn flush(&self) {
        let mut inner = self.lock();
        inner.reads_until_apply = 0;
        inner.settle();
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl HistoryPrimitive for MemoryHistory {
    fn supports_history(&self) -> bool {
        self.lock().supports_history
    }

    fn push_entry(&mut self, url: &str, blob: Vec<u8>) -> Result<(), PlatformError> {
        let mut inner = self.lock();
        if !inner.supports_history {
            return Err(PlatformError::Unsupported);
        }
        inner.calls.push(HistoryCall::Push(url.to_owned()));
        let slot = owned_slot(url, blob);
        let keep = inner.index + 1;
        inner.slots.truncate(keep);
        inner.slots.push(slot);
        inner.index += 1;
        Ok(())
    }

    fn replace_entry(&mut self, url: &str, blob: Vec<u8>) -> Result<(), PlatformError> {
        let mut inner = self.lock();
        if !inner.supports_history {
            return Err(PlatformError::Unsupported);
        }
        inner.calls.push(HistoryCall::Replace(url.to_owned()));
        let slot = owned_slot(url, blob);
        let index = inner.index;
        inner.slots[index] = slot;
        Ok(())
    }

    fn move_by_delta(&mut self, delta: i64) -> Result<(), PlatformError> {
        let mut inner = self.lock();
        if !inner.supports_history {
            return Err(PlatformError::Unsupported);
        }
        inner.calls.push(HistoryCall::Move(delta));
        if inner.move_lag == 0 {
            inner.traverse(delta);
        } else {
            inner.pending_moves.push_back(delta);
            inner.reads_until_apply = inner.move_lag;
        }
        Ok(())
    }

    fn current_blob(&self) -> Option<Vec<u8>> {
        let mut inner = self.lock();
        inner.settle();
        inner.current().blob.clone()
    }

    fn current_url(&self) -> String {
        let mut inner = self.lock();
        inner.settle();
        inner.current().url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_truncates_forward_slots() {
        let mut history = MemoryHistory::new("/a");
        history.push_entry("/b", vec![1]).unwrap();
        history.push_entry("/c", vec![2]).unwrap();
        assert!(history.back());
        assert!(history.back());
        history.push_entry("/d", vec![3]).unwrap();
        assert_eq!(history.urls(), ["/a", "/d"]);
        assert_eq!(history.index(), 1);
    }

    #[test]
    fn every_traversal_is_signalled() {
        let mut history = MemoryHistory::new("/a");
        let mut rx = history.subscribe();
        history.push_entry("/b", vec![7]).unwrap();
        assert!(history.back());
        history.move_by_delta(1).unwrap();
        let first = rx.try_recv().unwrap();
        assert_eq!(first.url, "/a");
        assert_eq!(first.blob, None);
        let second = rx.try_recv().unwrap();
        assert_eq!(second.url, "/b");
        assert_eq!(second.blob, Some(vec![7]));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn lagged_moves_land_after_reads() {
        let mut history = MemoryHistory::new("/a").with_move_lag(2);
        history.push_entry("/b", vec![1]).unwrap();
        history.move_by_delta(-1).unwrap();
        assert_eq!(history.index(), 1);
        assert_eq!(history.current_url(), "/b");
        assert_eq!(history.current_url(), "/b");
        assert_eq!(history.current_url(), "/a");
    }

    #[test]
    fn out_of_range_moves_are_ignored() {
        let mut history = MemoryHistory::new("/a");
        history.move_by_delta(-3).unwrap();
        assert_eq!(history.index(), 0);
        assert!(!history.forward());
    }

    #[test]
    fn foreign_visits_are_marked() {
        let history = MemoryHistory::new("/a");
        history.visit_foreign("https://elsewhere.example/");
        assert_eq!(history.len(), 2);
        assert!(history.is_foreign(1));
        assert!(history.back());
        assert_eq!(history.index(), 0);
    }

    #[test]
    fn unsupported_history_rejects_writes() {
        let mut history = MemoryHistory::without_history_support("/a");
        assert!(!history.supports_history());
        assert!(matches!(
            history.push_entry("/b", Vec::new()),
            Err(PlatformError::Unsupported)
        ));
    }
}
