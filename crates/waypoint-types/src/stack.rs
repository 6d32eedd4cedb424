use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{Entry, EntryKey, EntryState, PathCodec, Segments, StackError};

/// Direction of the last committed movement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i8")]
pub enum Direction {
    Back,
    #[default]
    Stay,
    Forward,
}

impl Direction {
    pub fn from_delta(delta: i64) -> Self {
        match delta.signum() {
            -1 => Direction::Back,
            1 => Direction::Forward,
            _ => Direction::Stay,
        }
    }

    pub fn sign(self) -> i64 {
        match self {
            Direction::Back => -1,
            Direction::Stay => 0,
            Direction::Forward => 1,
        }
    }
}

impl From<Direction> for i8 {
    fn from(value: Direction) -> Self {
        value.sign() as i8
    }
}

impl TryFrom<i8> for Direction {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Direction::Back),
            0 => Ok(Direction::Stay),
            1 => Ok(Direction::Forward),
            other => Err(format!("direction must be -1, 0 or 1, got {other}")),
        }
    }
}

/// Destination of a jump: a signed offset from the current entry or an entry key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JumpTarget {
    Delta(i64),
    Key(EntryKey),
}

/// What `push` actually did to the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackChange {
    Pushed,
    /// The pushed location matched a neighbour, so the stack moved instead of growing.
    Jumped { delta: i64 },
}

/// Non-navigational patch applied by `set`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetPatch {
    pub state: Option<EntryState>,
    pub segments: Option<Segments>,
}

impl SetPatch {
    pub fn state(state: impl Into<EntryState>) -> Self {
        Self {
            state: Some(state.into()),
            segments: None,
        }
    }

    pub fn segments(segments: Segments) -> Self {
        Self {
            state: None,
            segments: Some(segments),
        }
    }
}

/// Storage form of one entry: `[segments, state, key]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CondensedEntry(pub Segments, pub EntryState, pub EntryKey);

/// Storage form of a (possibly trimmed) stack.
///
/// `entries[0]` sat at stack index `offset` when the record was taken, and
/// `index` is the absolute index of the current entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CondensedStack {
    #[serde(default)]
    pub offset: usize,
    pub index: usize,
    pub entries: Vec<CondensedEntry>,
}

impl CondensedStack {
    /// Drops the entry farthest from the current one. Returns false once only
    /// the current entry is left.
    pub fn trim_farthest(&mut self) -> bool {
        if self.entries.len() <= 1 {
            return false;
        }
        let local = self.index.saturating_sub(self.offset);
        let head_distance = local;
        let tail_distance = self.entries.len() - 1 - local;
        if head_distance >= tail_distance && head_distance > 0 {
            self.entries.remove(0);
            self.offset += 1;
        } else {
            self.entries.pop();
        }
        true
    }
}

/// Ordered, indexed sequence of entries plus the current position.
///
/// Invariants held after every operation:
/// - the stack is never empty and `current_index < len`;
/// - `entries[i].index == i`;
/// - no two entries share a key.
///
/// `offset` is the platform position of `entries[0]`. It is non-zero only
/// for stacks rebuilt from a trimmed copy, whose head stays behind on the
/// platform.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryStack {
    entries: Vec<Entry>,
    current: usize,
    direction: Direction,
    offset: usize,
}

impl EntryStack {
    pub fn new(first: Entry) -> Self {
        let mut stack = Self {
            entries: vec![first],
            current: 0,
            direction: Direction::Stay,
            offset: 0,
        };
        stack.reindex();
        stack
    }

    /// Builds a stack from a full entry list; `index` defaults to the last entry.
    pub fn from_entries(
        entries: Vec<Entry>,
        index: Option<usize>,
        direction: Direction,
    ) -> Result<Self, StackError> {
        validate_entries(&entries)?;
        let current = resolve_index(index, entries.len())?;
        let mut stack = Self {
            entries,
            current,
            direction,
            offset: 0,
        };
        stack.reindex();
        Ok(stack)
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn current(&self) -> &Entry {
        &self.entries[self.current]
    }

    pub fn get(&self, index: usize) -> Option<&Entry> {
        self.entries.get(index)
    }

    pub fn position_of(&self, key: &EntryKey) -> Option<usize> {
        self.entries.iter().position(|entry| &entry.key == key)
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Same stack, with `entries[0]` sitting at platform position `offset`.
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Platform position of the entry keyed `key`.
    pub fn platform_position(&self, key: &EntryKey) -> Option<usize> {
        self.position_of(key).map(|index| self.offset + index)
    }

    /// Stack index for a platform position, if it lies within the stack.
    pub fn local_index(&self, platform: usize) -> Option<usize> {
        platform
            .checked_sub(self.offset)
            .filter(|index| *index < self.entries.len())
    }

    /// Resolves what a push of `segments` would do without touching the stack.
    ///
    /// A location identical to the forward neighbour (checked first) or the
    /// backward neighbour collapses into a one-step jump.
    pub fn plan_push(&self, segments: &Segments, codec: &dyn PathCodec) -> StackChange {
        let url = codec.encode(segments);
        if let Some(next) = self.entries.get(self.current + 1) {
            if codec.encode(&next.segments) == url {
                return StackChange::Jumped { delta: 1 };
            }
        }
        if self.current > 0 {
            let prev = &self.entries[self.current - 1];
            if codec.encode(&prev.segments) == url {
                return StackChange::Jumped { delta: -1 };
            }
        }
        StackChange::Pushed
    }

    /// Truncates everything after the current entry, appends `entry` and advances.
    pub fn push(&mut self, entry: Entry, codec: &dyn PathCodec) -> Result<StackChange, StackError> {
        match self.plan_push(&entry.segments, codec) {
            StackChange::Jumped { delta } => {
                self.jump(&JumpTarget::Delta(delta))?;
                Ok(StackChange::Jumped { delta })
            }
            StackChange::Pushed => {
                self.push_unchecked(entry)?;
                Ok(StackChange::Pushed)
            }
        }
    }

    /// Push without the neighbour collapse; used when the decision was already taken.
    pub fn push_unchecked(&mut self, entry: Entry) -> Result<(), StackError> {
        if self.entries[..=self.current].iter().any(|e| e.key == entry.key) {
            return Err(StackError::DuplicateKey(entry.key));
        }
        self.entries.truncate(self.current + 1);
        self.entries.push(entry);
        self.current += 1;
        self.direction = Direction::Forward;
        self.reindex();
        Ok(())
    }

    /// Overwrites the current entry in place.
    pub fn replace(&mut self, entry: Entry) -> Result<(), StackError> {
        let clash = self
            .entries
            .iter()
            .enumerate()
            .any(|(i, e)| i != self.current && e.key == entry.key);
        if clash {
            return Err(StackError::DuplicateKey(entry.key));
        }
        self.entries[self.current] = entry;
        self.direction = Direction::Stay;
        self.reindex();
        Ok(())
    }

    /// Signed delta a jump would apply, or `CannotJump` when it leaves the stack.
    pub fn can_jump(&self, target: &JumpTarget) -> Result<i64, StackError> {
        match target {
            JumpTarget::Delta(delta) => {
                let destination = (self.current as i64).saturating_add(*delta);
                if destination < 0 || destination >= self.entries.len() as i64 {
                    return Err(StackError::CannotJump {
                        target: destination,
                        last: self.entries.len() - 1,
                    });
                }
                Ok(*delta)
            }
            JumpTarget::Key(key) => {
                let position = self
                    .position_of(key)
                    .ok_or_else(|| StackError::UnknownKey(key.clone()))?;
                Ok(position as i64 - self.current as i64)
            }
        }
    }

    pub fn jump(&mut self, target: &JumpTarget) -> Result<i64, StackError> {
        let delta = self.can_jump(target)?;
        self.current = (self.current as i64 + delta) as usize;
        self.direction = Direction::from_delta(delta);
        Ok(delta)
    }

    /// Replaces the whole sequence; `index` defaults to the last entry.
    pub fn reset(
        &mut self,
        entries: Vec<Entry>,
        index: Option<usize>,
        direction: Option<Direction>,
    ) -> Result<(), StackError> {
        validate_entries(&entries)?;
        let current = resolve_index(index, entries.len())?;
        self.entries = entries;
        self.current = current;
        self.direction = direction.unwrap_or(Direction::Stay);
        self.reindex();
        Ok(())
    }

    /// Patches state and/or segments of `target` (default: current entry).
    /// Returns the index of the patched entry.
    pub fn set(&mut self, patch: SetPatch, target: Option<&EntryKey>) -> Result<usize, StackError> {
        let index = match target {
            Some(key) => self
                .position_of(key)
                .ok_or_else(|| StackError::UnknownKey(key.clone()))?,
            None => self.current,
        };
        let entry = &mut self.entries[index];
        if let Some(state) = patch.state {
            entry.state = state;
        }
        if let Some(segments) = patch.segments {
            entry.segments = segments;
        }
        Ok(index)
    }

    /// Keeps `entries[..index]`, appends `landed` at `index` and makes it current.
    ///
    /// Used when the platform lands on an entry whose recorded position
    /// disagrees with ours: the landed entry wins and anything after it is dropped.
    pub fn truncate_onto(&mut self, index: usize, landed: Entry) {
        let keep = index.min(self.entries.len());
        self.entries.truncate(keep);
        self.entries.retain(|e| e.key != landed.key);
        let previous = self.current;
        self.entries.push(landed);
        self.current = self.entries.len() - 1;
        self.direction = Direction::from_delta(self.current as i64 - previous as i64);
        self.reindex();
    }

    pub fn condense(&self) -> CondensedStack {
        CondensedStack {
            offset: self.offset,
            index: self.offset + self.current,
            entries: self
                .entries
                .iter()
                .map(|e| CondensedEntry(e.segments.clone(), e.state.clone(), e.key.clone()))
                .collect(),
        }
    }

    /// Rebuilds a stack from its storage form. A trimmed head is not recovered:
    /// the surviving entries are re-indexed from zero and the trimmed count
    /// is kept as the stack's offset.
    pub fn from_condensed(condensed: &CondensedStack) -> Result<Self, StackError> {
        let entries: Vec<Entry> = condensed
            .entries
            .iter()
            .map(|CondensedEntry(segments, state, key)| {
                Entry::with_key(key.clone(), segments.clone(), state.clone())
            })
            .collect();
        let local = condensed
            .index
            .checked_sub(condensed.offset)
            .ok_or(StackError::IndexOutOfRange {
                index: condensed.index,
                len: entries.len(),
            })?;
        Ok(Self::from_entries(entries, Some(local), Direction::Stay)?.with_offset(condensed.offset))
    }

    fn reindex(&mut self) {
        for (i, entry) in self.entries.iter_mut().enumerate() {
            entry.index = i;
        }
    }
}

fn validate_entries(entries: &[Entry]) -> Result<(), StackError> {
    if entries.is_empty() {
        return Err(StackError::Empty);
    }
    let mut seen = HashSet::with_capacity(entries.len());
    for entry in entries {
        if !seen.insert(&entry.key) {
            return Err(StackError::DuplicateKey(entry.key.clone()));
        }
    }
    Ok(())
}

fn resolve_index(index: Option<usize>, len: usize) -> Result<usize, StackError> {
    match index {
        None => Ok(len - 1),
        Some(index) if index < len => Ok(index),
        Some(index) => Err(StackError::IndexOutOfRange { index, len }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::UrlPathCodec;

    fn stack_of(paths: &[&str], index: usize) -> EntryStack {
        let entries = paths.iter().map(|p| Entry::at_path(*p)).collect();
        EntryStack::from_entries(entries, Some(index), Direction::Stay).unwrap()
    }

    fn paths(stack: &EntryStack) -> Vec<&str> {
        stack.entries().iter().map(|e| e.segments.path.as_str()).collect()
    }

    fn assert_invariants(stack: &EntryStack) {
        assert!(stack.current_index() < stack.len());
        for (i, entry) in stack.entries().iter().enumerate() {
            assert_eq!(entry.index, i);
        }
        let keys: HashSet<_> = stack.entries().iter().map(|e| &e.key).collect();
        assert_eq!(keys.len(), stack.len());
    }

    #[test]
    fn push_appends_and_advances() {
        let codec = UrlPathCodec::new();
        let mut stack = stack_of(&["/a", "/b"], 1);
        let change = stack.push(Entry::at_path("/c"), &codec).unwrap();
        assert_eq!(change, StackChange::Pushed);
        assert_eq!(paths(&stack), ["/a", "/b", "/c"]);
        assert_eq!(stack.current_index(), 2);
        assert_eq!(stack.direction(), Direction::Forward);
        assert_invariants(&stack);
    }

    #[test]
    fn push_truncates_forward_entries() {
        let codec = UrlPathCodec::new();
        let mut stack = stack_of(&["/a", "/b", "/c"], 0);
        stack.push(Entry::at_path("/d"), &codec).unwrap();
        assert_eq!(paths(&stack), ["/a", "/d"]);
        assert_eq!(stack.current_index(), 1);
        assert_invariants(&stack);
    }

    #[test]
    fn push_identical_to_back_neighbour_becomes_jump() {
        let codec = UrlPathCodec::new();
        let mut stack = stack_of(&["/a", "/b"], 1);
        let before: Vec<_> = stack.entries().to_vec();
        let change = stack.push(Entry::at_path("/a"), &codec).unwrap();
        assert_eq!(change, StackChange::Jumped { delta: -1 });
        assert_eq!(stack.entries(), before.as_slice());
        assert_eq!(stack.current_index(), 0);
        assert_eq!(stack.direction(), Direction::Back);
    }

    #[test]
    fn push_identical_to_forward_neighbour_becomes_jump() {
        let codec = UrlPathCodec::new();
        let mut stack = stack_of(&["/a", "/b", "/c"], 1);
        let change = stack.push(Entry::at_path("/c"), &codec).unwrap();
        assert_eq!(change, StackChange::Jumped { delta: 1 });
        assert_eq!(stack.len(), 3);
        assert_eq!(stack.current_index(), 2);
    }

    #[test]
    fn replace_keeps_length_and_forward_entries() {
        let mut stack = stack_of(&["/a", "/b", "/c"], 1);
        stack.replace(Entry::at_path("/x")).unwrap();
        assert_eq!(paths(&stack), ["/a", "/x", "/c"]);
        assert_eq!(stack.current_index(), 1);
        assert_invariants(&stack);
    }

    #[test]
    fn replace_rejects_key_used_elsewhere() {
        let mut stack = stack_of(&["/a", "/b"], 1);
        let clash = stack.entries()[0].clone();
        let err = stack.replace(clash).unwrap_err();
        assert!(matches!(err, StackError::DuplicateKey(_)));
    }

    #[test]
    fn jump_by_delta_and_key() {
        let mut stack = stack_of(&["/a", "/b", "/c"], 2);
        assert_eq!(stack.jump(&JumpTarget::Delta(-2)).unwrap(), -2);
        assert_eq!(stack.current_index(), 0);
        assert_eq!(stack.direction(), Direction::Back);
        assert_eq!(paths(&stack), ["/a", "/b", "/c"]);

        let key = stack.entries()[1].key.clone();
        assert_eq!(stack.jump(&JumpTarget::Key(key)).unwrap(), 1);
        assert_eq!(stack.current_index(), 1);
        assert_eq!(stack.direction(), Direction::Forward);
    }

    #[test]
    fn jump_off_either_end_is_refused() {
        let mut stack = stack_of(&["/a", "/b"], 0);
        let before = stack.clone();
        assert!(matches!(
            stack.jump(&JumpTarget::Delta(-1)),
            Err(StackError::CannotJump { target: -1, last: 1 })
        ));
        assert!(matches!(
            stack.jump(&JumpTarget::Delta(2)),
            Err(StackError::CannotJump { target: 2, last: 1 })
        ));
        assert_eq!(stack, before);
    }

    #[test]
    fn extreme_deltas_are_refused_not_wrapped() {
        let mut stack = stack_of(&["/a", "/b"], 1);
        let before = stack.clone();
        assert!(matches!(
            stack.can_jump(&JumpTarget::Delta(i64::MAX)),
            Err(StackError::CannotJump { target: i64::MAX, last: 1 })
        ));
        assert!(matches!(
            stack.jump(&JumpTarget::Delta(i64::MIN)),
            Err(StackError::CannotJump { .. })
        ));
        assert_eq!(stack, before);
    }

    #[test]
    fn reset_then_jump_back() {
        let mut stack = stack_of(&["/z"], 0);
        let entries: Vec<_> = ["/a", "/b", "/c"].iter().map(|p| Entry::at_path(*p)).collect();
        stack.reset(entries.clone(), Some(1), None).unwrap();
        assert_eq!(paths(&stack), ["/a", "/b", "/c"]);
        assert_eq!(stack.current_index(), 1);
        stack.jump(&JumpTarget::Delta(-1)).unwrap();
        assert_eq!(stack.current_index(), 0);
        assert_eq!(paths(&stack), ["/a", "/b", "/c"]);
    }

    #[test]
    fn reset_defaults_to_last_and_rejects_bad_input() {
        let mut stack = stack_of(&["/z"], 0);
        let entries: Vec<_> = ["/a", "/b"].iter().map(|p| Entry::at_path(*p)).collect();
        stack.reset(entries.clone(), None, Some(Direction::Back)).unwrap();
        assert_eq!(stack.current_index(), 1);
        assert_eq!(stack.direction(), Direction::Back);

        assert_eq!(stack.reset(Vec::new(), None, None), Err(StackError::Empty));
        assert!(matches!(
            stack.reset(entries.clone(), Some(2), None),
            Err(StackError::IndexOutOfRange { index: 2, len: 2 })
        ));
        let dup = vec![entries[0].clone(), entries[0].clone()];
        assert!(matches!(stack.reset(dup, None, None), Err(StackError::DuplicateKey(_))));
        assert_invariants(&stack);
    }

    #[test]
    fn set_patches_without_moving() {
        let mut stack = stack_of(&["/a", "/b"], 1);
        let first = stack.entries()[0].key.clone();
        let index = stack
            .set(SetPatch::state(serde_json::json!({ "draft": true })), Some(&first))
            .unwrap();
        assert_eq!(index, 0);
        assert_eq!(stack.current_index(), 1);
        assert_eq!(stack.entries()[0].state.0["draft"], true);
    }

    #[test]
    fn truncate_onto_drops_everything_after_landing() {
        let mut stack = stack_of(&["/a", "/b", "/c", "/d"], 3);
        stack.truncate_onto(1, Entry::at_path("/x"));
        assert_eq!(paths(&stack), ["/a", "/x"]);
        assert_eq!(stack.current_index(), 1);
        assert_invariants(&stack);
    }

    #[test]
    fn condense_round_trip_keeps_keys_and_index() {
        let stack = stack_of(&["/a", "/b", "/c"], 1);
        let rebuilt = EntryStack::from_condensed(&stack.condense()).unwrap();
        assert_eq!(rebuilt.entries(), stack.entries());
        assert_eq!(rebuilt.current_index(), 1);
    }

    #[test]
    fn trimming_prefers_the_far_end() {
        let stack = stack_of(&["/a", "/b", "/c", "/d", "/e"], 1);
        let mut condensed = stack.condense();
        assert!(condensed.trim_farthest());
        assert_eq!(condensed.entries.len(), 4);
        assert_eq!(condensed.offset, 0);
        assert!(condensed.trim_farthest());
        // [a, b, c] around b: a tie, so the head goes
        assert!(condensed.trim_farthest());
        assert_eq!(condensed.entries.len(), 2);
        assert_eq!(condensed.offset, 1);
        assert!(condensed.trim_farthest());
        assert_eq!(condensed.entries.len(), 1);
        assert!(!condensed.trim_farthest());
        let rebuilt = EntryStack::from_condensed(&condensed).unwrap();
        assert_eq!(rebuilt.current().segments.path, "/b");
    }

    #[test]
    fn trimmed_head_becomes_the_offset() {
        let stack = stack_of(&["/a", "/b", "/c", "/d"], 3);
        let mut condensed = stack.condense();
        assert!(condensed.trim_farthest());
        assert!(condensed.trim_farthest());
        assert_eq!(condensed.offset, 2);

        let rebuilt = EntryStack::from_condensed(&condensed).unwrap();
        assert_eq!(paths(&rebuilt), ["/c", "/d"]);
        assert_eq!(rebuilt.offset(), 2);
        assert_eq!(rebuilt.current_index(), 1);
        let key = &stack.entries()[3].key;
        assert_eq!(rebuilt.platform_position(key), stack.platform_position(key));
        assert_eq!(rebuilt.local_index(3), Some(1));
        assert_eq!(rebuilt.local_index(1), None);
        assert_invariants(&rebuilt);

        // condensing again keeps positions absolute
        assert_eq!(rebuilt.condense().index, 3);
        assert_eq!(rebuilt.condense().offset, 2);
    }
}
