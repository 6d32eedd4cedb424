use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use waypoint_platform::Reconciliation;
use waypoint_types::{Direction, Entry, EntryState, JumpTarget, Segments};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Push,
    Replace,
    Jump,
    Reset,
    Set,
    Pop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Ui,
    Platform,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Committed,
    /// A stage refused to continue; the request is parked until `confirm`.
    Blocked,
    Redirected,
    Failed,
    /// Discarded by `confirm(false)`.
    Cancelled,
    /// Aborted because a newer navigation took its place.
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Approach,
    Rewind,
}

/// Where a navigation should go, before it becomes an entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub segments: Segments,
    #[serde(default)]
    pub state: EntryState,
    /// Logical route identity, used by stages such as the cache.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
}

impl Target {
    pub fn path(path: impl Into<String>) -> Self {
        Self {
            segments: Segments::path(path),
            ..Self::default()
        }
    }

    pub fn with_state(mut self, state: impl Into<EntryState>) -> Self {
        self.state = state.into();
        self
    }

    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route = Some(route.into());
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.segments = self.segments.with_query(key, value);
        self
    }
}

impl From<Segments> for Target {
    fn from(segments: Segments) -> Self {
        Self {
            segments,
            ..Self::default()
        }
    }
}

impl From<&str> for Target {
    fn from(path: &str) -> Self {
        Self::path(path)
    }
}

/// UI-originated navigation intent.
#[derive(Debug, Clone, PartialEq)]
pub enum Navigation {
    Push(Target),
    Replace(Target),
    Jump(JumpTarget),
    Reset {
        entries: Vec<Entry>,
        index: Option<usize>,
        direction: Option<Direction>,
    },
}

impl Navigation {
    pub fn push(path: impl Into<String>) -> Self {
        Navigation::Push(Target::path(path))
    }

    pub fn replace(path: impl Into<String>) -> Self {
        Navigation::Replace(Target::path(path))
    }

    pub fn jump(delta: i64) -> Self {
        Navigation::Jump(JumpTarget::Delta(delta))
    }
}

/// Stack mutation decided when the request was created; applied at commit.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Plan {
    Push,
    Replace,
    Jump {
        delta: i64,
    },
    Reset {
        entries: Vec<Entry>,
        index: Option<usize>,
        direction: Option<Direction>,
    },
    Pop {
        landing: Reconciliation,
        /// How far the platform moved, when known.
        platform_delta: Option<i64>,
        /// The platform was moved back while the request waited.
        restored: bool,
    },
}

/// One attempted navigation as it travels through the pipeline.
#[derive(Debug, Clone)]
pub struct Request {
    pub id: RequestId,
    pub kind: RequestKind,
    pub origin: Origin,
    pub status: RequestStatus,
    pub phase: Phase,
    /// Entry the request will make current.
    pub target: Entry,
    pub route: Option<String>,
    /// Values computed by stages; carried over to redirects.
    pub ambient: Map<String, Value>,
    pub redirects: usize,
    pub redirected_from: Option<RequestId>,
    pub superseded_by: Option<RequestId>,
    /// Current entry before the commit; set in the rewind phase.
    pub previous: Option<Entry>,
    /// Current entry after the commit; set in the rewind phase.
    pub committed: Option<Entry>,
    pub(crate) plan: Plan,
    pub(crate) blocked_at: Option<usize>,
    pub(crate) failed_stage: Option<String>,
}

impl Request {
    pub(crate) fn new(id: RequestId, kind: RequestKind, origin: Origin, target: Entry, plan: Plan) -> Self {
        Self {
            id,
            kind,
            origin,
            status: RequestStatus::Pending,
            phase: Phase::Approach,
            target,
            route: None,
            ambient: Map::new(),
            redirects: 0,
            redirected_from: None,
            superseded_by: None,
            previous: None,
            committed: None,
            plan,
            blocked_at: None,
            failed_stage: None,
        }
    }

    /// Index of the approach stage that blocked the request, if any.
    pub fn blocked_at(&self) -> Option<usize> {
        self.blocked_at
    }

    pub fn is_pop(&self) -> bool {
        self.origin == Origin::Platform
    }

    pub(crate) fn report(&self) -> TransitionReport {
        TransitionReport {
            request: self.id,
            kind: self.kind,
            origin: self.origin,
            status: self.status,
            entry: self.committed.clone(),
            previous: self.previous.clone(),
            redirects: self.redirects,
            superseded_by: self.superseded_by,
            rewind_errors: Vec::new(),
            follow_up: None,
        }
    }
}

/// What happened to a navigation attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionReport {
    pub request: RequestId,
    pub kind: RequestKind,
    pub origin: Origin,
    pub status: RequestStatus,
    /// New current entry, when the request committed.
    pub entry: Option<Entry>,
    pub previous: Option<Entry>,
    pub redirects: usize,
    pub superseded_by: Option<RequestId>,
    /// Failures of rewind stages; the commit stands regardless.
    pub rewind_errors: Vec<String>,
    /// Navigation processed as a consequence of this one.
    pub follow_up: Option<Box<TransitionReport>>,
}

impl TransitionReport {
    pub fn committed(&self) -> bool {
        self.status == RequestStatus::Committed
    }

    /// This report followed by every chained follow-up, in order.
    pub fn chain(&self) -> impl Iterator<Item = &TransitionReport> {
        std::iter::successors(Some(self), |report| report.follow_up.as_deref())
    }

    /// The last report of the follow-up chain.
    pub fn last(&self) -> &TransitionReport {
        self.chain().last().unwrap_or(self)
    }

    pub(crate) fn append(&mut self, next: TransitionReport) {
        match self.follow_up {
            Some(ref mut follow_up) => follow_up.append(next),
            None => self.follow_up = Some(Box::new(next)),
        }
    }
}
