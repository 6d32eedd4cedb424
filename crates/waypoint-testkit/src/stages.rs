use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Notify;
use waypoint_kernel::{Next, Origin, Outcome, Phase, Request, Stage, StageError, Target};

/// Holds requests until the test opens it.
///
/// Lets a test act (press back, dispatch) while a request sits between two
/// stages. Each `open` lets exactly one request through.
#[derive(Clone, Default)]
pub struct Gate {
    entered: Arc<Notify>,
    release: Arc<Notify>,
    origin: Option<Origin>,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gate that lets requests of any other origin pass untouched.
    pub fn for_origin(origin: Origin) -> Self {
        Self {
            origin: Some(origin),
            ..Self::default()
        }
    }

    /// Resolves once a request is waiting at the gate.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn open(&self) {
        self.release.notify_one();
    }
}

#[async_trait]
impl Stage for Gate {
    fn name(&self) -> &str {
        "gate"
    }

    async fn run(&self, req: &mut Request, next: Next<'_>) -> Result<Outcome, StageError> {
        if self.origin.is_none_or(|origin| origin == req.origin) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        next.run(req).await
    }
}

/// Blocks the first request it sees and lets everything after it through.
#[derive(Default)]
pub struct BlockOnce {
    fired: AtomicBool,
}

impl BlockOnce {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Stage for BlockOnce {
    fn name(&self) -> &str {
        "block-once"
    }

    async fn run(&self, req: &mut Request, next: Next<'_>) -> Result<Outcome, StageError> {
        if !self.fired.swap(true, Ordering::SeqCst) {
            return Ok(Outcome::Blocked);
        }
        next.run(req).await
    }
}

/// Sends navigations for `from` to `to`.
pub struct RedirectTo {
    from: String,
    to: String,
}

impl RedirectTo {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

#[async_trait]
impl Stage for RedirectTo {
    fn name(&self) -> &str {
        "redirect"
    }

    async fn run(&self, req: &mut Request, next: Next<'_>) -> Result<Outcome, StageError> {
        let path = match req.phase {
            Phase::Approach => &req.target.segments.path,
            Phase::Rewind => match &req.committed {
                Some(entry) => &entry.segments.path,
                None => return next.run(req).await,
            },
        };
        if *path == self.from {
            return Ok(Outcome::Redirect(Target::path(self.to.clone())));
        }
        next.run(req).await
    }
}

/// Fails every request headed for `path`.
pub struct Fail {
    path: String,
}

impl Fail {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Stage for Fail {
    fn name(&self) -> &str {
        "fail"
    }

    async fn run(&self, req: &mut Request, next: Next<'_>) -> Result<Outcome, StageError> {
        if req.target.segments.path == self.path {
            return Err(StageError::msg(format!("refusing {}", self.path)));
        }
        next.run(req).await
    }
}

/// What a [`Recorder`] saw of one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Seen {
    pub phase: Phase,
    pub origin: Origin,
    pub target: String,
    pub previous: Option<String>,
    pub committed: Option<String>,
    pub ambient: Map<String, Value>,
}

/// Records every request passing through and continues.
#[derive(Clone, Default)]
pub struct Recorder {
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn clear(&self) {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

#[async_trait]
impl Stage for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    async fn run(&self, req: &mut Request, next: Next<'_>) -> Result<Outcome, StageError> {
        let path = |entry: &Option<waypoint_types::Entry>| entry.as_ref().map(|e| e.segments.path.clone());
        let seen = Seen {
            phase: req.phase,
            origin: req.origin,
            target: req.target.segments.path.clone(),
            previous: path(&req.previous),
            committed: path(&req.committed),
            ambient: req.ambient.clone(),
        };
        log::trace!("recorded {seen:?}");
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).push(seen);
        next.run(req).await
    }
}
