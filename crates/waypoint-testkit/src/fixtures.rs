use std::sync::{Arc, Mutex};
use std::time::Duration;

use waypoint_kernel::{CoordinatorConfig, TransitionCoordinator, TransitionPipeline};
use waypoint_platform::{HistoryPrimitive, MemMirror, MemoryHistory, PlatformError};
use waypoint_types::{Entry, Segments};

/// Coordinator config with a short poll so unconfirmed moves fail fast.
pub fn fast_config() -> CoordinatorConfig {
    CoordinatorConfig {
        poll_interval: Duration::from_millis(1),
        poll_attempts: 5,
        ..CoordinatorConfig::default()
    }
}

pub fn paths(nav: &TransitionCoordinator) -> Vec<String> {
    nav.entries().iter().map(|e| e.segments.path.clone()).collect()
}

pub fn entries(paths: &[&str]) -> Vec<Entry> {
    paths
        .iter()
        .map(|path| Entry::new(Segments::path(*path), Default::default()))
        .collect()
}

/// A coordinator wired to a simulated history and an in-memory mirror,
/// with handles to both kept for assertions.
pub struct Fixture {
    pub history: MemoryHistory,
    pub mirror: MemMirror,
    pub nav: TransitionCoordinator,
}

impl Fixture {
    /// Seeds `paths` (current index defaults to the last one). Echoes of the
    /// seeding moves are drained before returning.
    pub async fn seeded(paths: &[&str], index: Option<usize>, pipeline: TransitionPipeline) -> Self {
        let history = MemoryHistory::new(paths.first().copied().unwrap_or("/"));
        let mirror = MemMirror::new();
        let mut nav = TransitionCoordinator::builder(history.clone(), mirror.clone())
            .config(fast_config())
            .pipeline(pipeline)
            .signals(history.subscribe())
            .seed(entries(paths), index)
            .open()
            .await
            .expect("open seeded coordinator");
        let stray = nav.settle().await.expect("drain seeding echoes");
        assert!(stray.is_empty(), "seeding produced transitions: {stray:?}");
        Self { history, mirror, nav }
    }

    /// Restarts the coordinator over the same platform history and mirror.
    pub async fn reload(self, pipeline: TransitionPipeline) -> Self {
        let Self { history, mirror, nav } = self;
        drop(nav);
        let nav = TransitionCoordinator::builder(history.clone(), mirror.clone())
            .config(fast_config())
            .pipeline(pipeline)
            .signals(history.subscribe())
            .open()
            .await
            .expect("reopen coordinator");
        Self { history, mirror, nav }
    }

    pub fn paths(&self) -> Vec<String> {
        paths(&self.nav)
    }
}

/// Which primitive calls a [`FlakyHistory`] rejects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reject {
    #[default]
    Nothing,
    Everything,
    /// Pushes and replaces fail; moves go through.
    Writes,
    /// The next `n` pushes go through, later ones fail.
    PushesAfter(usize),
}

/// [`MemoryHistory`] that rejects calls according to a [`Reject`] policy.
#[derive(Debug, Clone)]
pub struct FlakyHistory {
    pub inner: MemoryHistory,
    reject: Arc<Mutex<Reject>>,
}

impl FlakyHistory {
    pub fn new(inner: MemoryHistory) -> Self {
        Self {
            inner,
            reject: Arc::new(Mutex::new(Reject::Nothing)),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.reject(if failing { Reject::Everything } else { Reject::Nothing });
    }

    pub fn reject(&self, reject: Reject) {
        *self.reject.lock().unwrap() = reject;
    }

    fn check(&self, op: &'static str) -> Result<(), PlatformError> {
        let mut reject = self.reject.lock().unwrap();
        let refused = match (*reject, op) {
            (Reject::Nothing, _) => false,
            (Reject::Everything, _) => true,
            (Reject::Writes, "move") => false,
            (Reject::Writes, _) => true,
            (Reject::PushesAfter(0), "push") => true,
            (Reject::PushesAfter(n), "push") => {
                *reject = Reject::PushesAfter(n - 1);
                false
            }
            (Reject::PushesAfter(_), _) => false,
        };
        if refused {
            return Err(PlatformError::Rejected {
                op,
                reason: "quota exceeded".into(),
            });
        }
        Ok(())
    }
}

impl HistoryPrimitive for FlakyHistory {
    fn supports_history(&self) -> bool {
        self.inner.supports_history()
    }

    fn push_entry(&mut self, url: &str, blob: Vec<u8>) -> Result<(), PlatformError> {
        self.check("push")?;
        self.inner.push_entry(url, blob)
    }

    fn replace_entry(&mut self, url: &str, blob: Vec<u8>) -> Result<(), PlatformError> {
        self.check("replace")?;
        self.inner.replace_entry(url, blob)
    }

    fn move_by_delta(&mut self, delta: i64) -> Result<(), PlatformError> {
        self.check("move")?;
        self.inner.move_by_delta(delta)
    }

    fn current_blob(&self) -> Option<Vec<u8>> {
        self.inner.current_blob()
    }

    fn current_url(&self) -> String {
        self.inner.current_url()
    }
}
