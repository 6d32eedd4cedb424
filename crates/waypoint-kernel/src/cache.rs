use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use waypoint_platform::{CacheKey, MemoCache};
use waypoint_types::Entry;

use crate::{Next, Outcome, Phase, Request, Stage, StageError};

/// Ambient key holding whether the target was already memoised.
pub const CACHE_HIT: &str = "cache_hit";

/// Consults the memo cache before commit and records the entry after it.
///
/// Place it on both sides of the commit marker.
pub struct CacheStage {
    cache: Arc<dyn MemoCache>,
}

impl CacheStage {
    pub fn new(cache: Arc<dyn MemoCache>) -> Self {
        Self { cache }
    }

    /// Key derived from the logical route (falling back to the path), the
    /// resolved path and the search string of `entry`.
    pub fn key_for(route: Option<&str>, entry: &Entry) -> Result<CacheKey, StageError> {
        let segments = &entry.segments;
        let search = segments
            .query
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        let route = route.unwrap_or(&segments.path);
        CacheKey::new(route, segments.path.as_str(), search)
            .map_err(|err| StageError::msg(format!("cache key encoding failed: {err}")))
    }
}

#[async_trait]
impl Stage for CacheStage {
    fn name(&self) -> &str {
        "cache"
    }

    async fn run(&self, req: &mut Request, next: Next<'_>) -> Result<Outcome, StageError> {
        match req.phase {
            Phase::Approach => {
                let key = Self::key_for(req.route.as_deref(), &req.target)?;
                let hit = self.cache.get(&key);
                req.ambient.insert(CACHE_HIT.to_owned(), Value::Bool(hit));
                next.run(req).await
            }
            Phase::Rewind => {
                let entry = req.committed.as_ref().unwrap_or(&req.target);
                let key = Self::key_for(req.route.as_deref(), entry)?;
                self.cache.set(key);
                next.run(req).await
            }
        }
    }
}
