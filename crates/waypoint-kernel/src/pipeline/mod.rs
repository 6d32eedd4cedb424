//! Staged transition pipeline.
//!
//! A request walks the approach stages in order; each stage decides whether
//! to continue (by running `next`), block, or redirect. After the commit the
//! rewind stages run once each, seeing both the previous and the committed
//! entry.

mod resolve;

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

pub use resolve::{StageDef, StageRegistry};

use crate::{Phase, Request, StageError, Target};

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Continue,
    /// Stop here; nothing is committed and the request is parked.
    Blocked,
    /// Abandon this target in favour of another.
    Redirect(Target),
}

/// One step of the pipeline.
///
/// A stage continues by awaiting `next.run(req)` and returning its result.
/// Returning `Continue` without running `next` skips the remaining stages.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn run(&self, req: &mut Request, next: Next<'_>) -> Result<Outcome, StageError>;
}

/// Continuation over the stages that follow the running one.
pub struct Next<'a> {
    stages: &'a [Arc<dyn Stage>],
    offset: usize,
}

impl<'a> Next<'a> {
    pub(crate) fn new(stages: &'a [Arc<dyn Stage>], offset: usize) -> Self {
        Self { stages, offset }
    }

    /// Continuation that immediately yields `Continue`.
    pub fn end() -> Self {
        Self {
            stages: Default::default(),
            offset: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.stages.len()
    }

    pub fn run<'b>(self, req: &'b mut Request) -> BoxFuture<'b, Result<Outcome, StageError>>
    where
        'a: 'b,
    {
        Box::pin(async move {
            let Some((stage, rest)) = self.stages.split_first() else {
                return Ok(Outcome::Continue);
            };
            let next = Next {
                stages: rest,
                offset: self.offset + 1,
            };
            match stage.run(req, next).await {
                Ok(Outcome::Blocked) => {
                    if req.blocked_at.is_none() {
                        req.blocked_at = Some(self.offset);
                    }
                    Ok(Outcome::Blocked)
                }
                Ok(outcome) => {
                    req.blocked_at = None;
                    Ok(outcome)
                }
                Err(err) => {
                    if req.failed_stage.is_none() {
                        req.failed_stage = Some(stage.name().to_owned());
                    }
                    Err(err)
                }
            }
        })
    }
}

type CheckFn = dyn Fn(&mut Request) -> Result<Outcome, StageError> + Send + Sync;

/// Stage built from a synchronous check; continues down the chain when the
/// check returns `Continue`.
pub struct FnStage {
    name: String,
    check: Box<CheckFn>,
}

impl FnStage {
    pub fn new<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&mut Request) -> Result<Outcome, StageError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            check: Box::new(check),
        }
    }
}

#[async_trait]
impl Stage for FnStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, req: &mut Request, next: Next<'_>) -> Result<Outcome, StageError> {
        match (self.check)(req)? {
            Outcome::Continue => next.run(req).await,
            other => Ok(other),
        }
    }
}

/// Result of the rewind phase.
#[derive(Debug, Default)]
pub(crate) struct Rewound {
    pub errors: Vec<String>,
    pub redirect: Option<Target>,
}

/// Flattened pipeline: approach stages, the commit point, rewind stages.
#[derive(Clone, Default)]
pub struct TransitionPipeline {
    approach: Vec<Arc<dyn Stage>>,
    rewind: Vec<Arc<dyn Stage>>,
}

impl std::fmt::Debug for TransitionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = |stages: &[Arc<dyn Stage>]| -> Vec<String> {
            stages.iter().map(|s| s.name().to_owned()).collect()
        };
        f.debug_struct("TransitionPipeline")
            .field("approach", &names(&self.approach))
            .field("rewind", &names(&self.rewind))
            .finish()
    }
}

impl TransitionPipeline {
    /// Pipeline that commits immediately and has no rewind stages.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_stages(approach: Vec<Arc<dyn Stage>>, rewind: Vec<Arc<dyn Stage>>) -> Self {
        Self { approach, rewind }
    }

    pub fn approach_len(&self) -> usize {
        self.approach.len()
    }

    pub fn rewind_len(&self) -> usize {
        self.rewind.len()
    }

    /// Runs approach stages starting at `from`. `Continue` means commit.
    pub(crate) async fn approach(&self, req: &mut Request, from: usize) -> Result<Outcome, StageError> {
        req.phase = Phase::Approach;
        req.blocked_at = None;
        req.failed_stage = None;
        let stages = self.approach.get(from..).unwrap_or_default();
        Next::new(stages, from).run(req).await
    }

    /// Runs every rewind stage once. Failures are collected, blocks are
    /// ignored and the first redirect is kept for a follow-up navigation.
    pub(crate) async fn rewind(&self, req: &mut Request) -> Rewound {
        req.phase = Phase::Rewind;
        let mut rewound = Rewound::default();
        for stage in &self.rewind {
            match stage.run(req, Next::end()).await {
                Ok(Outcome::Continue) => {}
                Ok(Outcome::Blocked) => {
                    log::warn!(
                        "rewind stage '{}' tried to block committed request {}",
                        stage.name(),
                        req.id
                    );
                }
                Ok(Outcome::Redirect(target)) => {
                    if rewound.redirect.is_none() {
                        rewound.redirect = Some(target);
                    } else {
                        log::warn!("ignoring extra rewind redirect from '{}'", stage.name());
                    }
                }
                Err(err) => {
                    log::warn!("rewind stage '{}' failed for {}: {err}", stage.name(), req.id);
                    rewound.errors.push(format!("{}: {err}", stage.name()));
                }
            }
        }
        rewound
    }
}
