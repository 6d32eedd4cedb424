use thiserror::Error;
use waypoint_platform::{AdapterError, MirrorError};
use waypoint_types::StackError;

use crate::RequestId;

/// Failure raised by a pipeline stage.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("{0}")]
    Failed(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StageError {
    pub fn msg(message: impl std::fmt::Display) -> Self {
        StageError::Failed(message.to_string())
    }
}

/// Invalid pipeline declaration, detected once at setup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("stage chain '{0}' is not registered")]
    Unknown(String),
    #[error("stage chains reference each other in a cycle: {0}")]
    Cycle(String),
    #[error("pipeline declares more than one commit stage")]
    DuplicateCommit,
    #[error("commit stage cannot be part of a parallel group")]
    CommitInParallel,
}

#[derive(Debug, Error)]
pub enum NavError {
    #[error(transparent)]
    Stack(#[from] StackError),
    #[error("platform adapter error: {0}")]
    Adapter(#[from] AdapterError),
    #[error("mirror error: {0}")]
    Mirror(#[from] MirrorError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("stage '{stage}' failed for request {request}: {source}")]
    StageFailure {
        request: RequestId,
        stage: String,
        #[source]
        source: StageError,
    },
    #[error("request {request} exceeded {limit} redirects")]
    RedirectLoop { request: RequestId, limit: usize },
    #[error("no blocked transition is waiting for confirmation")]
    NothingParked,
}
