use std::{io, path::PathBuf};

use thiserror::Error;
use waypoint_types::StackError;

/// Failure reported by the environment's history primitive.
#[derive(Debug, Clone, Error)]
pub enum PlatformError {
    #[error("history primitive rejected {op}: {reason}")]
    Rejected { op: &'static str, reason: String },
    #[error("history primitive is not available")]
    Unsupported,
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error("entry blob encoding error: {0}")]
    Blob(#[from] serde_cbor::Error),
    #[error(transparent)]
    Stack(#[from] StackError),
    /// A rewrite failed after its first `written` entries reached the
    /// platform, which now shows the last of them.
    #[error("platform kept {written} rewritten entries before failing: {source}")]
    Partial {
        written: usize,
        #[source]
        source: Box<AdapterError>,
    },
}

impl AdapterError {
    pub(crate) fn partial(written: usize, source: AdapterError) -> Self {
        AdapterError::Partial {
            written,
            source: Box::new(source),
        }
    }
}

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("mirror record encoding error: {0}")]
    Cbor(#[from] serde_cbor::Error),
    #[error(transparent)]
    Stack(#[from] StackError),
    #[error("mirror store is unavailable")]
    Unavailable,
    #[error("invalid tab id '{0}'")]
    InvalidTab(String),
}

pub(crate) fn io_error(path: impl Into<PathBuf>, err: io::Error) -> MirrorError {
    MirrorError::Io {
        path: path.into(),
        source: err,
    }
}
