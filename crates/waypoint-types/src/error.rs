use thiserror::Error;

use crate::EntryKey;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StackError {
    #[error("cannot jump to {target}: stack holds indices 0..={last}")]
    CannotJump { target: i64, last: usize },
    #[error("no entry with key '{0}'")]
    UnknownKey(EntryKey),
    #[error("entry key '{0}' is already present in the stack")]
    DuplicateKey(EntryKey),
    #[error("stack must contain at least one entry")]
    Empty,
    #[error("index {index} out of range for {len} entries")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("invalid location '{input}': {reason}")]
    InvalidLocation { input: String, reason: String },
}
