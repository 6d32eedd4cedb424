use crate::PlatformError;

/// "The user moved in history" notification delivered by the environment.
///
/// Carries whatever the platform exposes about the entry being landed on:
/// its URL and the opaque blob previously attached to it, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopSignal {
    pub url: String,
    pub blob: Option<Vec<u8>>,
}

/// The environment's capability-limited history mechanism.
///
/// It can push one entry, replace the current one, and move by a delta. It
/// cannot be asked for its contents beyond the current entry's blob and URL.
/// Moves may be applied asynchronously; callers confirm by polling
/// [`HistoryPrimitive::current_blob`].
pub trait HistoryPrimitive: Send + Sync {
    fn supports_history(&self) -> bool;
    fn push_entry(&mut self, url: &str, blob: Vec<u8>) -> Result<(), PlatformError>;
    fn replace_entry(&mut self, url: &str, blob: Vec<u8>) -> Result<(), PlatformError>;
    fn move_by_delta(&mut self, delta: i64) -> Result<(), PlatformError>;
    fn current_blob(&self) -> Option<Vec<u8>>;
    fn current_url(&self) -> String;
}
