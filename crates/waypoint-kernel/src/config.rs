use std::time::Duration;

use waypoint_platform::AdapterConfig;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Pause between reads while confirming a platform operation.
    pub poll_interval: Duration,
    /// Reads before an operation is declared unconfirmed.
    pub poll_attempts: u32,
    /// Upper bound for an encoded entry blob, in bytes.
    pub blob_budget: usize,
    pub max_redirects: usize,
    /// Embed the condensed stack in every entry blob.
    pub embed_stack_in_blob: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            poll_attempts: 20,
            blob_budget: 16 * 1024,
            max_redirects: 5,
            embed_stack_in_blob: true,
        }
    }
}

impl CoordinatorConfig {
    pub fn adapter(&self) -> AdapterConfig {
        AdapterConfig {
            poll_interval: self.poll_interval,
            poll_attempts: self.poll_attempts,
            blob_budget: self.blob_budget,
            embed_stack: self.embed_stack_in_blob,
        }
    }
}
