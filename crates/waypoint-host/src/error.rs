use thiserror::Error;
use waypoint_kernel::NavError;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("navigation error: {0}")]
    Nav(#[from] NavError),
    #[error("invalid value '{value}' for {var}: {reason}")]
    Config {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error("navigation daemon has stopped")]
    Closed,
}
