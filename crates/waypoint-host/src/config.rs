use std::str::FromStr;
use std::time::Duration;

use waypoint_kernel::CoordinatorConfig;

use crate::HostError;

pub const ENV_POLL_INTERVAL_MS: &str = "WAYPOINT_POLL_INTERVAL_MS";
pub const ENV_POLL_ATTEMPTS: &str = "WAYPOINT_POLL_ATTEMPTS";
pub const ENV_BLOB_BUDGET: &str = "WAYPOINT_BLOB_BUDGET";
pub const ENV_MAX_REDIRECTS: &str = "WAYPOINT_MAX_REDIRECTS";
pub const ENV_CONTROL_CAPACITY: &str = "WAYPOINT_CONTROL_CAPACITY";

#[derive(Debug, Clone)]
pub struct HostConfig {
    pub coordinator: CoordinatorConfig,
    /// Bound of the command channel shared by all handles.
    pub control_capacity: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            coordinator: CoordinatorConfig::default(),
            control_capacity: 64,
        }
    }
}

impl HostConfig {
    /// Defaults overridden by any `WAYPOINT_*` variables that are set.
    pub fn from_env() -> Result<Self, HostError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) with variables resolved by `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, HostError> {
        let mut config = Self::default();
        if let Some(ms) = parse::<u64>(&lookup, ENV_POLL_INTERVAL_MS)? {
            config.coordinator.poll_interval = Duration::from_millis(ms);
        }
        if let Some(attempts) = parse(&lookup, ENV_POLL_ATTEMPTS)? {
            config.coordinator.poll_attempts = attempts;
        }
        if let Some(budget) = parse(&lookup, ENV_BLOB_BUDGET)? {
            config.coordinator.blob_budget = budget;
        }
        if let Some(limit) = parse(&lookup, ENV_MAX_REDIRECTS)? {
            config.coordinator.max_redirects = limit;
        }
        if let Some(capacity) = parse::<usize>(&lookup, ENV_CONTROL_CAPACITY)? {
            if capacity == 0 {
                return Err(HostError::Config {
                    var: ENV_CONTROL_CAPACITY,
                    value: capacity.to_string(),
                    reason: "must be at least 1".into(),
                });
            }
            config.control_capacity = capacity;
        }
        Ok(config)
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, var: &'static str) -> Result<Option<T>, HostError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(value) = lookup(var) else {
        return Ok(None);
    };
    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|err: T::Err| HostError::Config {
            var,
            reason: err.to_string(),
            value,
        })
}
