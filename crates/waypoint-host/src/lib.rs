//! Async driver for the navigation coordinator.
//!
//! [`NavDaemon`] owns a [`TransitionCoordinator`](waypoint_kernel::TransitionCoordinator)
//! and serializes every command arriving from [`NavHandle`]s with the platform's
//! pop signals, so at most one request is ever in flight.

pub mod config;
pub mod daemon;
pub mod error;

pub use config::HostConfig;
pub use daemon::{ControlMsg, NavDaemon, NavHandle, StackSnapshot};
pub use error::HostError;
