//! Test utilities for exercising the navigation engine with deterministic fixtures.
//!
//! - `stages`: scripted pipeline stages (gates, guards, redirects, failures, recorders)
//! - `fixtures`: coordinators over a simulated platform, plus a primitive that can be told to fail

pub mod fixtures;
pub mod stages;

pub use fixtures::{Fixture, FlakyHistory, Reject, entries, fast_config, paths};
pub use stages::{BlockOnce, Fail, Gate, Recorder, RedirectTo, Seen};
