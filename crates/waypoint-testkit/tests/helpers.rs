//! Shared helpers for the integration tests.
//!
//! Each test file compiles this module separately, so some helpers may look
//! unused from any single file.

#![allow(dead_code)]

use std::sync::Arc;

use waypoint_kernel::{Stage, TransitionPipeline, TransitionReport};

pub fn approach(stages: Vec<Arc<dyn Stage>>) -> TransitionPipeline {
    TransitionPipeline::from_stages(stages, Vec::new())
}

pub fn rewind(stages: Vec<Arc<dyn Stage>>) -> TransitionPipeline {
    TransitionPipeline::from_stages(Vec::new(), stages)
}

pub fn stage(stage: impl Stage + 'static) -> Arc<dyn Stage> {
    Arc::new(stage)
}

/// Path of the entry a report committed, if any.
pub fn committed_path(report: &TransitionReport) -> Option<&str> {
    report.entry.as_ref().map(|e| e.segments.path.as_str())
}

pub fn strs(paths: &[String]) -> Vec<&str> {
    paths.iter().map(String::as_str).collect()
}
