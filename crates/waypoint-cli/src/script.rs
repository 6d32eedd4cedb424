//! JSON navigation scripts for `waypoint replay`.
//!
//! ```json
//! {
//!   "start": "/home",
//!   "steps": [
//!     { "push": "/orders" },
//!     { "push": { "segments": { "path": "/orders/7" }, "state": { "tab": "items" } } },
//!     "back",
//!     { "jump": 1 },
//!     { "set": { "scroll": 120 } },
//!     { "leave": "/elsewhere" },
//!     "back",
//!     "reload"
//!   ]
//! }
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use waypoint_kernel::Target;
use waypoint_types::{Entry, Segments};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Script {
    /// URL the simulated platform shows before the first step.
    #[serde(default = "default_start")]
    pub start: String,
    /// Seed paths; the platform history is rewritten to match them.
    #[serde(default)]
    pub seed: Vec<String>,
    /// Paths whose navigations block until a `confirm` step.
    #[serde(default)]
    pub guards: Vec<String>,
    pub steps: Vec<Step>,
}

fn default_start() -> String {
    "/".to_owned()
}

impl Script {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read script {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parse script {}", path.display()))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Push(TargetSpec),
    Replace(TargetSpec),
    /// Relative jump through the stack.
    Jump(i64),
    Reset {
        paths: Vec<String>,
        #[serde(default)]
        index: Option<usize>,
    },
    /// Replaces the state of the current entry.
    Set(Value),
    /// Resolves the parked request.
    Confirm(bool),
    /// The user presses back in the platform UI.
    Back,
    Forward,
    /// The user follows a link out of the application.
    Leave(String),
    /// The process restarts; platform history and mirror survive.
    Reload,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TargetSpec {
    Path(String),
    Full(Target),
}

impl From<TargetSpec> for Target {
    fn from(spec: TargetSpec) -> Self {
        match spec {
            TargetSpec::Path(path) => Target::path(path),
            TargetSpec::Full(target) => target,
        }
    }
}

pub fn entries(paths: &[String]) -> Vec<Entry> {
    paths
        .iter()
        .map(|path| Entry::new(Segments::path(path.as_str()), Default::default()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_accept_short_and_full_forms() {
        let script: Script = serde_json::from_str(
            r#"{
                "steps": [
                    { "push": "/a" },
                    { "push": { "segments": { "path": "/b" }, "state": { "n": 1 } } },
                    "back",
                    { "reset": { "paths": ["/x", "/y"], "index": 0 } },
                    { "confirm": false }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(script.start, "/");
        assert_eq!(script.steps.len(), 5);
        match &script.steps[1] {
            Step::Push(TargetSpec::Full(target)) => assert_eq!(target.segments.path, "/b"),
            other => panic!("unexpected step {other:?}"),
        }
        assert!(matches!(script.steps[2], Step::Back));
        assert!(matches!(script.steps[3], Step::Reset { index: Some(0), .. }));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(serde_json::from_str::<Script>(r#"{ "steps": [], "tabs": 2 }"#).is_err());
    }
}
