//! Options shared by every command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use waypoint_platform::FsMirror;

#[derive(Args, Debug, Clone)]
pub struct GlobalOpts {
    /// JSON output
    #[arg(long, global = true)]
    pub json: bool,

    /// Pretty-print JSON output (implies --json)
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Only print errors to stderr
    #[arg(long, global = true)]
    pub quiet: bool,
}

/// Location of a file-backed mirror.
#[derive(Args, Debug, Clone)]
pub struct MirrorOpts {
    /// Directory holding one mirror record per tab (env: WAYPOINT_MIRROR_DIR)
    #[arg(long, env = "WAYPOINT_MIRROR_DIR")]
    pub mirror_dir: Option<PathBuf>,

    /// Tab id scoping the mirror record (env: WAYPOINT_TAB)
    #[arg(long, env = "WAYPOINT_TAB", default_value = "default")]
    pub tab: String,
}

impl MirrorOpts {
    /// Opens the mirror when a directory was given.
    pub fn open(&self) -> Result<Option<FsMirror>> {
        let Some(dir) = &self.mirror_dir else {
            return Ok(None);
        };
        FsMirror::open(dir, &self.tab)
            .map(Some)
            .with_context(|| format!("open mirror for tab '{}' in {}", self.tab, dir.display()))
    }
}
