//! `waypoint inspect` command.

use anyhow::{Context, Result};
use clap::Args;
use serde_json::json;
use waypoint_platform::MirrorStore;

use crate::opts::{GlobalOpts, MirrorOpts};
use crate::output::{print_json, print_stack, wants_json};

#[derive(Args, Debug)]
pub struct InspectArgs {
    #[command(flatten)]
    pub mirror: MirrorOpts,
}

pub fn cmd_inspect(opts: &GlobalOpts, args: &InspectArgs) -> Result<()> {
    let mirror = args.mirror.open()?.context("--mirror-dir is required")?;
    let record = mirror
        .read()?
        .with_context(|| format!("no mirror record for tab '{}'", args.mirror.tab))?;
    let stack = record.to_stack()?;

    if wants_json(opts) {
        return print_json(
            opts,
            json!({
                "tab": args.mirror.tab,
                "current_index": stack.current_index(),
                "entries": stack.entries(),
            }),
        );
    }
    print_stack(stack.entries(), stack.current_index());
    Ok(())
}
