//! `waypoint replay` command.
//!
//! Runs a navigation script against an in-memory platform history and prints
//! the resulting stack together with every transition the script caused.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::json;
use waypoint_host::{HostConfig, StackSnapshot};
use waypoint_kernel::{
    CacheStage, CoordinatorConfig, FnStage, Navigation, Outcome, Request, StageDef, StageRegistry,
    TransitionCoordinator, TransitionPipeline, TransitionReport,
};
use waypoint_platform::{MemCache, MemMirror, MemoryHistory, MirrorStore};
use waypoint_types::{JumpTarget, SetPatch};

use crate::opts::{GlobalOpts, MirrorOpts};
use crate::output::{print_json, print_stack, wants_json};
use crate::script::{Script, Step, entries};

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Navigation script (JSON)
    pub script: PathBuf,

    #[command(flatten)]
    pub mirror: MirrorOpts,

    /// Consult and fill a memo cache around every commit
    #[arg(long)]
    pub cache: bool,

    /// Keep entry blobs small by not embedding the stack in them
    #[arg(long)]
    pub no_embed: bool,

    /// Simulate an environment without a history primitive
    #[arg(long)]
    pub no_history: bool,
}

pub async fn cmd_replay(opts: &GlobalOpts, args: &ReplayArgs) -> Result<()> {
    let script = Script::load(&args.script)?;
    let mut config = HostConfig::from_env()?.coordinator;
    if args.no_embed {
        config.embed_stack_in_blob = false;
    }
    let history = if args.no_history {
        MemoryHistory::without_history_support(script.start.as_str())
    } else {
        MemoryHistory::new(script.start.as_str())
    };
    let mut replay = Replay {
        history,
        config,
        pipeline: pipeline(args.cache, &script.guards)?,
        mirror: args.mirror.clone(),
        fallback: MemMirror::new(),
        reports: Vec::new(),
    };

    let mut nav = replay.open(&script.seed).await?;
    for (n, step) in script.steps.into_iter().enumerate() {
        tracing::debug!(step = n + 1, ?step, "replaying");
        nav = replay
            .step(nav, step)
            .await
            .with_context(|| format!("step {} failed", n + 1))?;
    }

    let snapshot = StackSnapshot::of(&nav);
    if wants_json(opts) {
        return print_json(
            opts,
            json!({
                "stack": snapshot,
                "reports": replay.reports,
                "platform": {
                    "urls": replay.history.urls(),
                    "index": replay.history.index(),
                },
            }),
        );
    }
    for report in replay.reports.iter().flat_map(TransitionReport::chain) {
        let path = report.entry.as_ref().map_or("-", |e| e.segments.path.as_str());
        println!("{} {:?} {:?} {path}", report.request, report.kind, report.status);
    }
    println!();
    print_stack(&snapshot.entries, snapshot.current_index);
    Ok(())
}

/// Cache stage on both sides of the commit, behind an optional guard.
fn pipeline(cache: bool, guards: &[String]) -> Result<TransitionPipeline> {
    let mut registry = StageRegistry::new();
    let mut approach = Vec::new();
    let mut rewind = Vec::new();
    if !guards.is_empty() {
        let guards = guards.to_vec();
        approach.push(StageDef::function(FnStage::new("guard", move |req: &mut Request| {
            let guarded = guards.contains(&req.target.segments.path);
            Ok(if guarded { Outcome::Blocked } else { Outcome::Continue })
        })));
    }
    if cache {
        registry.register("cache", StageDef::function(CacheStage::new(Arc::new(MemCache::new()))));
        approach.push(StageDef::named("cache"));
        rewind.push(StageDef::named("cache"));
    }
    let root = StageDef::sequence(
        approach
            .into_iter()
            .chain([StageDef::Commit])
            .chain(rewind),
    );
    TransitionPipeline::resolve(&registry, &root).context("resolve pipeline")
}

struct Replay {
    history: MemoryHistory,
    config: CoordinatorConfig,
    pipeline: TransitionPipeline,
    mirror: MirrorOpts,
    /// Survives reloads when no mirror directory was given.
    fallback: MemMirror,
    reports: Vec<TransitionReport>,
}

impl Replay {
    async fn open(&self, seed: &[String]) -> Result<TransitionCoordinator> {
        let mirror: Box<dyn MirrorStore> = match self.mirror.open()? {
            Some(fs) => Box::new(fs),
            None => Box::new(self.fallback.clone()),
        };
        let mut builder = TransitionCoordinator::builder(self.history.clone(), mirror)
            .config(self.config.clone())
            .pipeline(self.pipeline.clone())
            .signals(self.history.subscribe());
        if !seed.is_empty() {
            builder = builder.seed(entries(seed), None);
        }
        Ok(builder.open().await?)
    }

    async fn step(&mut self, mut nav: TransitionCoordinator, step: Step) -> Result<TransitionCoordinator> {
        let report = match step {
            Step::Push(target) => Some(nav.dispatch(Navigation::Push(target.into())).await?),
            Step::Replace(target) => Some(nav.dispatch(Navigation::Replace(target.into())).await?),
            Step::Jump(delta) => Some(nav.jump(JumpTarget::Delta(delta)).await?),
            Step::Reset { paths, index } => Some(nav.reset(entries(&paths), index, None).await?),
            Step::Set(state) => Some(nav.set(SetPatch::state(state), None).await?),
            Step::Confirm(proceed) => Some(nav.confirm(proceed).await?),
            Step::Back => {
                self.history.back();
                None
            }
            Step::Forward => {
                self.history.forward();
                None
            }
            Step::Leave(url) => {
                self.history.visit_foreign(url);
                None
            }
            Step::Reload => {
                drop(nav);
                tracing::info!("reloading");
                nav = self.open(&[]).await?;
                None
            }
        };
        self.reports.extend(report);
        let popped = nav.settle().await?;
        self.reports.extend(popped);
        Ok(nav)
    }
}
