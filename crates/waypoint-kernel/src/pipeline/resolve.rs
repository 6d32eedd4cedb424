use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use indexmap::IndexMap;

use super::{Next, Outcome, Stage, TransitionPipeline};
use crate::{PipelineError, Request, StageError};

/// Declarative form of a stage chain, flattened once by [`TransitionPipeline::resolve`].
#[derive(Clone)]
pub enum StageDef {
    Function(Arc<dyn Stage>),
    /// Reference to a chain registered under this name.
    Named(String),
    Sequence {
        parallel: bool,
        stages: Vec<StageDef>,
    },
    /// The point at which the stack is mutated.
    Commit,
}

impl std::fmt::Debug for StageDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageDef::Function(stage) => write!(f, "Function({})", stage.name()),
            StageDef::Named(name) => write!(f, "Named({name})"),
            StageDef::Sequence { parallel, stages } => f
                .debug_struct("Sequence")
                .field("parallel", parallel)
                .field("stages", stages)
                .finish(),
            StageDef::Commit => f.write_str("Commit"),
        }
    }
}

impl StageDef {
    pub fn function(stage: impl Stage + 'static) -> Self {
        StageDef::Function(Arc::new(stage))
    }

    pub fn named(name: impl Into<String>) -> Self {
        StageDef::Named(name.into())
    }

    pub fn sequence(stages: impl IntoIterator<Item = StageDef>) -> Self {
        StageDef::Sequence {
            parallel: false,
            stages: stages.into_iter().collect(),
        }
    }

    pub fn parallel(stages: impl IntoIterator<Item = StageDef>) -> Self {
        StageDef::Sequence {
            parallel: true,
            stages: stages.into_iter().collect(),
        }
    }
}

impl From<Arc<dyn Stage>> for StageDef {
    fn from(stage: Arc<dyn Stage>) -> Self {
        StageDef::Function(stage)
    }
}

/// Named stage chains that definitions may refer to.
#[derive(Debug, Clone, Default)]
pub struct StageRegistry {
    chains: IndexMap<String, StageDef>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `def` under `name`, returning the chain it replaced.
    pub fn register(&mut self, name: impl Into<String>, def: StageDef) -> Option<StageDef> {
        self.chains.insert(name.into(), def)
    }

    pub fn get(&self, name: &str) -> Option<&StageDef> {
        self.chains.get(name)
    }
}

enum Item {
    Stage(Arc<dyn Stage>),
    Commit,
}

impl TransitionPipeline {
    /// Flattens `root` against `registry` into approach and rewind stage lists.
    ///
    /// Without a commit marker every stage belongs to the approach phase.
    pub fn resolve(registry: &StageRegistry, root: &StageDef) -> Result<Self, PipelineError> {
        let mut items = Vec::new();
        flatten(root, registry, &mut Vec::new(), &mut items)?;

        let mut approach = Vec::new();
        let mut rewind = Vec::new();
        let mut committed = false;
        for item in items {
            match item {
                Item::Commit if committed => return Err(PipelineError::DuplicateCommit),
                Item::Commit => committed = true,
                Item::Stage(stage) if committed => rewind.push(stage),
                Item::Stage(stage) => approach.push(stage),
            }
        }
        Ok(Self::from_stages(approach, rewind))
    }
}

fn flatten(
    def: &StageDef,
    registry: &StageRegistry,
    visiting: &mut Vec<String>,
    out: &mut Vec<Item>,
) -> Result<(), PipelineError> {
    match def {
        StageDef::Function(stage) => out.push(Item::Stage(Arc::clone(stage))),
        StageDef::Commit => out.push(Item::Commit),
        StageDef::Named(name) => {
            if visiting.contains(name) {
                let mut path = visiting.clone();
                path.push(name.clone());
                return Err(PipelineError::Cycle(path.join(" -> ")));
            }
            let chain = registry
                .get(name)
                .ok_or_else(|| PipelineError::Unknown(name.clone()))?;
            visiting.push(name.clone());
            flatten(chain, registry, visiting, out)?;
            visiting.pop();
        }
        StageDef::Sequence {
            parallel: false,
            stages,
        } => {
            for stage in stages {
                flatten(stage, registry, visiting, out)?;
            }
        }
        StageDef::Sequence {
            parallel: true,
            stages,
        } => {
            let mut members = Vec::with_capacity(stages.len());
            for stage in stages {
                let mut items = Vec::new();
                flatten(stage, registry, visiting, &mut items)?;
                let mut member = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Item::Stage(stage) => member.push(stage),
                        Item::Commit => return Err(PipelineError::CommitInParallel),
                    }
                }
                members.push(member);
            }
            out.push(Item::Stage(Arc::new(ParallelGroup { members })));
        }
    }
    Ok(())
}

/// Members run concurrently, each against its own copy of the request.
struct ParallelGroup {
    members: Vec<Vec<Arc<dyn Stage>>>,
}

#[async_trait]
impl Stage for ParallelGroup {
    fn name(&self) -> &str {
        "parallel"
    }

    async fn run(&self, req: &mut Request, next: Next<'_>) -> Result<Outcome, StageError> {
        let mut copies: Vec<Request> = self.members.iter().map(|_| req.clone()).collect();
        let results = join_all(
            self.members
                .iter()
                .zip(copies.iter_mut())
                .map(|(member, copy)| Next::new(member, 0).run(copy)),
        )
        .await;

        let mut blocked = false;
        let mut redirect = None;
        for (result, copy) in results.into_iter().zip(&copies) {
            match result {
                Ok(Outcome::Continue) => {}
                Ok(Outcome::Blocked) => blocked = true,
                Ok(Outcome::Redirect(target)) => {
                    redirect.get_or_insert(target);
                }
                Err(err) => {
                    req.failed_stage = copy.failed_stage.clone();
                    return Err(err);
                }
            }
        }
        for copy in copies {
            for (key, value) in copy.ambient {
                req.ambient.insert(key, value);
            }
        }
        if blocked {
            return Ok(Outcome::Blocked);
        }
        if let Some(target) = redirect {
            return Ok(Outcome::Redirect(target));
        }
        next.run(req).await
    }
}
