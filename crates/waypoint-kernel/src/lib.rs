//! Transition engine: requests, the staged pipeline, the pop queue and the
//! coordinator that commits stack, platform and mirror together.

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod pipeline;
pub mod pop_queue;
pub mod request;

pub use cache::CacheStage;
pub use config::CoordinatorConfig;
pub use coordinator::{CoordinatorBuilder, MirrorAuthority, Seed, TransitionCoordinator};
pub use error::{NavError, PipelineError, StageError};
pub use pipeline::{FnStage, Next, Outcome, Stage, StageDef, StageRegistry, TransitionPipeline};
pub use pop_queue::{InFlight, Landing, PopDecision, PopQueue};
pub use request::{
    Navigation, Origin, Phase, Request, RequestId, RequestKind, RequestStatus, Target,
    TransitionReport,
};
