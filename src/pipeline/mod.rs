//! Fetch → feature → predict pipeline
//!
//! Requests enter through [`Orchestrator::enqueue`] and flow through three
//! stage workers connected by unbounded queues. The predict stage publishes
//! its score through a watch channel read via [`ScoreReader`].

pub mod orchestrator;
pub mod request;
pub mod stage;
pub mod stages;
pub mod state;

pub use orchestrator::{
    Collaborators, Lifecycle, Orchestrator, OrchestratorError, StopReport, DEFAULT_JOIN_TIMEOUT,
};
pub use request::{PipelineItem, PredictionRequest};
pub use stage::{Outlet, Stage, StageError, StageRunner};
pub use stages::{FeatureStage, FetchStage, PredictStage};
pub use state::{score_channel, ScoreReader, ScoreSnapshot, ScoreWriter};
