use std::sync::Arc;

use crate::pipeline::{Orchestrator, PredictionRequest, ScoreReader};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    /// Destination for requests submitted over HTTP
    pub output_path: Arc<str>,
    scores: ScoreReader,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, output_path: impl Into<String>) -> Self {
        let scores = orchestrator.scores();
        Self {
            orchestrator,
            output_path: Arc::from(output_path.into()),
            scores,
        }
    }

    /// Build a request for the configured output destination
    pub fn new_request(&self) -> PredictionRequest {
        PredictionRequest::new(self.output_path.to_string())
    }

    pub fn scores(&self) -> &ScoreReader {
        &self.scores
    }
}
