use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::data::Table;

/// One pipeline run, as submitted by a caller.
///
/// Fields are fixed at construction; stages only ever read them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    request_id: Uuid,
    output_destination: String,
    source_path: Option<String>,
    submitted_at: DateTime<Utc>,
}

impl PredictionRequest {
    /// Create a request that writes its predictions to `output_destination`
    pub fn new(output_destination: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            output_destination: output_destination.into(),
            source_path: None,
            submitted_at: Utc::now(),
        }
    }

    /// Create a request with an explicit source path for the data source
    pub fn with_source(
        output_destination: impl Into<String>,
        source_path: impl Into<String>,
    ) -> Self {
        Self {
            source_path: Some(source_path.into()),
            ..Self::new(output_destination)
        }
    }

    /// Identifier used to correlate log lines across stages
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn output_destination(&self) -> &str {
        &self.output_destination
    }

    pub fn source_path(&self) -> Option<&str> {
        self.source_path.as_deref()
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }
}

/// A table travelling between stages together with the request it belongs to
#[derive(Debug, Clone)]
pub struct PipelineItem {
    pub table: Table,
    pub request: PredictionRequest,
}

impl PipelineItem {
    pub fn new(table: Table, request: PredictionRequest) -> Self {
        Self { table, request }
    }
}
