//! The three concrete stages: fetch, feature and predict

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use super::request::{PipelineItem, PredictionRequest};
use super::stage::{Stage, StageError};
use super::state::ScoreWriter;
use crate::data::DataSource;
use crate::features::FeatureTransform;
use crate::model::Model;

/// Pulls the raw table for a request from the data source
pub struct FetchStage {
    source: Arc<dyn DataSource>,
}

impl FetchStage {
    pub fn new(source: Arc<dyn DataSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Stage for FetchStage {
    type Input = PredictionRequest;
    type Output = PipelineItem;

    fn name(&self) -> &'static str {
        "fetch"
    }

    async fn process(&mut self, request: PredictionRequest) -> Result<PipelineItem, StageError> {
        let table = self.source.fetch(&request).await?;
        debug!(
            request_id = %request.request_id(),
            "Fetched {} rows x {} columns from '{}'",
            table.num_rows(),
            table.num_columns(),
            self.source.name()
        );
        Ok(PipelineItem::new(table, request))
    }
}

/// Applies the feature transform off the async runtime
pub struct FeatureStage {
    transform: Arc<dyn FeatureTransform>,
}

impl FeatureStage {
    pub fn new(transform: Arc<dyn FeatureTransform>) -> Self {
        Self { transform }
    }
}

#[async_trait]
impl Stage for FeatureStage {
    type Input = PipelineItem;
    type Output = PipelineItem;

    fn name(&self) -> &'static str {
        "feature"
    }

    async fn process(&mut self, item: PipelineItem) -> Result<PipelineItem, StageError> {
        let transform = Arc::clone(&self.transform);
        let PipelineItem { table, request } = item;

        let table = tokio::task::spawn_blocking(move || transform.transform(table)).await??;
        debug!(
            request_id = %request.request_id(),
            "Features ready: {:?}",
            table.column_names()
        );
        Ok(PipelineItem::new(table, request))
    }
}

/// Fits the model, persists the predictions and publishes the score.
///
/// The score is published only after the predictions file is written, so a
/// reader never sees a score whose predictions are missing on disk.
pub struct PredictStage {
    model: Arc<dyn Model>,
    scores: ScoreWriter,
}

impl PredictStage {
    pub fn new(model: Arc<dyn Model>, scores: ScoreWriter) -> Self {
        Self { model, scores }
    }
}

#[async_trait]
impl Stage for PredictStage {
    type Input = PipelineItem;
    type Output = ();

    fn name(&self) -> &'static str {
        "predict"
    }

    async fn process(&mut self, item: PipelineItem) -> Result<(), StageError> {
        let model = Arc::clone(&self.model);
        let PipelineItem { table, request } = item;
        let destination = request.output_destination().to_string();

        let score = tokio::task::spawn_blocking(move || -> Result<f64, StageError> {
            let output = model.fit_and_score(&table)?;
            let path = PathBuf::from(shellexpand::tilde(&destination).into_owned());
            output
                .predictions
                .to_csv_path(&path)
                .map_err(|source| StageError::Persist {
                    path: destination,
                    source,
                })?;
            Ok(output.score)
        })
        .await??;

        self.scores.publish(score, Utc::now());
        info!(
            request_id = %request.request_id(),
            "Prediction written to {} (score {})",
            request.output_destination(),
            score
        );
        Ok(())
    }
}
