//! Pipeline orchestrator
//!
//! Owns the three queues, the stage workers and the shutdown token. Queues
//! exist from construction, so requests enqueued before `start` wait in the
//! ingress queue. After `stop` the pipeline is terminal.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use super::request::PredictionRequest;
use super::stage::{drain, Outlet, Stage, StageRunner};
use super::stages::{FeatureStage, FetchStage, PredictStage};
use super::state::{score_channel, ScoreReader, ScoreWriter};
use crate::config::ServiceConfig;
use crate::data::{build_data_source, DataSource, SourceError};
use crate::features::{build_features, FeatureTransform};
use crate::metrics::{PipelineMetrics, PipelineMetricsSnapshot, SharedPipelineMetrics, StageMetrics};
use crate::model::{Model, RidgeModel};

/// Default bound on how long `stop` waits for each stage
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("Pipeline is already running")]
    AlreadyStarted,

    #[error("Pipeline has been stopped")]
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    Idle,
    Running,
    Stopped,
}

/// Outcome of a `stop` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StopReport {
    /// Stages that finished within the join timeout
    pub stopped: Vec<&'static str>,
    /// Stages still running when their join timeout expired
    pub unresponsive: Vec<&'static str>,
}

impl StopReport {
    pub fn is_clean(&self) -> bool {
        self.unresponsive.is_empty()
    }
}

/// The collaborators each stage delegates to
#[derive(Clone)]
pub struct Collaborators {
    pub data_source: Arc<dyn DataSource>,
    pub features: Arc<dyn FeatureTransform>,
    pub model: Arc<dyn Model>,
}

impl Collaborators {
    /// Build the configured implementations
    pub fn from_config(config: &ServiceConfig) -> Result<Self, SourceError> {
        Ok(Self {
            data_source: build_data_source(&config.data_source, &config.model.target_column)?,
            features: Arc::new(build_features(&config.features)),
            model: Arc::new(RidgeModel::from_config(&config.model)),
        })
    }
}

/// Everything `start` consumes
struct Pending {
    collaborators: Collaborators,
    ingress: mpsc::UnboundedReceiver<PredictionRequest>,
    scores: ScoreWriter,
}

struct Worker {
    name: &'static str,
    handle: JoinHandle<()>,
}

struct Inner {
    lifecycle: Lifecycle,
    pending: Option<Pending>,
    workers: Vec<Worker>,
}

pub struct Orchestrator {
    inner: Mutex<Inner>,
    ingress: mpsc::UnboundedSender<PredictionRequest>,
    shutdown: CancellationToken,
    scores: ScoreReader,
    metrics: SharedPipelineMetrics,
    join_timeout: Duration,
}

impl Orchestrator {
    pub fn new(collaborators: Collaborators, join_timeout: Duration) -> Self {
        let (ingress_tx, ingress_rx) = mpsc::unbounded_channel();
        let (writer, reader) = score_channel();

        Self {
            inner: Mutex::new(Inner {
                lifecycle: Lifecycle::Idle,
                pending: Some(Pending {
                    collaborators,
                    ingress: ingress_rx,
                    scores: writer,
                }),
                workers: Vec::new(),
            }),
            ingress: ingress_tx,
            shutdown: CancellationToken::new(),
            scores: reader,
            metrics: PipelineMetrics::shared(),
            join_timeout,
        }
    }

    /// Build collaborators and timeouts from a service config
    pub fn from_config(config: &ServiceConfig) -> Result<Self, SourceError> {
        let collaborators = Collaborators::from_config(config)?;
        Ok(Self::new(
            collaborators,
            Duration::from_millis(config.pipeline.join_timeout_ms),
        ))
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn the three stage workers. Must be called inside a Tokio runtime.
    pub fn start(&self) -> Result<(), OrchestratorError> {
        let mut inner = self.lock();
        match inner.lifecycle {
            Lifecycle::Running => return Err(OrchestratorError::AlreadyStarted),
            Lifecycle::Stopped => return Err(OrchestratorError::Stopped),
            Lifecycle::Idle => {}
        }
        let Some(pending) = inner.pending.take() else {
            return Err(OrchestratorError::AlreadyStarted);
        };

        let Pending {
            collaborators,
            ingress,
            scores,
        } = pending;
        let (feature_tx, feature_rx) = mpsc::unbounded_channel();
        let (predict_tx, predict_rx) = mpsc::unbounded_channel();

        inner.workers = vec![
            self.spawn_stage(
                FetchStage::new(collaborators.data_source),
                ingress,
                Outlet::Queue(feature_tx),
                |m| &m.fetch,
            ),
            self.spawn_stage(
                FeatureStage::new(collaborators.features),
                feature_rx,
                Outlet::Queue(predict_tx),
                |m| &m.feature,
            ),
            self.spawn_stage(
                PredictStage::new(collaborators.model, scores),
                predict_rx,
                Outlet::Terminal,
                |m| &m.predict,
            ),
        ];
        inner.lifecycle = Lifecycle::Running;

        info!("Pipeline started");
        Ok(())
    }

    fn spawn_stage<S: Stage>(
        &self,
        stage: S,
        input: mpsc::UnboundedReceiver<S::Input>,
        outlet: Outlet<S::Output>,
        select: fn(&PipelineMetrics) -> &StageMetrics,
    ) -> Worker {
        let name = stage.name();
        let shutdown = self.shutdown.clone();
        let metrics = Arc::clone(&self.metrics);

        let handle = tokio::spawn(
            async move {
                StageRunner {
                    stage,
                    input,
                    outlet,
                    shutdown,
                    metrics: select(&metrics),
                }
                .run()
                .await
            }
            .instrument(info_span!("stage", stage = name)),
        );

        Worker { name, handle }
    }

    /// Submit a request. Never blocks and reports nothing back; a stopped
    /// pipeline logs and counts the rejection.
    pub fn enqueue(&self, request: PredictionRequest) {
        let inner = self.lock();
        if inner.lifecycle == Lifecycle::Stopped {
            drop(inner);
            self.metrics.record_rejected();
            warn!(
                request_id = %request.request_id(),
                "Rejected request: pipeline is stopped"
            );
            return;
        }

        let request_id = request.request_id();
        if self.ingress.send(request).is_err() {
            drop(inner);
            self.metrics.record_rejected();
            warn!(%request_id, "Rejected request: ingress queue is closed");
            return;
        }
        self.metrics.record_enqueued();
        info!(%request_id, "Request enqueued");
    }

    /// Signal shutdown, discard queued work and wait for each stage.
    ///
    /// Each stage gets `join_timeout` to finish the item it holds. Calling
    /// this again returns an empty report.
    pub async fn stop(&self) -> StopReport {
        let (pending, workers) = {
            let mut inner = self.lock();
            if inner.lifecycle == Lifecycle::Stopped {
                return StopReport::default();
            }
            inner.lifecycle = Lifecycle::Stopped;
            (inner.pending.take(), std::mem::take(&mut inner.workers))
        };

        info!("Stopping pipeline");
        self.shutdown.cancel();

        // Never started: nothing else will drain the ingress queue
        if let Some(mut pending) = pending {
            let discarded = drain(&mut pending.ingress);
            if discarded > 0 {
                self.metrics.fetch.record_discarded(discarded);
                info!("Discarded {} request(s) that never started", discarded);
            }
        }

        let mut report = StopReport::default();
        for worker in workers {
            match tokio::time::timeout(self.join_timeout, worker.handle).await {
                Ok(Ok(())) => report.stopped.push(worker.name),
                Ok(Err(e)) => {
                    warn!("Stage '{}' ended abnormally: {}", worker.name, e);
                    report.stopped.push(worker.name);
                }
                Err(_) => {
                    warn!(
                        "Stage '{}' did not stop within {:?}",
                        worker.name, self.join_timeout
                    );
                    report.unresponsive.push(worker.name);
                }
            }
        }

        info!(
            "Pipeline stopped ({} stage(s) joined, {} unresponsive)",
            report.stopped.len(),
            report.unresponsive.len()
        );
        report
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lock().lifecycle
    }

    /// Reader for the predict stage's last score and completion time
    pub fn scores(&self) -> ScoreReader {
        self.scores.clone()
    }

    pub fn metrics(&self) -> PipelineMetricsSnapshot {
        self.metrics.snapshot()
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::source::mock::StaticDataSource;
    use crate::data::{Column, Table};
    use crate::features::FillMissing;

    fn collaborators() -> Collaborators {
        let table = Table::from_columns(vec![
            Column::dense("target", (0..20).map(|i| i as f64 * 2.0)),
            Column::dense("a", (0..20).map(|i| i as f64)),
        ])
        .unwrap();
        Collaborators {
            data_source: Arc::new(StaticDataSource::new(table)),
            features: Arc::new(FillMissing::default()),
            model: Arc::new(RidgeModel {
                target_column: "target".to_string(),
                test_ratio: 0.2,
                seed: 42,
                alpha: 1.0,
            }),
        }
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let orchestrator = Orchestrator::new(collaborators(), DEFAULT_JOIN_TIMEOUT);
        assert_eq!(orchestrator.lifecycle(), Lifecycle::Idle);

        orchestrator.start().unwrap();
        assert_eq!(orchestrator.lifecycle(), Lifecycle::Running);
        assert_eq!(orchestrator.start(), Err(OrchestratorError::AlreadyStarted));

        let report = orchestrator.stop().await;
        assert_eq!(orchestrator.lifecycle(), Lifecycle::Stopped);
        assert_eq!(report.stopped, vec!["fetch", "feature", "predict"]);
        assert!(report.is_clean());

        assert_eq!(orchestrator.start(), Err(OrchestratorError::Stopped));
    }

    #[tokio::test]
    async fn test_stop_without_start_discards_queued_requests() {
        let orchestrator = Orchestrator::new(collaborators(), DEFAULT_JOIN_TIMEOUT);
        orchestrator.enqueue(PredictionRequest::new("a.csv"));
        orchestrator.enqueue(PredictionRequest::new("b.csv"));

        let report = orchestrator.stop().await;
        assert!(report.stopped.is_empty());
        assert!(report.is_clean());

        let metrics = orchestrator.metrics();
        assert_eq!(metrics.enqueued, 2);
        assert_eq!(metrics.fetch.discarded, 2);
    }

    #[tokio::test]
    async fn test_enqueue_after_stop_is_rejected() {
        let orchestrator = Orchestrator::new(collaborators(), DEFAULT_JOIN_TIMEOUT);
        orchestrator.start().unwrap();
        orchestrator.stop().await;

        orchestrator.enqueue(PredictionRequest::new("late.csv"));
        let metrics = orchestrator.metrics();
        assert_eq!(metrics.rejected, 1);
        assert_eq!(metrics.enqueued, 0);
    }

    #[tokio::test]
    async fn test_second_stop_returns_empty_report() {
        let orchestrator = Orchestrator::new(collaborators(), DEFAULT_JOIN_TIMEOUT);
        orchestrator.start().unwrap();

        assert!(!orchestrator.stop().await.stopped.is_empty());
        assert_eq!(orchestrator.stop().await, StopReport::default());
    }

    #[test]
    fn test_lifecycle_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(Lifecycle::Running).unwrap(),
            serde_json::json!("running")
        );
    }

    #[test]
    fn test_collaborators_from_default_config() {
        let collaborators = Collaborators::from_config(&ServiceConfig::default()).unwrap();
        assert_eq!(collaborators.data_source.name(), "csv");
        assert_eq!(collaborators.model.name(), "ridge");
    }
}
