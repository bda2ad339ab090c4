//! Stage worker contract
//!
//! A stage takes one item at a time from its input queue, applies a single
//! transformation and hands the result to the next queue. The wait for input
//! races against the shutdown token, so an idle stage notices shutdown
//! immediately. A transformation that has already started is never
//! interrupted; a failure or panic inside it only drops the item at hand.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures::FutureExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::data::SourceError;
use crate::data::TableError;
use crate::features::FeatureError;
use crate::metrics::StageMetrics;
use crate::model::ModelError;

/// Per-item failures. Each one drops its item and nothing else.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("Data source error: {0}")]
    Source(#[from] SourceError),

    #[error("Feature error: {0}")]
    Feature(#[from] FeatureError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Failed to persist predictions to {path}: {source}")]
    Persist {
        path: String,
        #[source]
        source: TableError,
    },

    #[error("Worker task failed: {0}")]
    Worker(String),
}

/// Text of a caught panic payload
fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    };
    format!("stage panicked: {}", detail)
}

impl From<tokio::task::JoinError> for StageError {
    fn from(e: tokio::task::JoinError) -> Self {
        StageError::Worker(e.to_string())
    }
}

#[async_trait]
pub trait Stage: Send + 'static {
    type Input: Send + 'static;
    type Output: Send + 'static;

    /// Stable name used in logs and metrics
    fn name(&self) -> &'static str;

    /// Transform one item
    async fn process(&mut self, input: Self::Input) -> Result<Self::Output, StageError>;
}

/// Where a stage's results go
#[derive(Debug)]
pub enum Outlet<T> {
    /// Hand results to the next stage
    Queue(mpsc::UnboundedSender<T>),
    /// Terminal stage; results are side effects already performed
    Terminal,
}

/// Everything a stage worker needs besides the stage itself
pub struct StageRunner<'m, S: Stage> {
    pub stage: S,
    pub input: mpsc::UnboundedReceiver<S::Input>,
    pub outlet: Outlet<S::Output>,
    pub shutdown: CancellationToken,
    pub metrics: &'m StageMetrics,
}

impl<S: Stage> StageRunner<'_, S> {
    /// Run until shutdown is signalled or the input queue closes, then drain
    /// whatever is still queued.
    pub async fn run(mut self) {
        let name = self.stage.name();
        info!("Stage '{}' started", name);

        loop {
            let item = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    debug!("Stage '{}' observed shutdown", name);
                    break;
                }
                item = self.input.recv() => match item {
                    Some(item) => item,
                    None => {
                        debug!("Stage '{}' input closed", name);
                        break;
                    }
                },
            };

            self.metrics.record_received();
            let outcome = AssertUnwindSafe(self.stage.process(item))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(StageError::Worker(panic_message(panic.as_ref()))));
            match outcome {
                Ok(output) => self.forward(output),
                Err(e) => {
                    self.metrics.record_failed();
                    warn!("Stage '{}' dropped an item: {}", name, e);
                }
            }
        }

        let discarded = drain(&mut self.input);
        if discarded > 0 {
            self.metrics.record_discarded(discarded);
            info!(
                "Stage '{}' discarded {} queued item(s) on shutdown",
                name, discarded
            );
        }
        info!("Stage '{}' stopped", name);
    }

    fn forward(&self, output: S::Output) {
        match &self.outlet {
            Outlet::Queue(tx) => {
                if tx.send(output).is_err() {
                    // Downstream already drained and closed its queue
                    self.metrics.record_discarded(1);
                    debug!(
                        "Stage '{}' discarded a result: downstream is closed",
                        self.stage.name()
                    );
                } else {
                    self.metrics.record_forwarded();
                }
            }
            Outlet::Terminal => self.metrics.record_forwarded(),
        }
    }
}

/// Close a queue and drop everything still in it. Returns the number of
/// items dropped.
pub fn drain<T>(input: &mut mpsc::UnboundedReceiver<T>) -> u64 {
    input.close();
    let mut count = 0;
    while input.try_recv().is_ok() {
        count += 1;
    }
    count
}
