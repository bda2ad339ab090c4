//! Pipeline counters
//!
//! Counters are plain atomics updated by the orchestrator and stage workers
//! and read by the HTTP status endpoint. The handle is constructed by the
//! orchestrator and passed to every stage explicitly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

/// Shared metrics handle
pub type SharedPipelineMetrics = Arc<PipelineMetrics>;

/// Counters for one stage worker
#[derive(Debug, Default)]
pub struct StageMetrics {
    received: AtomicU64,
    forwarded: AtomicU64,
    failed: AtomicU64,
    discarded: AtomicU64,
}

impl StageMetrics {
    /// An item was taken off the input queue
    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    /// An item was handed downstream (or completed, for the terminal stage)
    pub fn record_forwarded(&self) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    /// The transformation failed and the item was dropped
    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Items dropped because of shutdown
    pub fn record_discarded(&self, count: u64) {
        self.discarded.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StageMetricsSnapshot {
        StageMetricsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}

/// Counters for the whole pipeline
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    enqueued: AtomicU64,
    rejected: AtomicU64,
    pub fetch: StageMetrics,
    pub feature: StageMetrics,
    pub predict: StageMetrics,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedPipelineMetrics {
        Arc::new(Self::new())
    }

    /// A request entered the ingress queue
    pub fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    /// A request was refused because the pipeline is stopped
    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PipelineMetricsSnapshot {
        PipelineMetricsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            fetch: self.fetch.snapshot(),
            feature: self.feature.snapshot(),
            predict: self.predict.snapshot(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageMetricsSnapshot {
    pub received: u64,
    pub forwarded: u64,
    pub failed: u64,
    pub discarded: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineMetricsSnapshot {
    pub enqueued: u64,
    pub rejected: u64,
    pub fetch: StageMetricsSnapshot,
    pub feature: StageMetricsSnapshot,
    pub predict: StageMetricsSnapshot,
}

impl PipelineMetricsSnapshot {
    /// Requests that reached the end of the predict stage
    pub fn completed(&self) -> u64 {
        self.predict.forwarded
    }
}
