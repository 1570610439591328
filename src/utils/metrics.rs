//! Pipeline counters.
//!
//! One collector per service process, passed explicitly into publisher and
//! consumer constructors. There is no process-wide registry; components
//! that are not handed a collector record nothing.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one service's pipeline activity.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    deliveries: AtomicU64,
    acked: AtomicU64,
    requeued: AtomicU64,
    dropped: AtomicU64,
    published: AtomicU64,
    publish_failures: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub deliveries: u64,
    pub acked: u64,
    pub requeued: u64,
    pub dropped: u64,
    pub published: u64,
    pub publish_failures: u64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_delivery(&self) {
        self.deliveries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ack(&self) {
        self.acked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_requeue(&self) {
        self.requeued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish_failure(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            deliveries: self.deliveries.load(Ordering::Relaxed),
            acked: self.acked.load(Ordering::Relaxed),
            requeued: self.requeued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
        }
    }
}
