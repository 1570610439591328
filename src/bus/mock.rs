//! In-memory publisher implementations for tests and broker-less runs.

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::{BusError, EventPublisher, Result};

/// Publisher that records every body it accepts. Test double.
#[derive(Default)]
pub struct RecordingPublisher {
    published: RwLock<Vec<Vec<u8>>>,
    fail_on_publish: RwLock<bool>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_publish(&self, fail: bool) {
        *self.fail_on_publish.write().await = fail;
    }

    pub async fn published_count(&self) -> usize {
        self.published.read().await.len()
    }

    pub async fn take_published(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *self.published.write().await)
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, body: Vec<u8>) -> Result<()> {
        if *self.fail_on_publish.read().await {
            return Err(BusError::Publish("recording publisher set to fail".to_string()));
        }
        self.published.write().await.push(body);
        Ok(())
    }
}

/// Publisher that accepts and discards everything.
///
/// Selected by `messaging.publisher = noop` so a service can run without a
/// reachable broker.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPublisher;

#[async_trait]
impl EventPublisher for NoopPublisher {
    async fn publish(&self, body: Vec<u8>) -> Result<()> {
        debug!(bytes = body.len(), "Publisher disabled, discarding event");
        Ok(())
    }
}
