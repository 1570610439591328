//! Per-service pipeline supervision.
//!
//! One supervisor per service process owns the broker session and the
//! consumer task. Shutdown ordering is mandatory: signal cancellation, wait
//! for the consumer to drain its in-flight delivery, close the channel, then
//! close the connection.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bus::{
    self, BrokerConnection, ConsumerState, DeliveryHandler, QueueConsumer,
};
use crate::utils::metrics::PipelineMetrics;

/// Wires a service's broker resources and coordinates their shutdown.
pub struct PipelineSupervisor {
    broker: BrokerConnection,
    cancel: CancellationToken,
    consumer_task: Option<JoinHandle<bus::Result<()>>>,
    consumer_state: Option<watch::Receiver<ConsumerState>>,
}

impl PipelineSupervisor {
    pub fn new(broker: BrokerConnection) -> Self {
        Self {
            broker,
            cancel: CancellationToken::new(),
            consumer_task: None,
            consumer_state: None,
        }
    }

    /// The owned broker session, for building publishers.
    pub fn broker(&self) -> &BrokerConnection {
        &self.broker
    }

    /// Spawn the receive loop for `queue`, bound to `handler`.
    pub fn start_consumer(
        &mut self,
        queue: &str,
        handler: Arc<dyn DeliveryHandler>,
        metrics: Arc<PipelineMetrics>,
    ) {
        let consumer = QueueConsumer::new(&self.broker, queue, metrics);
        self.consumer_state = Some(consumer.state());
        let token = self.cancel.child_token();
        self.consumer_task = Some(tokio::spawn(async move {
            consumer.run(handler, token).await
        }));
    }

    /// Watch the consumer's lifecycle state, if a consumer was started.
    pub fn consumer_state(&self) -> Option<watch::Receiver<ConsumerState>> {
        self.consumer_state.clone()
    }

    /// Signal cancellation, drain the consumer, then close the session.
    pub async fn shutdown(mut self) -> bus::Result<()> {
        info!("Shutting down pipeline");
        self.cancel.cancel();

        if let Some(task) = self.consumer_task.take() {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Consumer ended with error"),
                Err(e) => warn!(error = %e, "Consumer task failed"),
            }
        }

        self.broker.close().await
    }

    /// Block until Ctrl+C, then run the ordered shutdown.
    pub async fn run_until_shutdown(self) -> Result<(), Box<dyn std::error::Error>> {
        tokio::signal::ctrl_c().await?;
        info!("Shutdown signal received");
        self.shutdown().await?;
        Ok(())
    }
}
