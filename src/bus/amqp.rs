//! AMQP (RabbitMQ) broker connectivity.
//!
//! Routing is direct-to-queue on the default exchange; queues are durable
//! and survive broker restart. One connection and one channel per service
//! process: the connection is owned by [`BrokerConnection`], publishers and
//! consumers borrow the channel and never close it themselves.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backon::Retryable;
use futures::StreamExt;
use lapin::message::Delivery;
use lapin::options::{
    BasicAckOptions, BasicCancelOptions, BasicConsumeOptions, BasicNackOptions,
    BasicPublishOptions, BasicQosOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{BusError, DeliveryHandler, EventPublisher, HandlerError, MessagingConfig, Result};
use crate::utils::metrics::PipelineMetrics;
use crate::utils::retry::broker_backoff;

// ============================================================================
// BrokerConnection
// ============================================================================

/// Owns the broker session for a service process.
///
/// Establishes the connection with bounded fixed-delay retries, opens one
/// channel, and declares the durable queues the service touches. The owning
/// service must not start if `connect` fails.
pub struct BrokerConnection {
    connection: Connection,
    channel: Channel,
}

impl BrokerConnection {
    /// Connect to the broker and declare `queues` as durable, non-auto-deleted.
    ///
    /// Declaration is idempotent for identical parameters; a parameter
    /// mismatch against an existing queue surfaces as [`BusError::Topology`].
    pub async fn connect(config: &MessagingConfig, queues: &[&str]) -> Result<Self> {
        let url = config.url();

        info!(
            host = %config.host,
            port = config.port,
            user = %config.username,
            "Connecting to broker"
        );

        let connection = (|| {
            let url = url.clone();
            async move { Connection::connect(&url, ConnectionProperties::default()).await }
        })
            .retry(broker_backoff(
                config.connect_attempts,
                Duration::from_secs(config.connect_delay_secs),
            ))
            .notify(|err: &lapin::Error, delay: Duration| {
                warn!(error = %err, delay = ?delay, "Broker connection failed, retrying");
            })
            .await
            .map_err(|e| {
                BusError::Connection(format!(
                    "broker unreachable after {} attempts: {}",
                    config.connect_attempts, e
                ))
            })?;

        info!("Connected to broker");

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| BusError::Connection(format!("failed to open channel: {}", e)))?;

        for queue in queues {
            channel
                .queue_declare(
                    queue,
                    QueueDeclareOptions {
                        durable: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await
                .map_err(|e| {
                    BusError::Topology(format!("failed to declare queue '{}': {}", queue, e))
                })?;

            info!(queue = %queue, "Declared durable queue");
        }

        Ok(Self {
            connection,
            channel,
        })
    }

    /// The shared channel. Borrowers must not close it.
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Close the session: channel first, then the connection it came from.
    /// The ordering is mandatory in AMQP.
    pub async fn close(&self) -> Result<()> {
        if let Err(e) = self.channel.close(200, "shutdown").await {
            warn!(error = %e, "Failed to close broker channel");
        }
        self.connection
            .close(200, "shutdown")
            .await
            .map_err(|e| BusError::Connection(format!("failed to close connection: {}", e)))?;
        info!("Broker connection closed");
        Ok(())
    }
}

// ============================================================================
// AmqpPublisher
// ============================================================================

/// Publishes durable messages to one queue on the default exchange.
pub struct AmqpPublisher {
    channel: Channel,
    queue: String,
    metrics: Arc<PipelineMetrics>,
}

impl AmqpPublisher {
    pub fn new(
        broker: &BrokerConnection,
        queue: impl Into<String>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            channel: broker.channel().clone(),
            queue: queue.into(),
            metrics,
        }
    }
}

#[async_trait]
impl EventPublisher for AmqpPublisher {
    async fn publish(&self, body: Vec<u8>) -> Result<()> {
        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(2); // persistent

        let confirm = self
            .channel
            .basic_publish(
                "",
                &self.queue,
                BasicPublishOptions::default(),
                &body,
                properties,
            )
            .await
            .map_err(|e| {
                self.metrics.record_publish_failure();
                BusError::Publish(format!("failed to publish to '{}': {}", self.queue, e))
            })?;

        confirm.await.map_err(|e| {
            self.metrics.record_publish_failure();
            BusError::Publish(format!("publish confirmation failed: {}", e))
        })?;

        self.metrics.record_publish();
        debug!(queue = %self.queue, bytes = body.len(), "Published event");
        Ok(())
    }
}

// ============================================================================
// QueueConsumer
// ============================================================================

/// Consumer lifecycle, observable through [`QueueConsumer::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Idle,
    Subscribed,
    Receiving,
    Processing,
    Draining,
    Closed,
}

/// Broker signal resolved from a failed handler outcome.
#[derive(Debug, PartialEq, Eq)]
enum Resolution {
    Requeue,
    Drop,
}

fn resolve(error: &HandlerError) -> Resolution {
    match error {
        HandlerError::Transient(_) => Resolution::Requeue,
        HandlerError::Permanent(_) => Resolution::Drop,
    }
}

/// Subscribes to one queue with a prefetch of exactly one unacknowledged
/// delivery, serializing processing within the consumer instance.
///
/// Cancellation is cooperative: the token is checked only while awaiting the
/// next delivery, never mid-handler. Shutdown therefore always waits for the
/// in-flight delivery to reach its ack/reject before the task ends.
pub struct QueueConsumer {
    channel: Channel,
    queue: String,
    tag: String,
    state_tx: watch::Sender<ConsumerState>,
    state_rx: watch::Receiver<ConsumerState>,
    metrics: Arc<PipelineMetrics>,
}

impl QueueConsumer {
    pub fn new(
        broker: &BrokerConnection,
        queue: impl Into<String>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        let queue = queue.into();
        let tag = format!("{}-consumer-{}", queue, std::process::id());
        let (state_tx, state_rx) = watch::channel(ConsumerState::Idle);
        Self {
            channel: broker.channel().clone(),
            queue,
            tag,
            state_tx,
            state_rx,
            metrics,
        }
    }

    /// Watch the consumer's lifecycle state.
    pub fn state(&self) -> watch::Receiver<ConsumerState> {
        self.state_rx.clone()
    }

    /// Subscribe and process deliveries until `cancel` fires or the broker
    /// closes the stream.
    pub async fn run(
        &self,
        handler: Arc<dyn DeliveryHandler>,
        cancel: CancellationToken,
    ) -> Result<()> {
        self.channel
            .basic_qos(1, BasicQosOptions::default())
            .await
            .map_err(|e| BusError::Subscribe(format!("failed to set prefetch: {}", e)))?;

        let mut consumer = self
            .channel
            .basic_consume(
                &self.queue,
                &self.tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                BusError::Subscribe(format!("failed to subscribe to '{}': {}", self.queue, e))
            })?;

        self.state_tx.send_replace(ConsumerState::Subscribed);
        info!(queue = %self.queue, tag = %self.tag, "Consumer subscribed");

        loop {
            self.state_tx.send_replace(ConsumerState::Receiving);

            let next = tokio::select! {
                _ = cancel.cancelled() => {
                    info!(queue = %self.queue, "Cancellation observed at delivery boundary");
                    break;
                }
                next = consumer.next() => next,
            };

            match next {
                Some(Ok(delivery)) => {
                    self.state_tx.send_replace(ConsumerState::Processing);
                    self.process_delivery(delivery, handler.as_ref()).await;
                }
                Some(Err(e)) => {
                    error!(queue = %self.queue, error = %e, "Delivery stream error");
                    break;
                }
                None => {
                    info!(queue = %self.queue, "Delivery stream closed by broker");
                    break;
                }
            }
        }

        self.state_tx.send_replace(ConsumerState::Draining);
        // Nothing is in flight here: cancellation is only observed between
        // deliveries. Stop the broker-side consumer so no more arrive.
        if let Err(e) = self
            .channel
            .basic_cancel(&self.tag, BasicCancelOptions::default())
            .await
        {
            warn!(queue = %self.queue, error = %e, "Failed to cancel consumer");
        }

        self.state_tx.send_replace(ConsumerState::Closed);
        info!(queue = %self.queue, "Consumer drained");
        Ok(())
    }

    async fn process_delivery(&self, delivery: Delivery, handler: &dyn DeliveryHandler) {
        self.metrics.record_delivery();

        let reason = match handler.handle(&delivery.data).await {
            Ok(()) => {
                if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                    warn!(queue = %self.queue, error = %e, "Failed to ack delivery");
                    return;
                }
                self.metrics.record_ack();
                debug!(queue = %self.queue, "Delivery acknowledged");
                return;
            }
            Err(reason) => reason,
        };

        match resolve(&reason) {
            Resolution::Requeue => {
                warn!(queue = %self.queue, error = %reason, "Transient failure, requeueing");
                if let Err(e) = delivery
                    .nack(BasicNackOptions {
                        requeue: true,
                        ..Default::default()
                    })
                    .await
                {
                    warn!(queue = %self.queue, error = %e, "Failed to nack delivery");
                    return;
                }
                self.metrics.record_requeue();
            }
            Resolution::Drop => {
                error!(queue = %self.queue, error = %reason, "Permanent failure, dropping");
                if let Err(e) = delivery
                    .nack(BasicNackOptions {
                        requeue: false,
                        ..Default::default()
                    })
                    .await
                {
                    warn!(queue = %self.queue, error = %e, "Failed to reject delivery");
                    return;
                }
                self.metrics.record_drop();
            }
        }
    }
}


/// Integration tests requiring a running RabbitMQ instance.
///
/// Run with: AMQP_HOST=localhost cargo test amqp_integration -- --ignored
#[cfg(test)]
mod amqp_integration {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::mpsc;
    use uuid::Uuid;

    use super::*;

    fn broker_config() -> MessagingConfig {
        MessagingConfig {
            host: std::env::var("AMQP_HOST").unwrap_or_else(|_| "localhost".to_string()),
            connect_attempts: 2,
            connect_delay_secs: 1,
            ..Default::default()
        }
    }

    /// Handler that records every body it sees and answers from a script.
    struct ScriptedHandler {
        calls: AtomicUsize,
        fail_first: Option<HandlerError>,
        tx: mpsc::Sender<Vec<u8>>,
    }

    #[async_trait]
    impl DeliveryHandler for ScriptedHandler {
        async fn handle(&self, body: &[u8]) -> std::result::Result<(), HandlerError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let _ = self.tx.send(body.to_vec()).await;
            match (&self.fail_first, call) {
                (Some(HandlerError::Transient(msg)), 0) => {
                    Err(HandlerError::Transient(msg.clone()))
                }
                (Some(HandlerError::Permanent(msg)), _) => {
                    Err(HandlerError::Permanent(msg.clone()))
                }
                _ => Ok(()),
            }
        }
    }

    #[tokio::test]
    #[ignore = "Requires RabbitMQ"]
    async fn test_publish_and_consume() {
        let queue = format!("it-roundtrip-{}", Uuid::new_v4());
        let broker = BrokerConnection::connect(&broker_config(), &[&queue])
            .await
            .expect("connect");

        let metrics = Arc::new(PipelineMetrics::default());
        let publisher = AmqpPublisher::new(&broker, &queue, metrics.clone());
        publisher.publish(b"{\"ping\":1}".to_vec()).await.expect("publish");

        let (tx, mut rx) = mpsc::channel(8);
        let consumer = QueueConsumer::new(&broker, &queue, metrics.clone());
        let mut state = consumer.state();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            consumer
                .run(
                    Arc::new(ScriptedHandler {
                        calls: AtomicUsize::new(0),
                        fail_first: None,
                        tx,
                    }),
                    token,
                )
                .await
        });

        let body = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out")
            .expect("channel closed");
        assert_eq!(body, b"{\"ping\":1}");

        cancel.cancel();
        task.await.expect("join").expect("consumer");
        assert_eq!(*state.borrow_and_update(), ConsumerState::Closed);
        assert_eq!(metrics.snapshot().acked, 1);

        broker.close().await.expect("close");
    }

    #[tokio::test]
    #[ignore = "Requires RabbitMQ"]
    async fn test_transient_failure_is_redelivered() {
        let queue = format!("it-requeue-{}", Uuid::new_v4());
        let broker = BrokerConnection::connect(&broker_config(), &[&queue])
            .await
            .expect("connect");

        let metrics = Arc::new(PipelineMetrics::default());
        let publisher = AmqpPublisher::new(&broker, &queue, metrics.clone());
        publisher.publish(b"retry-me".to_vec()).await.expect("publish");

        let (tx, mut rx) = mpsc::channel(8);
        let consumer = QueueConsumer::new(&broker, &queue, metrics.clone());
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            consumer
                .run(
                    Arc::new(ScriptedHandler {
                        calls: AtomicUsize::new(0),
                        fail_first: Some(HandlerError::Transient("flaky".to_string())),
                        tx,
                    }),
                    token,
                )
                .await
        });

        // First delivery fails transiently, the broker redelivers.
        for _ in 0..2 {
            let body = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out")
                .expect("channel closed");
            assert_eq!(body, b"retry-me");
        }

        cancel.cancel();
        task.await.expect("join").expect("consumer");
        assert_eq!(metrics.snapshot().requeued, 1);
        assert_eq!(metrics.snapshot().acked, 1);

        broker.close().await.expect("close");
    }

    #[tokio::test]
    #[ignore = "Requires RabbitMQ"]
    async fn test_permanent_failure_is_not_redelivered() {
        let queue = format!("it-drop-{}", Uuid::new_v4());
        let broker = BrokerConnection::connect(&broker_config(), &[&queue])
            .await
            .expect("connect");

        let metrics = Arc::new(PipelineMetrics::default());
        let publisher = AmqpPublisher::new(&broker, &queue, metrics.clone());
        publisher.publish(b"not json".to_vec()).await.expect("publish");

        let (tx, mut rx) = mpsc::channel(8);
        let consumer = QueueConsumer::new(&broker, &queue, metrics.clone());
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            consumer
                .run(
                    Arc::new(ScriptedHandler {
                        calls: AtomicUsize::new(0),
                        fail_first: Some(HandlerError::Permanent("malformed".to_string())),
                        tx,
                    }),
                    token,
                )
                .await
        });

        let body = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out")
            .expect("channel closed");
        assert_eq!(body, b"not json");

        // No redelivery within the window.
        let second = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await;
        assert!(second.is_err());

        cancel.cancel();
        task.await.expect("join").expect("consumer");
        assert_eq!(metrics.snapshot().dropped, 1);

        broker.close().await.expect("close");
    }

    #[tokio::test]
    #[ignore = "Requires RabbitMQ"]
    async fn test_queue_parameter_mismatch_is_topology_error() {
        let config = broker_config();
        let queue = format!("it-mismatch-{}", Uuid::new_v4());

        // Pre-declare the queue non-durable, outside BrokerConnection.
        let raw = Connection::connect(&config.url(), ConnectionProperties::default())
            .await
            .expect("raw connect");
        let channel = raw.create_channel().await.expect("raw channel");
        channel
            .queue_declare(
                &queue,
                QueueDeclareOptions {
                    durable: false,
                    auto_delete: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .expect("raw declare");

        let result = BrokerConnection::connect(&config, &[&queue]).await;
        assert!(matches!(result, Err(BusError::Topology(_))));

        let _ = raw.close(200, "test done").await;
    }
}
