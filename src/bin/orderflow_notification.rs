//! orderflow-notification: notification delivery service
//!
//! Consumes payment-processed events from the `payments` queue one at a
//! time and records a notification per delivery.

use std::sync::Arc;

use tracing::{error, info};

use orderflow::bus::{BrokerConnection, PAYMENTS_QUEUE};
use orderflow::config::Config;
use orderflow::handlers::PaymentProcessedHandler;
use orderflow::pipeline::PipelineSupervisor;
use orderflow::services::NotificationProcessor;
use orderflow::storage::init_storage;
use orderflow::utils::bootstrap::{init_tracing, parse_config_path};
use orderflow::utils::metrics::PipelineMetrics;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = Config::load(parse_config_path().as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!("Starting orderflow-notification service");

    let stores = init_storage(&config.storage).await?;
    let metrics = Arc::new(PipelineMetrics::new());

    // Connection failure after the bounded retries aborts startup.
    let broker = BrokerConnection::connect(&config.messaging, &[PAYMENTS_QUEUE]).await?;

    let processor = Arc::new(NotificationProcessor::new(stores.notifications));
    let handler = Arc::new(PaymentProcessedHandler::new(processor));

    let mut supervisor = PipelineSupervisor::new(broker);
    supervisor.start_consumer(PAYMENTS_QUEUE, handler, metrics);

    info!("Notification service running, press Ctrl+C to exit");
    supervisor.run_until_shutdown().await?;

    Ok(())
}
