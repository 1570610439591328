//! orderflow-payment: payment settlement service
//!
//! Consumes order-created events from the `orders` queue one at a time,
//! settles each payment idempotently, and publishes payment-processed
//! events to the `payments` queue.

use std::sync::Arc;

use tracing::{error, info};

use orderflow::bus::{init_publisher, BrokerConnection, ORDERS_QUEUE, PAYMENTS_QUEUE};
use orderflow::config::Config;
use orderflow::handlers::OrderCreatedHandler;
use orderflow::pipeline::PipelineSupervisor;
use orderflow::services::{PaymentProcessor, RandomDecider};
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

    info!("Starting orderflow-payment service");

    let stores = init_storage(&config.storage).await?;
    let metrics = Arc::new(PipelineMetrics::new());

    // Connection failure after the bounded retries aborts startup.
    let broker =
        BrokerConnection::connect(&config.messaging, &[ORDERS_QUEUE, PAYMENTS_QUEUE]).await?;

    let publisher = init_publisher(
        &broker,
        PAYMENTS_QUEUE,
        config.messaging.publisher,
        metrics.clone(),
    );
    let processor = Arc::new(PaymentProcessor::new(
        stores.payments,
        publisher,
        Arc::new(RandomDecider::default()),
    ));
    let handler = Arc::new(OrderCreatedHandler::new(processor));

    let mut supervisor = PipelineSupervisor::new(broker);
    supervisor.start_consumer(ORDERS_QUEUE, handler, metrics);

    info!("Payment service running, press Ctrl+C to exit");
    supervisor.run_until_shutdown().await?;

    Ok(())
}
