//! orderflow-order: order placement service
//!
//! Persists orders and publishes order-created events to the durable
//! `orders` queue. The request surface (CreateOrder, ListOrders) is hosted
//! by the surrounding RPC layer and drives [`OrderService`]; this binary
//! owns startup and the ordered shutdown of the broker session.

use std::sync::Arc;

use tracing::{error, info};

use orderflow::bus::{
    AmqpPublisher, BrokerConnection, NoopPublisher, PublisherMode, ORDERS_QUEUE,
};
use orderflow::config::Config;
use orderflow::pipeline::PipelineSupervisor;
use orderflow::services::OrderService;
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

    info!("Starting orderflow-order service");

    let stores = init_storage(&config.storage).await?;
    let metrics = Arc::new(PipelineMetrics::new());

    match config.messaging.publisher {
        PublisherMode::Amqp => {
            // Connection failure after the bounded retries aborts startup.
            let broker = BrokerConnection::connect(&config.messaging, &[ORDERS_QUEUE]).await?;
            let publisher = Arc::new(AmqpPublisher::new(&broker, ORDERS_QUEUE, metrics));
            let _service = OrderService::new(stores.orders, publisher);

            let supervisor = PipelineSupervisor::new(broker);
            info!("Order service running, press Ctrl+C to exit");
            supervisor.run_until_shutdown().await?;
        }
        PublisherMode::Noop => {
            let _service = OrderService::new(stores.orders, Arc::new(NoopPublisher));
            info!("Order service running without broker, press Ctrl+C to exit");
            tokio::signal::ctrl_c().await?;
        }
    }

    Ok(())
}
