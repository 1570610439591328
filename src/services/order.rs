//! Order placement.
//!
//! Creating an order persists it first, then publishes the order-created
//! event best-effort: a broker failure is logged and the persisted order
//! stands. The event may therefore never reach the payment service; it is
//! never published without the order existing.

use std::sync::Arc;

use tracing::{info, warn};

use crate::bus::EventPublisher;
use crate::events::OrderCreatedEvent;
use crate::storage::{NewOrder, OrderRecord, OrderStore, StorageError};

/// Errors from order operations.
#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Business rules for order placement and lookup.
pub struct OrderService {
    orders: Arc<dyn OrderStore>,
    publisher: Arc<dyn EventPublisher>,
}

impl OrderService {
    pub fn new(orders: Arc<dyn OrderStore>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { orders, publisher }
    }

    /// Validate, persist, and announce a new order.
    pub async fn create_order(
        &self,
        customer: &str,
        product_id: i64,
        quantity: i32,
        price: f64,
    ) -> Result<OrderRecord, OrderError> {
        if customer.is_empty() {
            return Err(OrderError::Validation("customer name is required".to_string()));
        }
        if product_id <= 0 {
            return Err(OrderError::Validation("product id is required".to_string()));
        }
        if quantity <= 0 {
            return Err(OrderError::Validation(
                "quantity must be greater than zero".to_string(),
            ));
        }
        if price <= 0.0 {
            return Err(OrderError::Validation(
                "price must be greater than zero".to_string(),
            ));
        }

        let record = self
            .orders
            .create(NewOrder {
                customer: customer.to_string(),
                product_id,
                quantity,
                price,
            })
            .await?;

        info!(order_id = record.id, customer = %record.customer, "Order created");

        let event = OrderCreatedEvent::from_record(&record);
        match serde_json::to_vec(&event) {
            Ok(body) => {
                if let Err(e) = self.publisher.publish(body).await {
                    warn!(order_id = record.id, error = %e, "Failed to publish order event");
                }
            }
            Err(e) => {
                warn!(order_id = record.id, error = %e, "Failed to serialize order event");
            }
        }

        Ok(record)
    }

    pub async fn get_order(&self, id: i64) -> Result<Option<OrderRecord>, OrderError> {
        if id <= 0 {
            return Err(OrderError::Validation("order id is required".to_string()));
        }
        Ok(self.orders.get(id).await?)
    }

    pub async fn list_orders(&self) -> Result<Vec<OrderRecord>, OrderError> {
        Ok(self.orders.list().await?)
    }
}
