//! Handler for the `orders` queue: settles a payment per order-created event.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::bus::{DeliveryHandler, HandlerError};
use crate::events::{OrderCreatedEvent, ORDER_CREATED};
use crate::services::{PaymentError, PaymentProcessor};

pub struct OrderCreatedHandler {
    processor: Arc<PaymentProcessor>,
}

impl OrderCreatedHandler {
    pub fn new(processor: Arc<PaymentProcessor>) -> Self {
        Self { processor }
    }
}

#[async_trait]
impl DeliveryHandler for OrderCreatedHandler {
    async fn handle(&self, body: &[u8]) -> Result<(), HandlerError> {
        let event: OrderCreatedEvent = serde_json::from_slice(body)
            .map_err(|e| HandlerError::Permanent(format!("malformed order event: {}", e)))?;

        if event.event_type != ORDER_CREATED {
            debug!(event_type = %event.event_type, "Ignoring unrelated event type");
            return Ok(());
        }

        let amount = event.price * f64::from(event.quantity);
        debug!(order_id = event.id, amount, "Processing payment for order");

        match self.processor.process_payment(event.id, amount).await {
            Ok(payment) => {
                info!(
                    order_id = event.id,
                    payment_id = payment.id,
                    status = %payment.status,
                    "Order event handled"
                );
                Ok(())
            }
            Err(e @ PaymentError::Validation(_)) => Err(HandlerError::Permanent(e.to_string())),
            Err(e @ PaymentError::Storage(_)) => Err(HandlerError::Transient(e.to_string())),
        }
    }
}
