//! Handler for the `payments` queue: records a notification per payment event.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::bus::{DeliveryHandler, HandlerError};
use crate::events::PaymentProcessedEvent;
use crate::services::{NotificationError, NotificationProcessor};

pub struct PaymentProcessedHandler {
    processor: Arc<NotificationProcessor>,
}

impl PaymentProcessedHandler {
    pub fn new(processor: Arc<NotificationProcessor>) -> Self {
        Self { processor }
    }
}

#[async_trait]
impl DeliveryHandler for PaymentProcessedHandler {
    async fn handle(&self, body: &[u8]) -> Result<(), HandlerError> {
        let event: PaymentProcessedEvent = serde_json::from_slice(body)
            .map_err(|e| HandlerError::Permanent(format!("malformed payment event: {}", e)))?;

        debug!(
            payment_id = event.payment_id,
            order_id = event.order_id,
            status = %event.status,
            "Processing payment notification"
        );

        match self
            .processor
            .process_payment_notification(
                event.payment_id,
                event.order_id,
                &event.status,
                event.amount,
            )
            .await
        {
            Ok(record) => {
                info!(
                    notification_id = record.id,
                    payment_id = event.payment_id,
                    "Payment event handled"
                );
                Ok(())
            }
            Err(e @ NotificationError::Storage(_)) => Err(HandlerError::Transient(e.to_string())),
        }
    }
}
