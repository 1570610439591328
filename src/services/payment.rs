//! Payment settlement.
//!
//! Order events are delivered at least once, so settlement is idempotent on
//! the order id: a redelivered event returns the existing record without new
//! side effects. The settlement outcome itself comes from an injected
//! decision strategy so tests stay deterministic.

use std::sync::Arc;

use rand::Rng;
use tracing::{info, warn};

use crate::bus::EventPublisher;
use crate::events::PaymentProcessedEvent;
use crate::storage::{NewPayment, PaymentRecord, PaymentStatus, PaymentStore, StorageError};

/// Errors from payment operations.
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Decides the settlement outcome for a payment amount.
pub trait PaymentDecider: Send + Sync {
    fn decide(&self, amount: f64) -> PaymentStatus;
}

/// Approves a configurable fraction of payments at random.
pub struct RandomDecider {
    approve_ratio: f64,
}

impl RandomDecider {
    pub fn new(approve_ratio: f64) -> Self {
        Self { approve_ratio }
    }
}

impl Default for RandomDecider {
    fn default() -> Self {
        Self { approve_ratio: 0.9 }
    }
}

impl PaymentDecider for RandomDecider {
    fn decide(&self, _amount: f64) -> PaymentStatus {
        if rand::rng().random::<f64>() < self.approve_ratio {
            PaymentStatus::Approved
        } else {
            PaymentStatus::Failed
        }
    }
}

/// Always returns the same outcome. Test double.
pub struct FixedDecider(pub PaymentStatus);

impl PaymentDecider for FixedDecider {
    fn decide(&self, _amount: f64) -> PaymentStatus {
        self.0
    }
}

/// Business rules for payment settlement and lookup.
pub struct PaymentProcessor {
    payments: Arc<dyn PaymentStore>,
    publisher: Arc<dyn EventPublisher>,
    decider: Arc<dyn PaymentDecider>,
}

impl PaymentProcessor {
    pub fn new(
        payments: Arc<dyn PaymentStore>,
        publisher: Arc<dyn EventPublisher>,
        decider: Arc<dyn PaymentDecider>,
    ) -> Self {
        Self {
            payments,
            publisher,
            decider,
        }
    }

    /// Settle the payment for an order.
    ///
    /// Returns the existing record unchanged when the order is already
    /// settled; publishing the downstream event happens only on first
    /// settlement and is best-effort.
    pub async fn process_payment(
        &self,
        order_id: i64,
        amount: f64,
    ) -> Result<PaymentRecord, PaymentError> {
        if order_id <= 0 {
            return Err(PaymentError::Validation("order id is required".to_string()));
        }
        if amount <= 0.0 {
            return Err(PaymentError::Validation(
                "amount must be greater than zero".to_string(),
            ));
        }

        if let Some(existing) = self.payments.get_by_order_id(order_id).await? {
            info!(
                order_id,
                payment_id = existing.id,
                status = %existing.status,
                "Payment already settled, returning existing record"
            );
            return Ok(existing);
        }

        let status = self.decider.decide(amount);
        let record = self
            .payments
            .create(NewPayment {
                order_id,
                status,
                amount,
            })
            .await?;

        info!(
            order_id,
            payment_id = record.id,
            status = %record.status,
            amount,
            "Payment settled"
        );

        let event = PaymentProcessedEvent::from_record(&record);
        match serde_json::to_vec(&event) {
            Ok(body) => {
                if let Err(e) = self.publisher.publish(body).await {
                    warn!(
                        payment_id = record.id,
                        error = %e,
                        "Failed to publish payment event"
                    );
                }
            }
            Err(e) => {
                warn!(payment_id = record.id, error = %e, "Failed to serialize payment event");
            }
        }

        Ok(record)
    }

    pub async fn get_payment_by_order_id(
        &self,
        order_id: i64,
    ) -> Result<Option<PaymentRecord>, PaymentError> {
        if order_id <= 0 {
            return Err(PaymentError::Validation("order id is required".to_string()));
        }
        Ok(self.payments.get_by_order_id(order_id).await?)
    }

    pub async fn list_payments(&self) -> Result<Vec<PaymentRecord>, PaymentError> {
        Ok(self.payments.list().await?)
    }
}
