//! Notification generation.
//!
//! Every delivered payment event produces a new notification record; there
//! is no dedup key, so broker redelivery yields duplicate notifications for
//! the same payment. This processor never fails on business grounds — only
//! persistence errors are possible.

use std::sync::Arc;

use tracing::info;

use crate::storage::{
    NewNotification, NotificationRecord, NotificationStatus, NotificationStore, StorageError,
};

/// Errors from notification operations.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Human-readable message for a payment outcome.
fn render_message(order_id: i64, status: &str, amount: f64) -> String {
    match status {
        "approved" => format!(
            "Payment approved for order {} in the amount of {:.2}",
            order_id, amount
        ),
        "rejected" => format!(
            "Payment rejected for order {} in the amount of {:.2}",
            order_id, amount
        ),
        other => format!(
            "Payment status '{}' for order {} in the amount of {:.2}",
            other, order_id, amount
        ),
    }
}

/// Business rules for notification generation and lookup.
pub struct NotificationProcessor {
    notifications: Arc<dyn NotificationStore>,
}

impl NotificationProcessor {
    pub fn new(notifications: Arc<dyn NotificationStore>) -> Self {
        Self { notifications }
    }

    /// Record a notification for a delivered payment event.
    pub async fn process_payment_notification(
        &self,
        payment_id: i64,
        order_id: i64,
        status: &str,
        amount: f64,
    ) -> Result<NotificationRecord, NotificationError> {
        let message = render_message(order_id, status, amount);

        let record = self
            .notifications
            .create(NewNotification {
                payment_id,
                order_id,
                message,
                status: NotificationStatus::Sent,
            })
            .await?;

        info!(
            notification_id = record.id,
            payment_id,
            order_id,
            message = %record.message,
            "Notification recorded"
        );

        Ok(record)
    }

    pub async fn list_notifications(&self) -> Result<Vec<NotificationRecord>, NotificationError> {
        Ok(self.notifications.list().await?)
    }

    pub async fn get_notifications_by_payment_id(
        &self,
        payment_id: i64,
    ) -> Result<Vec<NotificationRecord>, NotificationError> {
        Ok(self.notifications.get_by_payment_id(payment_id).await?)
    }

    pub async fn get_notifications_by_order_id(
        &self,
        order_id: i64,
    ) -> Result<Vec<NotificationRecord>, NotificationError> {
        Ok(self.notifications.get_by_order_id(order_id).await?)
    }
}
