//! In-memory repository implementations.
//!
//! Used by tests and by the `memory` storage mode. Failure toggles let
//! tests simulate persistence outages to exercise requeue classification.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{
    NewNotification, NewOrder, NewPayment, NotificationRecord, NotificationStore, OrderRecord,
    OrderStore, PaymentRecord, PaymentStore, Result, StorageError,
};

fn unavailable() -> StorageError {
    StorageError::Unavailable("simulated outage".to_string())
}

/// In-memory OrderStore.
#[derive(Default)]
pub struct MockOrderStore {
    orders: RwLock<Vec<OrderRecord>>,
    next_id: AtomicI64,
    fail_on_create: RwLock<bool>,
}

impl MockOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_create(&self, fail: bool) {
        *self.fail_on_create.write().await = fail;
    }
}

#[async_trait]
impl OrderStore for MockOrderStore {
    async fn create(&self, order: NewOrder) -> Result<OrderRecord> {
        if *self.fail_on_create.read().await {
            return Err(unavailable());
        }
        let record = OrderRecord {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            customer: order.customer,
            product_id: order.product_id,
            quantity: order.quantity,
            price: order.price,
            created_at: Utc::now(),
        };
        self.orders.write().await.push(record.clone());
        Ok(record)
    }

    async fn get(&self, id: i64) -> Result<Option<OrderRecord>> {
        Ok(self.orders.read().await.iter().find(|o| o.id == id).cloned())
    }

    async fn list(&self) -> Result<Vec<OrderRecord>> {
        Ok(self.orders.read().await.clone())
    }
}

/// In-memory PaymentStore. Enforces the unique order_id constraint the
/// Postgres schema carries.
#[derive(Default)]
pub struct MockPaymentStore {
    payments: RwLock<Vec<PaymentRecord>>,
    next_id: AtomicI64,
    fail_on_create: RwLock<bool>,
    fail_on_get: RwLock<bool>,
}

impl MockPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_create(&self, fail: bool) {
        *self.fail_on_create.write().await = fail;
    }

    pub async fn set_fail_on_get(&self, fail: bool) {
        *self.fail_on_get.write().await = fail;
    }
}

#[async_trait]
impl PaymentStore for MockPaymentStore {
    async fn create(&self, payment: NewPayment) -> Result<PaymentRecord> {
        if *self.fail_on_create.read().await {
            return Err(unavailable());
        }
        let mut payments = self.payments.write().await;
        if payments.iter().any(|p| p.order_id == payment.order_id) {
            return Err(StorageError::Unavailable(format!(
                "unique constraint violated: payment for order {} exists",
                payment.order_id
            )));
        }
        let record = PaymentRecord {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            order_id: payment.order_id,
            status: payment.status,
            amount: payment.amount,
            created_at: Utc::now(),
        };
        payments.push(record.clone());
        Ok(record)
    }

    async fn get_by_order_id(&self, order_id: i64) -> Result<Option<PaymentRecord>> {
        if *self.fail_on_get.read().await {
            return Err(unavailable());
        }
        Ok(self
            .payments
            .read()
            .await
            .iter()
            .find(|p| p.order_id == order_id)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<PaymentRecord>> {
        Ok(self.payments.read().await.clone())
    }
}

/// In-memory NotificationStore.
#[derive(Default)]
pub struct MockNotificationStore {
    notifications: RwLock<Vec<NotificationRecord>>,
    next_id: AtomicI64,
    fail_on_create: RwLock<bool>,
}

impl MockNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_create(&self, fail: bool) {
        *self.fail_on_create.write().await = fail;
    }
}

#[async_trait]
impl NotificationStore for MockNotificationStore {
    async fn create(&self, notification: NewNotification) -> Result<NotificationRecord> {
        if *self.fail_on_create.read().await {
            return Err(unavailable());
        }
        let record = NotificationRecord {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            payment_id: notification.payment_id,
            order_id: notification.order_id,
            message: notification.message,
            status: notification.status,
            created_at: Utc::now(),
        };
        self.notifications.write().await.push(record.clone());
        Ok(record)
    }

    async fn get_by_payment_id(&self, payment_id: i64) -> Result<Vec<NotificationRecord>> {
        Ok(self
            .notifications
            .read()
            .await
            .iter()
            .filter(|n| n.payment_id == payment_id)
            .cloned()
            .collect())
    }

    async fn get_by_order_id(&self, order_id: i64) -> Result<Vec<NotificationRecord>> {
        Ok(self
            .notifications
            .read()
            .await
            .iter()
            .filter(|n| n.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn list(&self) -> Result<Vec<NotificationRecord>> {
        Ok(self.notifications.read().await.clone())
    }
}
