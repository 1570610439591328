//! Persistence for pipeline records.
//!
//! Repositories are capability traits (`create`, keyed `get`, `list`);
//! records are created once by the pipeline and never mutated. Backends:
//! Postgres for real deployments, in-memory mocks for tests and local runs.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;

pub mod mock;
pub mod postgres;
pub mod schema;

pub use mock::{MockNotificationStore, MockOrderStore, MockPaymentStore};
pub use postgres::{PostgresNotificationStore, PostgresOrderStore, PostgresPaymentStore};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("unrecognized {entity} status '{value}'")]
    UnknownStatus { entity: &'static str, value: String },
}

// ============================================================================
// Records
// ============================================================================

/// A placed order, persisted before its event is published.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRecord {
    pub id: i64,
    pub customer: String,
    pub product_id: i64,
    pub quantity: i32,
    pub price: f64,
    pub created_at: DateTime<Utc>,
}

/// Input for creating an order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub customer: String,
    pub product_id: i64,
    pub quantity: i32,
    pub price: f64,
}

/// Settlement outcome of a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Approved,
    Failed,
    Pending,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Failed => "failed",
            Self::Pending => "pending",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "approved" => Some(Self::Approved),
            "failed" => Some(Self::Failed),
            "pending" => Some(Self::Pending),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A settled payment. At most one exists per order_id; the order id is the
/// idempotency key for redelivered order events.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRecord {
    pub id: i64,
    pub order_id: i64,
    pub status: PaymentStatus,
    pub amount: f64,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a payment.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub order_id: i64,
    pub status: PaymentStatus,
    pub amount: f64,
}

/// Delivery state of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationStatus {
    Sent,
    Pending,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "SENT",
            Self::Pending => "PENDING",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "SENT" => Some(Self::Sent),
            "PENDING" => Some(Self::Pending),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A generated notification. One per delivered payment event; there is no
/// dedup key, so broker redelivery produces another record.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRecord {
    pub id: i64,
    pub payment_id: i64,
    pub order_id: i64,
    pub message: String,
    pub status: NotificationStatus,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a notification.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub payment_id: i64,
    pub order_id: i64,
    pub message: String,
    pub status: NotificationStatus,
}

// ============================================================================
// Repository traits
// ============================================================================

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn create(&self, order: NewOrder) -> Result<OrderRecord>;
    async fn get(&self, id: i64) -> Result<Option<OrderRecord>>;
    async fn list(&self) -> Result<Vec<OrderRecord>>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn create(&self, payment: NewPayment) -> Result<PaymentRecord>;
    async fn get_by_order_id(&self, order_id: i64) -> Result<Option<PaymentRecord>>;
    async fn list(&self) -> Result<Vec<PaymentRecord>>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn create(&self, notification: NewNotification) -> Result<NotificationRecord>;
    async fn get_by_payment_id(&self, payment_id: i64) -> Result<Vec<NotificationRecord>>;
    async fn get_by_order_id(&self, order_id: i64) -> Result<Vec<NotificationRecord>>;
    async fn list(&self) -> Result<Vec<NotificationRecord>>;
}

// ============================================================================
// Configuration & factory
// ============================================================================

/// Storage backend selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Postgres,
    /// In-memory stores; state is lost on restart.
    #[default]
    Memory,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub kind: StorageKind,
    /// Postgres connection URL (ignored for `memory`).
    pub url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kind: StorageKind::Memory,
            url: "postgres://localhost:5432/orderflow".to_string(),
        }
    }
}

/// Repositories for one service process. The underlying pool is shared and
/// safe for concurrent use by the consumer task and request-handling paths.
pub struct Stores {
    pub orders: Arc<dyn OrderStore>,
    pub payments: Arc<dyn PaymentStore>,
    pub notifications: Arc<dyn NotificationStore>,
}

/// Initialize storage based on configuration.
pub async fn init_storage(config: &StorageConfig) -> Result<Stores> {
    match config.kind {
        StorageKind::Postgres => {
            info!(url = %config.url, "Storage: postgres");
            let pool = sqlx::PgPool::connect(&config.url).await?;
            postgres::init_schema(&pool).await?;
            Ok(Stores {
                orders: Arc::new(PostgresOrderStore::new(pool.clone())),
                payments: Arc::new(PostgresPaymentStore::new(pool.clone())),
                notifications: Arc::new(PostgresNotificationStore::new(pool)),
            })
        }
        StorageKind::Memory => {
            info!("Storage: in-memory");
            Ok(Stores {
                orders: Arc::new(MockOrderStore::new()),
                payments: Arc::new(MockPaymentStore::new()),
                notifications: Arc::new(MockNotificationStore::new()),
            })
        }
    }
}
