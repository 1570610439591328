//! PostgreSQL repository implementations.
//!
//! Queries are built with sea-query and executed through sqlx. Record ids
//! and creation timestamps come back from `RETURNING` clauses so the
//! returned records match what was persisted.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_query::{Expr, Order, PostgresQueryBuilder, Query};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use super::schema::{Notifications, Orders, Payments};
use super::{
    NewNotification, NewOrder, NewPayment, NotificationRecord, NotificationStatus,
    NotificationStore, OrderRecord, OrderStore, PaymentRecord, PaymentStatus, PaymentStore,
    Result, StorageError,
};

/// Create the pipeline tables if they do not exist.
pub async fn init_schema(pool: &PgPool) -> Result<()> {
    sqlx::raw_sql(super::schema::CREATE_ORDERS_TABLE)
        .execute(pool)
        .await?;
    sqlx::raw_sql(super::schema::CREATE_PAYMENTS_TABLE)
        .execute(pool)
        .await?;
    sqlx::raw_sql(super::schema::CREATE_NOTIFICATIONS_TABLE)
        .execute(pool)
        .await?;
    Ok(())
}

// ============================================================================
// Orders
// ============================================================================

/// PostgreSQL implementation of OrderStore.
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: &PgRow) -> OrderRecord {
        OrderRecord {
            id: row.get("id"),
            customer: row.get("customer"),
            product_id: row.get("product_id"),
            quantity: row.get("quantity"),
            price: row.get("price"),
            created_at: row.get::<DateTime<Utc>, _>("created_at"),
        }
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn create(&self, order: NewOrder) -> Result<OrderRecord> {
        let query = Query::insert()
            .into_table(Orders::Table)
            .columns([
                Orders::Customer,
                Orders::ProductId,
                Orders::Quantity,
                Orders::Price,
            ])
            .values_panic([
                order.customer.clone().into(),
                order.product_id.into(),
                order.quantity.into(),
                order.price.into(),
            ])
            .returning(Query::returning().columns([Orders::Id, Orders::CreatedAt]))
            .to_string(PostgresQueryBuilder);

        let row = sqlx::query(&query).fetch_one(&self.pool).await?;

        Ok(OrderRecord {
            id: row.get("id"),
            customer: order.customer,
            product_id: order.product_id,
            quantity: order.quantity,
            price: order.price,
            created_at: row.get::<DateTime<Utc>, _>("created_at"),
        })
    }

    async fn get(&self, id: i64) -> Result<Option<OrderRecord>> {
        let query = Query::select()
            .columns([
                Orders::Id,
                Orders::Customer,
                Orders::ProductId,
                Orders::Quantity,
                Orders::Price,
                Orders::CreatedAt,
            ])
            .from(Orders::Table)
            .and_where(Expr::col(Orders::Id).eq(id))
            .to_string(PostgresQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        Ok(row.as_ref().map(Self::row_to_record))
    }

    async fn list(&self) -> Result<Vec<OrderRecord>> {
        let query = Query::select()
            .columns([
                Orders::Id,
                Orders::Customer,
                Orders::ProductId,
                Orders::Quantity,
                Orders::Price,
                Orders::CreatedAt,
            ])
            .from(Orders::Table)
            .order_by(Orders::CreatedAt, Order::Desc)
            .to_string(PostgresQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(Self::row_to_record).collect())
    }
}

// ============================================================================
// Payments
// ============================================================================

/// PostgreSQL implementation of PaymentStore.
pub struct PostgresPaymentStore {
    pool: PgPool,
}

impl PostgresPaymentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: &PgRow) -> Result<PaymentRecord> {
        let status: String = row.get("status");
        let status = PaymentStatus::parse(&status).ok_or(StorageError::UnknownStatus {
            entity: "payment",
            value: status,
        })?;

        Ok(PaymentRecord {
            id: row.get("id"),
            order_id: row.get("order_id"),
            status,
            amount: row.get("amount"),
            created_at: row.get::<DateTime<Utc>, _>("created_at"),
        })
    }
}

#[async_trait]
impl PaymentStore for PostgresPaymentStore {
    async fn create(&self, payment: NewPayment) -> Result<PaymentRecord> {
        let query = Query::insert()
            .into_table(Payments::Table)
            .columns([Payments::OrderId, Payments::Status, Payments::Amount])
            .values_panic([
                payment.order_id.into(),
                payment.status.as_str().into(),
                payment.amount.into(),
            ])
            .returning(Query::returning().columns([Payments::Id, Payments::CreatedAt]))
            .to_string(PostgresQueryBuilder);

        let row = sqlx::query(&query).fetch_one(&self.pool).await?;

        Ok(PaymentRecord {
            id: row.get("id"),
            order_id: payment.order_id,
            status: payment.status,
            amount: payment.amount,
            created_at: row.get::<DateTime<Utc>, _>("created_at"),
        })
    }

    async fn get_by_order_id(&self, order_id: i64) -> Result<Option<PaymentRecord>> {
        let query = Query::select()
            .columns([
                Payments::Id,
                Payments::OrderId,
                Payments::Status,
                Payments::Amount,
                Payments::CreatedAt,
            ])
            .from(Payments::Table)
            .and_where(Expr::col(Payments::OrderId).eq(order_id))
            .to_string(PostgresQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn list(&self) -> Result<Vec<PaymentRecord>> {
        let query = Query::select()
            .columns([
                Payments::Id,
                Payments::OrderId,
                Payments::Status,
                Payments::Amount,
                Payments::CreatedAt,
            ])
            .from(Payments::Table)
            .order_by(Payments::CreatedAt, Order::Desc)
            .to_string(PostgresQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_record).collect()
    }
}

// ============================================================================
// Notifications
// ============================================================================

/// PostgreSQL implementation of NotificationStore.
pub struct PostgresNotificationStore {
    pool: PgPool,
}

impl PostgresNotificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: &PgRow) -> Result<NotificationRecord> {
        let status: String = row.get("status");
        let status = NotificationStatus::parse(&status).ok_or(StorageError::UnknownStatus {
            entity: "notification",
            value: status,
        })?;

        Ok(NotificationRecord {
            id: row.get("id"),
            payment_id: row.get("payment_id"),
            order_id: row.get("order_id"),
            message: row.get("message"),
            status,
            created_at: row.get::<DateTime<Utc>, _>("created_at"),
        })
    }

    fn select_all() -> sea_query::SelectStatement {
        Query::select()
            .columns([
                Notifications::Id,
                Notifications::PaymentId,
                Notifications::OrderId,
                Notifications::Message,
                Notifications::Status,
                Notifications::CreatedAt,
            ])
            .from(Notifications::Table)
            .to_owned()
    }
}

#[async_trait]
impl NotificationStore for PostgresNotificationStore {
    async fn create(&self, notification: NewNotification) -> Result<NotificationRecord> {
        let query = Query::insert()
            .into_table(Notifications::Table)
            .columns([
                Notifications::PaymentId,
                Notifications::OrderId,
                Notifications::Message,
                Notifications::Status,
            ])
            .values_panic([
                notification.payment_id.into(),
                notification.order_id.into(),
                notification.message.clone().into(),
                notification.status.as_str().into(),
            ])
            .returning(Query::returning().columns([Notifications::Id, Notifications::CreatedAt]))
            .to_string(PostgresQueryBuilder);

        let row = sqlx::query(&query).fetch_one(&self.pool).await?;

        Ok(NotificationRecord {
            id: row.get("id"),
            payment_id: notification.payment_id,
            order_id: notification.order_id,
            message: notification.message,
            status: notification.status,
            created_at: row.get::<DateTime<Utc>, _>("created_at"),
        })
    }

    async fn get_by_payment_id(&self, payment_id: i64) -> Result<Vec<NotificationRecord>> {
        let query = Self::select_all()
            .and_where(Expr::col(Notifications::PaymentId).eq(payment_id))
            .order_by(Notifications::CreatedAt, Order::Desc)
            .to_string(PostgresQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_record).collect()
    }

    async fn get_by_order_id(&self, order_id: i64) -> Result<Vec<NotificationRecord>> {
        let query = Self::select_all()
            .and_where(Expr::col(Notifications::OrderId).eq(order_id))
            .order_by(Notifications::CreatedAt, Order::Desc)
            .to_string(PostgresQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_record).collect()
    }

    async fn list(&self) -> Result<Vec<NotificationRecord>> {
        let query = Self::select_all()
            .order_by(Notifications::CreatedAt, Order::Desc)
            .to_string(PostgresQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_record).collect()
    }
}
