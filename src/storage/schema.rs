//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building.

use sea_query::Iden;

/// Orders table schema.
#[derive(Iden)]
pub enum Orders {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "customer"]
    Customer,
    #[iden = "product_id"]
    ProductId,
    #[iden = "quantity"]
    Quantity,
    #[iden = "price"]
    Price,
    #[iden = "created_at"]
    CreatedAt,
}

/// Payments table schema.
#[derive(Iden)]
pub enum Payments {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "order_id"]
    OrderId,
    #[iden = "status"]
    Status,
    #[iden = "amount"]
    Amount,
    #[iden = "created_at"]
    CreatedAt,
}

/// Notifications table schema.
#[derive(Iden)]
pub enum Notifications {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "payment_id"]
    PaymentId,
    #[iden = "order_id"]
    OrderId,
    #[iden = "message"]
    Message,
    #[iden = "status"]
    Status,
    #[iden = "created_at"]
    CreatedAt,
}

/// SQL for creating the orders table.
pub const CREATE_ORDERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS orders (
    id BIGSERIAL PRIMARY KEY,
    customer TEXT NOT NULL,
    product_id BIGINT NOT NULL,
    quantity INTEGER NOT NULL,
    price DOUBLE PRECISION NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
"#;

/// SQL for creating the payments table. The unique order_id constraint backs
/// the settlement idempotency check under concurrent redelivery.
pub const CREATE_PAYMENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS payments (
    id BIGSERIAL PRIMARY KEY,
    order_id BIGINT NOT NULL UNIQUE,
    status TEXT NOT NULL,
    amount DOUBLE PRECISION NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
"#;

/// SQL for creating the notifications table.
pub const CREATE_NOTIFICATIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS notifications (
    id BIGSERIAL PRIMARY KEY,
    payment_id BIGINT NOT NULL,
    order_id BIGINT NOT NULL,
    message VARCHAR(500) NOT NULL,
    status TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS idx_notifications_payment_id ON notifications(payment_id);
CREATE INDEX IF NOT EXISTS idx_notifications_order_id ON notifications(order_id);
"#;
