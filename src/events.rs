//! Wire envelopes exchanged through the broker queues.
//!
//! Field names and timestamp formats are the wire contract between services;
//! they must stay stable across releases. The order stream timestamps in
//! RFC3339, the payment stream in `YYYY-MM-DD HH:MM:SS`.

use serde::{Deserialize, Serialize};

use crate::storage::{OrderRecord, PaymentRecord};

/// Event type tag carried by order-stream envelopes.
pub const ORDER_CREATED: &str = "order.created";

/// Timestamp format of the payment stream.
const PAYMENT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Envelope published to the `orders` queue when an order is placed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCreatedEvent {
    pub id: i64,
    pub customer: String,
    pub product_id: i64,
    pub quantity: i32,
    pub price: f64,
    pub created_at: String,
    pub event_type: String,
}

impl OrderCreatedEvent {
    /// Build the envelope for a persisted order.
    pub fn from_record(order: &OrderRecord) -> Self {
        Self {
            id: order.id,
            customer: order.customer.clone(),
            product_id: order.product_id,
            quantity: order.quantity,
            price: order.price,
            created_at: order.created_at.to_rfc3339(),
            event_type: ORDER_CREATED.to_string(),
        }
    }
}

/// Envelope published to the `payments` queue when a payment settles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentProcessedEvent {
    pub payment_id: i64,
    pub order_id: i64,
    pub status: String,
    pub amount: f64,
    pub created_at: String,
}

impl PaymentProcessedEvent {
    /// Build the envelope for a persisted payment. Derived 1:1 at creation
    /// time; the envelope is never rebuilt from a mutated record.
    pub fn from_record(payment: &PaymentRecord) -> Self {
        Self {
            payment_id: payment.id,
            order_id: payment.order_id,
            status: payment.status.as_str().to_string(),
            amount: payment.amount,
            created_at: payment
                .created_at
                .format(PAYMENT_TIMESTAMP_FORMAT)
                .to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::storage::PaymentStatus;

    #[test]
    fn test_order_event_field_names() {
        let order = OrderRecord {
            id: 123,
            customer: "alice".to_string(),
            product_id: 7,
            quantity: 2,
            price: 50.0,
            created_at: Utc.with_ymd_and_hms(2025, 1, 15, 10, 30, 0).unwrap(),
        };

        let event = OrderCreatedEvent::from_record(&order);
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["id"], 123);
        assert_eq!(json["customer"], "alice");
        assert_eq!(json["product_id"], 7);
        assert_eq!(json["quantity"], 2);
        assert_eq!(json["price"], 50.0);
        assert_eq!(json["event_type"], "order.created");
        assert_eq!(json["created_at"], "2025-01-15T10:30:00+00:00");
    }

    #[test]
    fn test_payment_event_field_names_and_timestamp() {
        let payment = PaymentRecord {
            id: 1,
            order_id: 123,
            status: PaymentStatus::Approved,
            amount: 100.0,
            created_at: Utc.with_ymd_and_hms(2025, 1, 15, 10, 30, 0).unwrap(),
        };

        let event = PaymentProcessedEvent::from_record(&payment);
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["payment_id"], 1);
        assert_eq!(json["order_id"], 123);
        assert_eq!(json["status"], "approved");
        assert_eq!(json["amount"], 100.0);
        assert_eq!(json["created_at"], "2025-01-15 10:30:00");
    }

    #[test]
    fn test_order_event_round_trip() {
        let body = r#"{"id":123,"customer":"alice","product_id":7,"quantity":2,
            "price":50.0,"created_at":"2025-01-15T10:30:00Z","event_type":"order.created"}"#;

        let event: OrderCreatedEvent = serde_json::from_str(body).unwrap();
        assert_eq!(event.id, 123);
        assert_eq!(event.event_type, ORDER_CREATED);
    }
}
