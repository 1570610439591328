//! End-to-end pipeline scenarios against in-memory backends.
//!
//! These drive the same delivery handlers the AMQP consumer invokes,
//! asserting the ack/requeue/drop classification and the persisted state
//! each scenario leaves behind.

use std::sync::Arc;

use orderflow::bus::{DeliveryHandler, HandlerError, RecordingPublisher};
use orderflow::events::{OrderCreatedEvent, PaymentProcessedEvent};
use orderflow::handlers::{OrderCreatedHandler, PaymentProcessedHandler};
use orderflow::services::{
    FixedDecider, NotificationProcessor, OrderService, PaymentProcessor,
};
use orderflow::storage::{
    MockNotificationStore, MockOrderStore, MockPaymentStore, NotificationStore, PaymentStatus,
    PaymentStore,
};

struct PaymentSide {
    store: Arc<MockPaymentStore>,
    publisher: Arc<RecordingPublisher>,
    handler: OrderCreatedHandler,
}

fn payment_side(decision: PaymentStatus) -> PaymentSide {
    let store = Arc::new(MockPaymentStore::new());
    let publisher = Arc::new(RecordingPublisher::new());
    let handler = OrderCreatedHandler::new(Arc::new(PaymentProcessor::new(
        store.clone(),
        publisher.clone(),
        Arc::new(FixedDecider(decision)),
    )));
    PaymentSide {
        store,
        publisher,
        handler,
    }
}

struct NotificationSide {
    store: Arc<MockNotificationStore>,
    handler: PaymentProcessedHandler,
}

fn notification_side() -> NotificationSide {
    let store = Arc::new(MockNotificationStore::new());
    let handler = PaymentProcessedHandler::new(Arc::new(NotificationProcessor::new(store.clone())));
    NotificationSide { store, handler }
}

fn order_event_body() -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "id": 123,
        "customer": "alice",
        "product_id": 7,
        "quantity": 2,
        "price": 50.0,
        "created_at": "2025-01-15T10:30:00Z",
        "event_type": "order.created",
    }))
    .unwrap()
}

#[tokio::test]
async fn happy_path_order_to_notification() {
    // Order service publishes the order-created event.
    let order_store = Arc::new(MockOrderStore::new());
    let order_publisher = Arc::new(RecordingPublisher::new());
    let orders = OrderService::new(order_store, order_publisher.clone());
    let order = orders.create_order("alice", 7, 2, 50.0).await.unwrap();
    assert_eq!(order.id, 1);

    let order_bodies = order_publisher.take_published().await;
    assert_eq!(order_bodies.len(), 1);
    let order_event: OrderCreatedEvent = serde_json::from_slice(&order_bodies[0]).unwrap();
    assert_eq!(order_event.customer, "alice");

    // Payment service consumes it and settles with a deterministic approval.
    let payment = payment_side(PaymentStatus::Approved);
    payment.handler.handle(&order_bodies[0]).await.unwrap();

    let record = payment.store.get_by_order_id(1).await.unwrap().unwrap();
    assert_eq!(record.status, PaymentStatus::Approved);
    assert_eq!(record.amount, 100.0);

    let payment_bodies = payment.publisher.take_published().await;
    assert_eq!(payment_bodies.len(), 1);
    let payment_event: PaymentProcessedEvent =
        serde_json::from_slice(&payment_bodies[0]).unwrap();
    assert_eq!(payment_event.payment_id, record.id);
    assert_eq!(payment_event.order_id, 1);
    assert_eq!(payment_event.status, "approved");
    assert_eq!(payment_event.amount, 100.0);

    // Notification service consumes the downstream event.
    let notification = notification_side();
    notification.handler.handle(&payment_bodies[0]).await.unwrap();

    let records = notification
        .store
        .get_by_payment_id(record.id)
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].order_id, 1);
    assert!(records[0].message.contains("approved"));
}

#[tokio::test]
async fn duplicate_delivery_settles_exactly_once() {
    let payment = payment_side(PaymentStatus::Approved);
    let body = order_event_body();

    // The broker may redeliver the same payload; settlement happens once.
    payment.handler.handle(&body).await.unwrap();
    payment.handler.handle(&body).await.unwrap();

    let all = payment.store.list().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].order_id, 123);

    // The downstream event is only published for the first settlement.
    assert_eq!(payment.publisher.published_count().await, 1);
}

#[tokio::test]
async fn malformed_payload_is_dropped_without_records() {
    let payment = payment_side(PaymentStatus::Approved);

    let result = payment.handler.handle(b"{this is not json").await;
    assert!(matches!(result, Err(HandlerError::Permanent(_))));
    assert!(payment.store.list().await.unwrap().is_empty());
    assert_eq!(payment.publisher.published_count().await, 0);
}

#[tokio::test]
async fn transient_failure_requeues_then_succeeds_on_redelivery() {
    let payment = payment_side(PaymentStatus::Approved);
    let body = order_event_body();

    // Persistence is down: the delivery must be classified for requeue.
    payment.store.set_fail_on_create(true).await;
    let result = payment.handler.handle(&body).await;
    assert!(matches!(result, Err(HandlerError::Transient(_))));
    assert!(payment.store.list().await.unwrap().is_empty());

    // Persistence recovers; the redelivered message settles.
    payment.store.set_fail_on_create(false).await;
    payment.handler.handle(&body).await.unwrap();
    assert_eq!(payment.store.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn invalid_order_event_is_dropped_not_requeued() {
    let payment = payment_side(PaymentStatus::Approved);

    let body = serde_json::to_vec(&serde_json::json!({
        "id": 0,
        "customer": "alice",
        "product_id": 7,
        "quantity": 2,
        "price": 50.0,
        "created_at": "2025-01-15T10:30:00Z",
        "event_type": "order.created",
    }))
    .unwrap();

    let result = payment.handler.handle(&body).await;
    assert!(matches!(result, Err(HandlerError::Permanent(_))));
    assert!(payment.store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn downstream_publish_failure_does_not_undo_settlement() {
    let payment = payment_side(PaymentStatus::Approved);
    payment.publisher.set_fail_on_publish(true).await;

    payment.handler.handle(&order_event_body()).await.unwrap();

    // The payment record stands even though its event was lost.
    assert_eq!(payment.store.list().await.unwrap().len(), 1);
    assert_eq!(payment.publisher.published_count().await, 0);
}

#[tokio::test]
async fn failed_settlement_still_notifies() {
    let payment = payment_side(PaymentStatus::Failed);
    payment.handler.handle(&order_event_body()).await.unwrap();

    let bodies = payment.publisher.take_published().await;
    let event: PaymentProcessedEvent = serde_json::from_slice(&bodies[0]).unwrap();
    assert_eq!(event.status, "failed");

    let notification = notification_side();
    notification.handler.handle(&bodies[0]).await.unwrap();

    let records = notification.store.list().await.unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].message.contains("'failed'"));
}

#[tokio::test]
async fn notification_redelivery_creates_duplicate_records() {
    // Documented behavior: notifications carry no dedup key, so a
    // redelivered payment event produces a second record.
    let notification = notification_side();
    let body = serde_json::to_vec(&serde_json::json!({
        "payment_id": 1,
        "order_id": 123,
        "status": "approved",
        "amount": 100.0,
        "created_at": "2025-01-15 10:30:00",
    }))
    .unwrap();

    notification.handler.handle(&body).await.unwrap();
    notification.handler.handle(&body).await.unwrap();

    assert_eq!(notification.store.get_by_payment_id(1).await.unwrap().len(), 2);
}

#[tokio::test]
async fn foreign_event_type_is_skipped_with_ack() {
    let payment = payment_side(PaymentStatus::Approved);

    let body = serde_json::to_vec(&serde_json::json!({
        "id": 123,
        "customer": "alice",
        "product_id": 7,
        "quantity": 2,
        "price": 50.0,
        "created_at": "2025-01-15T10:30:00Z",
        "event_type": "order.updated",
    }))
    .unwrap();

    // Skipped events resolve as success so the broker removes them.
    payment.handler.handle(&body).await.unwrap();
    assert!(payment.store.list().await.unwrap().is_empty());
}
