//! Orderflow - asynchronous order/payment/notification pipeline
//!
//! Three services communicate through durable RabbitMQ queues instead of
//! synchronous calls: order placement publishes order-created events, the
//! payment service settles them idempotently and publishes payment-processed
//! events, and the notification service records a notification per delivery.
//!
//! Delivery is at-least-once: consumers classify every failure into an
//! ack / requeue / drop decision and must tolerate duplicates.

pub mod bus;
pub mod config;
pub mod events;
pub mod handlers;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
