//! Delivery handlers binding queues to domain processors.
//!
//! Each handler deserializes one queue's envelope, invokes its processor,
//! and classifies failures into the ack/requeue/drop decision the consumer
//! acts on.

mod notification;
mod payment;

pub use notification::PaymentProcessedHandler;
pub use payment::OrderCreatedHandler;
