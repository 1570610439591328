//! Domain services applying business rules to pipeline events.

pub mod notification;
pub mod order;
pub mod payment;

pub use notification::{NotificationError, NotificationProcessor};
pub use order::{OrderError, OrderService};
pub use payment::{FixedDecider, PaymentDecider, PaymentError, PaymentProcessor, RandomDecider};
