pub mod models;
pub mod pii;

pub use models::events::{
    DeadLetterSink, OrderCancelledEvent, OrderConfirmedEvent, OrderCreatedEvent, OrderEvent,
    OrderRefundedEvent,
};
