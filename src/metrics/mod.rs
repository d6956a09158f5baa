//! Metrics and observability infrastructure.
//!
//! This module groups all observability-related components:
//! - `events`: Internal event types and the `InternalEvent` trait
//! - `server`: Prometheus HTTP server and initialization

pub mod events;
pub mod server;

// Re-export commonly used items
pub use server::init;

///
/// This macro calls the `InternalEvent::emit()` method on the given event,
/// which records the corresponding Prometheus metric.
///
/// # Example
///
/// ```ignore
/// use pizzeria::metrics::events::{OrderCreated, StepCompleted};
///
/// emit!(OrderCreated);
/// emit!(StepCompleted { operation: "cheese".into() });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event)
    };
}
