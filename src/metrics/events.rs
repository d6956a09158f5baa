//! Internal events for metrics emission.
//!
//! Each event struct represents a measurable occurrence on the production
//! line. Events implement the `InternalEvent` trait which emits the
//! corresponding Prometheus metric.

use metrics::{counter, histogram};
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// Event emitted when the manager places a new order into the freezer.
pub struct OrderCreated;

impl InternalEvent for OrderCreated {
    fn emit(self) {
        trace!("Order created");
        counter!("pizzeria_orders_created_total").increment(1);
    }
}

/// Event emitted when a robot finishes a physical step on an order.
pub struct StepCompleted {
    pub operation: String,
}

impl InternalEvent for StepCompleted {
    fn emit(self) {
        trace!(operation = %self.operation, "Step completed");
        counter!("pizzeria_steps_completed_total", "operation" => self.operation).increment(1);
    }
}

/// Event emitted when an order reaches its robot's border state.
pub struct OrderCompleted;

impl InternalEvent for OrderCompleted {
    fn emit(self) {
        trace!("Order completed");
        counter!("pizzeria_orders_completed_total").increment(1);
    }
}

/// Event emitted when a robot fails permanently.
pub struct RobotFailed {
    pub robot_id: u64,
}

impl InternalEvent for RobotFailed {
    fn emit(self) {
        trace!(robot_id = self.robot_id, "Robot failed");
        counter!("pizzeria_robots_failed_total").increment(1);
    }
}

/// Event emitted when a failed robot's order is rewound for reprocessing.
pub struct OrderReset;

impl InternalEvent for OrderReset {
    fn emit(self) {
        trace!("Order reset");
        counter!("pizzeria_orders_reset_total").increment(1);
    }
}

/// Event emitted when a quality camera scores a finished step.
pub struct QualitySampled {
    pub score: f64,
}

impl InternalEvent for QualitySampled {
    fn emit(self) {
        trace!(score = self.score, "Quality sampled");
        histogram!("pizzeria_quality_score").record(self.score);
    }
}
