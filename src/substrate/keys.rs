//! Key, channel, and payload vocabulary shared by all workers.
//!
//! Every substrate key the kitchen uses is built here, alongside the typed
//! encode/decode functions for the payloads that travel through them. Workers
//! never format keys ad hoc, so the wiring between producers and consumers is
//! auditable in one place.

use crate::error::{MalformedSnafu, SubstrateError};
use snafu::prelude::*;

/// Hash table mapping order id to its current pipeline state.
pub const ORDER_STATE_TABLE: &str = "order.state";

/// Queue of free oven ids.
pub const OVEN_FREE_QUEUE: &str = "oven.free";

/// Queue of order ids whose supplier robot is waiting for an oven.
pub const OVEN_REQUEST_QUEUE: &str = "robot.oven.queue";

/// Set of robot ids commanded to fail at their next physical step.
pub const BREAK_SET: &str = "robot.break";

/// Channel all worker log lines are published to.
pub const LOG_CHANNEL: &str = "log";

/// State every order is created in.
pub const STATE_FREEZER: &str = "freezer";

/// Queue where orders wait to be picked up at the given pipeline state.
pub fn waiting_queue(state: &str) -> String {
    format!("order.waiting.{state}")
}

/// Hash table of operation name to quality score for one order.
pub fn quality_table(order_id: u64) -> String {
    format!("order.quality.{order_id}")
}

/// Per-order reply channel on which a waiting supplier is offered an oven id.
pub fn oven_offer_channel(order_id: u64) -> String {
    format!("robot.oven.sync1.{order_id}")
}

/// Per-oven channel on which the supplier confirms (or denies) that the
/// order made it into the oven.
pub fn oven_confirm_channel(oven_id: u64) -> String {
    format!("robot.oven.sync2.{oven_id}")
}

/// Channel announcing that a robot completed an operation on an order.
pub fn step_done_channel(robot_id: u64, operation: &str) -> String {
    format!("order.done.{robot_id}.{operation}")
}

/// Channel announcing the permanent failure of a robot.
pub fn robot_failed_channel(robot_id: u64) -> String {
    format!("robot.failed.{robot_id}")
}

/// Encode an order, oven, or robot id.
pub fn encode_id(id: u64) -> String {
    id.to_string()
}

/// Decode an id payload.
pub fn decode_id(value: &str) -> Result<u64, SubstrateError> {
    value.parse().ok().context(MalformedSnafu {
        what: "id",
        value: value.to_string(),
    })
}

/// Encode a success/failure confirm flag.
pub fn encode_flag(success: bool) -> &'static str {
    if success { "1" } else { "0" }
}

/// Decode a confirm flag payload.
pub fn decode_flag(value: &str) -> Result<bool, SubstrateError> {
    match value {
        "1" => Ok(true),
        "0" => Ok(false),
        other => MalformedSnafu {
            what: "confirm flag",
            value: other.to_string(),
        }
        .fail(),
    }
}

/// Encode a quality score.
pub fn encode_quality(quality: f64) -> String {
    quality.to_string()
}

/// Decode a quality score payload.
pub fn decode_quality(value: &str) -> Result<f64, SubstrateError> {
    value.parse().ok().context(MalformedSnafu {
        what: "quality score",
        value: value.to_string(),
    })
}
