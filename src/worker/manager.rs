//! Kitchen manager: replays the scripted command list, then stops.

use std::time::Duration;

use crate::config::Command;
use crate::emit;
use crate::error::SubstrateError;
use crate::metrics::events::OrderCreated;
use crate::substrate::{QueueSide, keys};
use crate::worker::WorkerContext;

/// Executes a fixed, ordered command list and terminates when exhausted.
pub struct CommandSequencer {
    ctx: WorkerContext,
    commands: Vec<Command>,
    next_order_id: u64,
}

impl CommandSequencer {
    pub fn new(ctx: WorkerContext, commands: Vec<Command>) -> Self {
        Self {
            ctx,
            commands,
            next_order_id: 0,
        }
    }

    pub async fn run(mut self) -> Result<(), SubstrateError> {
        self.ctx.log("started").await?;
        for command in self.commands.clone() {
            match command {
                Command::Order(amount) => {
                    for _ in 0..amount {
                        self.create_order().await?;
                    }
                }
                // Suspends only the manager; the rest of the system runs on.
                Command::Sleep(seconds) => {
                    tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
                }
                // Idempotent; an id no robot carries is a silent no-op.
                Command::Break(robot_id) => {
                    self.ctx
                        .substrate
                        .set_add(keys::BREAK_SET, &keys::encode_id(robot_id))
                        .await?;
                }
            }
        }
        self.ctx.log("stopped").await?;
        Ok(())
    }

    /// Create one order with the next sequential id, parked in the freezer.
    async fn create_order(&mut self) -> Result<(), SubstrateError> {
        let order_id = self.next_order_id;
        self.next_order_id += 1;

        self.ctx
            .substrate
            .hash_set(
                keys::ORDER_STATE_TABLE,
                &keys::encode_id(order_id),
                keys::STATE_FREEZER,
            )
            .await?;
        self.ctx
            .substrate
            .queue_push(
                &keys::waiting_queue(keys::STATE_FREEZER),
                &keys::encode_id(order_id),
                QueueSide::Right,
            )
            .await?;
        self.ctx
            .log(&format!("created a new order {order_id}"))
            .await?;
        emit!(OrderCreated);
        Ok(())
    }
}
