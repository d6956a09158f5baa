//! The chief robot: executes a configured step sequence against one order at
//! a time, including the oven handoff rendezvous.
//!
//! # Oven handoff protocol
//!
//! Two robot roles exchange a scarce oven id through three reserved tokens
//! placed in the step sequence by the topology author:
//!
//! - `sync1` (supplier side): subscribe to a per-order reply channel, enqueue
//!   the order id on the shared oven-request queue, block until an oven id
//!   arrives on the reply channel.
//! - `sync2` (supplier side): publish success on the per-oven confirm channel
//!   claimed in `sync1`. A supplier that fails the physical place-in-oven
//!   step instead publishes failure from its reset procedure, so the paired
//!   consumer never waits forever.
//! - Consumer acquisition (the `after_oven` intake path): pop a free oven id,
//!   pop the oldest waiting order id (FIFO pairing), subscribe to the oven's
//!   confirm channel, offer the oven on the order's reply channel, and wait
//!   for the confirm. On failure the consumer keeps the held oven and retries
//!   with the next queued supplier instead of round-tripping the oven through
//!   the free pool.
//! - `free` (consumer side): return the held oven to the free pool, at the
//!   point the topology author placed the token.
//!
//! At any instant an oven id is visible in at most one of the free pool or a
//! single consumer's private hold.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use snafu::prelude::*;
use std::time::Duration;

use crate::config::TimingConfig;
use crate::emit;
use crate::error::{
    ConfigError, DisconnectedSnafu, EmptyOperationsSnafu, IllegalHandoffTokenSnafu,
    InvalidHandoffSequenceSnafu, SubstrateError,
};
use crate::metrics::events::{OrderCompleted, OrderReset, RobotFailed, StepCompleted};
use crate::substrate::{QueueSide, Subscriber, keys};
use crate::worker::WorkerContext;

/// Reserved token: supplier-side oven request/reply rendezvous.
pub const TOKEN_ACQUIRE: &str = "sync1";
/// Reserved token: supplier-side placement confirm.
pub const TOKEN_CONFIRM: &str = "sync2";
/// Reserved token: consumer-side oven release.
pub const TOKEN_RELEASE: &str = "free";

/// Poll interval while waiting on a handoff channel.
const SYNC_POLL: Duration = Duration::from_secs(1);

/// One parsed step of a robot's configured sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// A simulated physical action (take, sauce, bake, ...).
    Physical(String),
    /// `sync1`: request an oven and wait for the offer.
    AcquireHandoff,
    /// `sync2`: confirm successful placement to the paired consumer.
    ConfirmHandoff,
    /// `free`: return the held oven to the free pool.
    ReleaseOven,
}

/// A robot's step sequence, parsed once at construction so illegal token
/// placement is caught at load time instead of mid-run.
#[derive(Debug, Clone)]
pub struct StepPlan {
    steps: Vec<Step>,
}

impl StepPlan {
    /// Parse an operations list for a robot on the given side of the oven.
    ///
    /// Supplier robots may carry one `sync1`/`sync2` pair (in that order);
    /// consumer robots may carry one `free`. Any other token placement is a
    /// configuration error.
    pub fn parse(operations: &[String], after_oven: bool) -> Result<Self, ConfigError> {
        ensure!(!operations.is_empty(), EmptyOperationsSnafu);

        let mut steps = Vec::with_capacity(operations.len());
        let (mut acquires, mut confirms, mut releases) = (0usize, 0usize, 0usize);
        for operation in operations {
            let step = match operation.as_str() {
                TOKEN_ACQUIRE => {
                    ensure!(
                        !after_oven,
                        IllegalHandoffTokenSnafu {
                            token: operation.clone(),
                            after_oven,
                        }
                    );
                    acquires += 1;
                    Step::AcquireHandoff
                }
                TOKEN_CONFIRM => {
                    ensure!(
                        !after_oven,
                        IllegalHandoffTokenSnafu {
                            token: operation.clone(),
                            after_oven,
                        }
                    );
                    ensure!(
                        acquires > confirms,
                        InvalidHandoffSequenceSnafu {
                            message: "`sync2` must follow `sync1`",
                        }
                    );
                    confirms += 1;
                    Step::ConfirmHandoff
                }
                TOKEN_RELEASE => {
                    ensure!(
                        after_oven,
                        IllegalHandoffTokenSnafu {
                            token: operation.clone(),
                            after_oven,
                        }
                    );
                    releases += 1;
                    Step::ReleaseOven
                }
                name => Step::Physical(name.to_string()),
            };
            steps.push(step);
        }

        ensure!(
            acquires <= 1 && confirms <= 1 && releases <= 1,
            InvalidHandoffSequenceSnafu {
                message: "handoff tokens may appear at most once",
            }
        );
        ensure!(
            acquires == confirms,
            InvalidHandoffSequenceSnafu {
                message: "`sync1` and `sync2` must be paired",
            }
        );

        Ok(Self { steps })
    }

    /// Whether this plan performs the supplier side of the handoff.
    pub fn acquires_oven(&self) -> bool {
        self.steps.contains(&Step::AcquireHandoff)
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}

/// Static description of one robot, produced by the topology build.
#[derive(Debug, Clone)]
pub struct RobotSpec {
    pub id: u64,
    pub operations: Vec<String>,
    pub border_state: String,
    pub reset_state: String,
    pub after_oven: bool,
}

/// A kitchen robot worker.
///
/// Runs `AwaitingOrder -> PerformingStep(i) -> {AwaitingOrder | Resetting ->
/// PermanentlyFailed}`. Permanent failure has no outgoing transition: a
/// failed robot is deliberate, permanent capacity loss.
pub struct WorkerRobot {
    ctx: WorkerContext,
    id: u64,
    plan: StepPlan,
    border_state: String,
    reset_state: String,
    after_oven: bool,
    timing: TimingConfig,
    subscriber: Box<dyn Subscriber>,
    rng: SmallRng,
    /// Oven currently claimed or held; only meaningful mid-handoff.
    oven_id: Option<u64>,
}

impl WorkerRobot {
    /// Build a robot from its spec. Fails if the step plan is illegal.
    pub fn new(
        ctx: WorkerContext,
        spec: RobotSpec,
        timing: TimingConfig,
        seed: Option<u64>,
    ) -> Result<Self, ConfigError> {
        let plan = StepPlan::parse(&spec.operations, spec.after_oven)?;
        let subscriber = ctx.substrate.subscriber();
        let rng = match seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_os_rng(),
        };
        Ok(Self {
            ctx,
            id: spec.id,
            plan,
            border_state: spec.border_state,
            reset_state: spec.reset_state,
            after_oven: spec.after_oven,
            timing,
            subscriber,
            rng,
            oven_id: None,
        })
    }

    /// Process orders until permanent failure. Never returns on a healthy
    /// robot with no work; external termination is the only other exit.
    pub async fn run(mut self) -> Result<(), SubstrateError> {
        self.ctx.log("started").await?;
        loop {
            let order_id = self.next_order().await?;
            if !self.process_order(order_id).await? {
                break;
            }
        }
        self.ctx.log("stopped").await?;
        Ok(())
    }

    /// Block until there is an order to work on.
    async fn next_order(&mut self) -> Result<u64, SubstrateError> {
        if self.after_oven {
            self.acquire_with_oven().await
        } else {
            self.oven_id = None;
            let queue = keys::waiting_queue(&self.border_state);
            let value = self.pop_blocking(&queue).await?;
            keys::decode_id(&value)
        }
    }

    /// Consumer-side acquisition: reserve an oven, then pair with waiting
    /// suppliers until one confirms a successful placement.
    async fn acquire_with_oven(&mut self) -> Result<u64, SubstrateError> {
        let value = self.pop_blocking(keys::OVEN_FREE_QUEUE).await?;
        let oven_id = keys::decode_id(&value)?;
        self.oven_id = Some(oven_id);

        let confirm_channel = keys::oven_confirm_channel(oven_id);
        loop {
            let value = self.pop_blocking(keys::OVEN_REQUEST_QUEUE).await?;
            let order_id = keys::decode_id(&value)?;

            // Subscribe before offering, then tell the supplier where its
            // order is expected.
            self.subscriber.subscribe(&confirm_channel).await;
            self.ctx
                .substrate
                .publish(&keys::oven_offer_channel(order_id), &keys::encode_id(oven_id))
                .await?;

            let success = loop {
                if let Some((channel, payload)) = self.subscriber.receive(SYNC_POLL).await
                    && channel == confirm_channel
                {
                    break keys::decode_flag(&payload)?;
                }
            };
            self.subscriber.unsubscribe(&confirm_channel).await;

            if success {
                self.ctx
                    .log(&format!("order {order_id} has been put into oven"))
                    .await?;
                return Ok(order_id);
            }
            // The supplier died mid-placement. Keep the held oven off the
            // free pool and pair with the next queued supplier.
            self.ctx
                .log(&format!(
                    "order {order_id} failed to be put into oven {oven_id}"
                ))
                .await?;
        }
    }

    /// Execute the full step plan for one order.
    ///
    /// Returns `false` after a step failure: the order has been reset and
    /// the robot must not take more work.
    async fn process_order(&mut self, order_id: u64) -> Result<bool, SubstrateError> {
        for step in self.plan.steps.clone() {
            let ok = match step {
                Step::Physical(operation) => {
                    self.ctx
                        .substrate
                        .hash_set(keys::ORDER_STATE_TABLE, &keys::encode_id(order_id), &operation)
                        .await?;
                    self.ctx
                        .log(&format!("start `{operation}` order {order_id}"))
                        .await?;
                    let ok = self.perform(&operation).await?;
                    if ok {
                        self.ctx
                            .log(&format!("done `{operation}` order {order_id}"))
                            .await?;
                        self.ctx
                            .substrate
                            .publish(
                                &keys::step_done_channel(self.id, &operation),
                                &keys::encode_id(order_id),
                            )
                            .await?;
                        emit!(StepCompleted { operation });
                    }
                    ok
                }
                Step::AcquireHandoff => {
                    self.acquire_handoff(order_id).await?;
                    true
                }
                Step::ConfirmHandoff => {
                    self.confirm_handoff().await?;
                    true
                }
                Step::ReleaseOven => {
                    self.release_oven().await?;
                    true
                }
            };
            if !ok {
                self.reset_order(order_id).await?;
                return Ok(false);
            }
        }

        if self.after_oven {
            // Hand the finished order to the next pipeline stage.
            self.ctx
                .substrate
                .queue_push(
                    &keys::waiting_queue(&self.border_state),
                    &keys::encode_id(order_id),
                    QueueSide::Right,
                )
                .await?;
            self.ctx
                .substrate
                .hash_set(
                    keys::ORDER_STATE_TABLE,
                    &keys::encode_id(order_id),
                    &self.border_state,
                )
                .await?;
            emit!(OrderCompleted);
        }
        Ok(true)
    }

    /// Simulate one physical action: injected-failure check, a duration
    /// drawn from the variation interval, then a stochastic success roll.
    async fn perform(&mut self, operation: &str) -> Result<bool, SubstrateError> {
        let commanded_to_break = self
            .ctx
            .substrate
            .set_is_member(keys::BREAK_SET, &keys::encode_id(self.id))
            .await?;
        if commanded_to_break {
            return Ok(false);
        }

        let base = self.timing.action_seconds(operation);
        if base > 0.0 {
            let (low, high) = self.timing.variation;
            let seconds = self.rng.random_range(base * low..=base * high);
            tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
        }

        let reliability = self.timing.action_reliability(operation);
        if reliability >= 1.0 {
            return Ok(true);
        }
        Ok(self.rng.random_bool(reliability.max(0.0)))
    }

    /// Supplier-side `sync1`: queue up for an oven and wait for the offer.
    async fn acquire_handoff(&mut self, order_id: u64) -> Result<(), SubstrateError> {
        let offer_channel = keys::oven_offer_channel(order_id);
        self.subscriber.subscribe(&offer_channel).await;
        self.ctx
            .substrate
            .queue_push(
                keys::OVEN_REQUEST_QUEUE,
                &keys::encode_id(order_id),
                QueueSide::Right,
            )
            .await?;

        let oven_id = loop {
            if let Some((channel, payload)) = self.subscriber.receive(SYNC_POLL).await
                && channel == offer_channel
            {
                break keys::decode_id(&payload)?;
            }
        };
        self.subscriber.unsubscribe(&offer_channel).await;
        self.oven_id = Some(oven_id);
        Ok(())
    }

    /// Supplier-side `sync2`: placement succeeded, unblock the consumer.
    async fn confirm_handoff(&mut self) -> Result<(), SubstrateError> {
        debug_assert!(self.oven_id.is_some(), "sync2 without a claimed oven");
        if let Some(oven_id) = self.oven_id.take() {
            self.ctx
                .substrate
                .publish(&keys::oven_confirm_channel(oven_id), keys::encode_flag(true))
                .await?;
        }
        Ok(())
    }

    /// Consumer-side `free`: return the held oven to the free pool.
    async fn release_oven(&mut self) -> Result<(), SubstrateError> {
        debug_assert!(self.oven_id.is_some(), "free without a held oven");
        if let Some(oven_id) = self.oven_id.take() {
            self.ctx
                .substrate
                .queue_push(keys::OVEN_FREE_QUEUE, &keys::encode_id(oven_id), QueueSide::Right)
                .await?;
        }
        Ok(())
    }

    /// Failure path: announce the failure, unblock a paired consumer if one
    /// is waiting on our confirm, and return the order to its retry queue.
    async fn reset_order(&mut self, order_id: u64) -> Result<(), SubstrateError> {
        self.ctx.log("failure").await?;
        self.ctx
            .substrate
            .publish(&keys::robot_failed_channel(self.id), &keys::encode_id(self.id))
            .await?;

        // A supplier that claimed an oven in sync1 but failed the placement
        // step must still run the confirm exchange, with a failure flag.
        if !self.after_oven
            && let Some(oven_id) = self.oven_id.take()
        {
            self.ctx
                .substrate
                .publish(&keys::oven_confirm_channel(oven_id), keys::encode_flag(false))
                .await?;
        }

        self.ctx
            .substrate
            .hash_set(
                keys::ORDER_STATE_TABLE,
                &keys::encode_id(order_id),
                &self.reset_state,
            )
            .await?;
        self.ctx
            .substrate
            .hash_delete(&keys::quality_table(order_id))
            .await?;
        self.ctx
            .substrate
            .queue_push(
                &keys::waiting_queue(&self.reset_state),
                &keys::encode_id(order_id),
                QueueSide::Left,
            )
            .await?;

        emit!(RobotFailed { robot_id: self.id });
        emit!(OrderReset);
        Ok(())
    }

    /// Pop from a queue, blocking forever; `None` here means the substrate
    /// went away under us.
    async fn pop_blocking(&self, queue: &str) -> Result<String, SubstrateError> {
        self.ctx
            .substrate
            .queue_pop(queue, QueueSide::Left, None)
            .await?
            .context(DisconnectedSnafu { queue })
    }
}
