//! Kitchen orchestration: builds the worker set from a topology and runs it.
//!
//! The orchestrator owns only startup and teardown. Once launched, workers
//! coordinate exclusively through the substrate; shutting down means
//! terminating their tasks abruptly, never draining in-flight work.

mod signal;

use std::sync::Arc;
use std::time::Duration;

use snafu::prelude::*;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::{Config, StationConfig};
use crate::error::{ConfigSnafu, KitchenError, SubstrateError, SubstrateSnafu};
use crate::report::Report;
use crate::substrate::{MemorySubstrate, QueueSide, SubstrateRef, keys};
use crate::worker::WorkerContext;
use crate::worker::camera::QualityObserver;
use crate::worker::logger::LogAggregator;
use crate::worker::manager::CommandSequencer;
use crate::worker::robot::{RobotSpec, WorkerRobot};

/// A kitchen assembled from a topology, ready to start.
///
/// Holds the task handles of its launched workers; dropping a started
/// kitchen without calling [`Kitchen::shutdown`] leaves those tasks running.
pub struct Kitchen {
    config: Config,
    substrate: SubstrateRef,
    robots: Vec<RobotSpec>,
    ovens_total: usize,
    /// (watched operation, robot id) pairs, one camera each.
    cameras: Vec<(String, u64)>,
    seed: Option<u64>,
    handles: Vec<JoinHandle<()>>,
}

impl Kitchen {
    /// Build a kitchen over the given substrate. Validates the topology and
    /// expands station descriptors into individual worker specs. Robot ids
    /// are sequential in descriptor order, so the topology file doubles as
    /// the id reference for `break` commands.
    pub fn new(config: Config, substrate: SubstrateRef) -> Result<Self, KitchenError> {
        config.validate().context(ConfigSnafu)?;

        let mut robots = Vec::new();
        let mut camera_operations: Vec<String> = Vec::new();
        let mut next_robot_id = 0u64;
        for station in &config.kitchen {
            match station {
                StationConfig::Robot {
                    count,
                    operations,
                    border_state,
                    reset_state,
                    after_oven,
                } => {
                    for _ in 0..*count {
                        robots.push(RobotSpec {
                            id: next_robot_id,
                            operations: operations.clone(),
                            border_state: border_state.clone(),
                            reset_state: reset_state.clone(),
                            after_oven: *after_oven,
                        });
                        next_robot_id += 1;
                    }
                }
                StationConfig::Oven { .. } => {}
                StationConfig::CameraSystem { operations } => {
                    for operation in operations {
                        if !camera_operations.contains(operation) {
                            camera_operations.push(operation.clone());
                        }
                    }
                }
            }
        }

        // One camera per watched operation of each robot that performs it.
        let mut cameras = Vec::new();
        for operation in &camera_operations {
            for robot in &robots {
                if robot.operations.contains(operation) {
                    cameras.push((operation.clone(), robot.id));
                }
            }
        }

        let ovens_total = config.oven_count();
        Ok(Self {
            config,
            substrate,
            robots,
            ovens_total,
            cameras,
            seed: None,
            handles: Vec::new(),
        })
    }

    /// Derive every worker's RNG from a fixed seed, for repeatable runs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Clear leftover state, preload the oven pool, and launch every worker:
    /// the log aggregator first, then cameras, robots, and finally the
    /// manager, with a short delay between launches.
    pub async fn start(&mut self) -> Result<(), KitchenError> {
        self.substrate.reset_all().await.context(SubstrateSnafu)?;
        for oven_id in 0..self.ovens_total as u64 {
            self.substrate
                .queue_push(keys::OVEN_FREE_QUEUE, &keys::encode_id(oven_id), QueueSide::Right)
                .await
                .context(SubstrateSnafu)?;
        }

        let delay = self.config.launch_delay();

        let ctx = self.context("logger");
        self.launch(LogAggregator::new(ctx).run());
        tokio::time::sleep(delay).await;

        let mut camera_seed = self.seed;
        for (operation, robot_id) in self.cameras.clone() {
            let ctx = self.context(format!("camera `{operation}` robot {robot_id}"));
            let camera = QualityObserver::new(ctx, &operation, robot_id, camera_seed);
            camera_seed = camera_seed.map(|s| s.wrapping_add(1));
            self.launch(camera.run());
            tokio::time::sleep(delay).await;
        }

        let mut robot_seed = self.seed;
        for spec in self.robots.clone() {
            let ctx = self.context(format!("robot {}", spec.id));
            let robot = WorkerRobot::new(ctx, spec, self.config.timing.clone(), robot_seed)
                .context(ConfigSnafu)?;
            robot_seed = robot_seed.map(|s| s.wrapping_add(1));
            self.launch(robot.run());
            tokio::time::sleep(delay).await;
        }

        let ctx = self.context("manager");
        self.launch(CommandSequencer::new(ctx, self.config.commands.clone()).run());

        info!(
            robots = self.robots.len(),
            ovens = self.ovens_total,
            cameras = self.cameras.len(),
            "kitchen started"
        );
        Ok(())
    }

    /// Terminate every worker task immediately, mid-step or mid-wait.
    pub fn shutdown(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
        info!("kitchen stopped");
    }

    fn context(&self, name: impl Into<String>) -> WorkerContext {
        WorkerContext::new(name, Arc::clone(&self.substrate))
    }

    fn launch(
        &mut self,
        worker: impl Future<Output = Result<(), SubstrateError>> + Send + 'static,
    ) {
        self.handles.push(tokio::spawn(async move {
            match worker.await {
                Ok(()) => debug!("worker finished"),
                Err(e) => error!("worker failed: {e}"),
            }
        }));
    }
}

/// Run a kitchen on a fresh in-memory substrate for `duration` (or until a
/// shutdown signal), then stop everything and build a final report.
pub async fn run_kitchen(config: Config, duration: Duration) -> Result<Report, KitchenError> {
    let substrate: SubstrateRef = Arc::new(MemorySubstrate::new());
    let shutdown = CancellationToken::new();

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            signal::shutdown_signal().await;
            shutdown.cancel();
        }
    });

    let mut kitchen = Kitchen::new(config, Arc::clone(&substrate))?;
    kitchen.start().await?;

    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = shutdown.cancelled() => {}
    }
    kitchen.shutdown();

    Report::build(substrate.as_ref()).await.context(SubstrateSnafu)
}
