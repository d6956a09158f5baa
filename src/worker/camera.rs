//! Quality camera: scores the output of one (robot, operation) pair.

use rand::SeedableRng;
use rand::rngs::SmallRng;
use rand_distr::{Distribution, Normal};
use std::time::Duration;

use crate::emit;
use crate::error::SubstrateError;
use crate::metrics::events::QualitySampled;
use crate::substrate::{Subscriber, keys};
use crate::worker::WorkerContext;

/// How long to wait for traffic before polling again. The camera has no
/// heartbeat of its own; it idles until work or robot failure arrives.
const RECEIVE_PERIOD: Duration = Duration::from_secs(100);

/// Quality checkup spread around a perfect score.
const QUALITY_STD_DEV: f64 = 0.1;

/// A camera watching one operation of one robot.
pub struct QualityObserver {
    ctx: WorkerContext,
    operation: String,
    robot_id: u64,
    subscriber: Box<dyn Subscriber>,
    noise: Normal<f64>,
    rng: SmallRng,
}

impl QualityObserver {
    pub fn new(
        ctx: WorkerContext,
        operation: impl Into<String>,
        robot_id: u64,
        seed: Option<u64>,
    ) -> Self {
        let subscriber = ctx.substrate.subscriber();
        let rng = match seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_os_rng(),
        };
        Self {
            ctx,
            operation: operation.into(),
            robot_id,
            subscriber,
            noise: Normal::new(1.0, QUALITY_STD_DEV).expect("constant std dev is valid"),
            rng,
        }
    }

    /// Sample a quality score: centered on perfect, clamped to [0, 1].
    fn assess_quality(&mut self) -> f64 {
        self.noise.sample(&mut self.rng).clamp(0.0, 1.0)
    }

    /// Score step completions until the watched robot fails permanently.
    pub async fn run(mut self) -> Result<(), SubstrateError> {
        self.ctx.log("started").await?;

        let done_channel = keys::step_done_channel(self.robot_id, &self.operation);
        let failed_channel = keys::robot_failed_channel(self.robot_id);
        self.subscriber.subscribe(&done_channel).await;
        self.subscriber.subscribe(&failed_channel).await;

        loop {
            let Some((channel, payload)) = self.subscriber.receive(RECEIVE_PERIOD).await else {
                continue;
            };
            if channel == failed_channel {
                break;
            }
            if channel == done_channel {
                let order_id = keys::decode_id(&payload)?;
                let quality = self.assess_quality();
                self.ctx
                    .log(&format!("quality of order {order_id} is {quality:.2}"))
                    .await?;
                self.ctx
                    .substrate
                    .hash_set(
                        &keys::quality_table(order_id),
                        &self.operation,
                        &keys::encode_quality(quality),
                    )
                    .await?;
                emit!(QualitySampled { score: quality });
            }
        }

        self.ctx.log("stopped").await?;
        Ok(())
    }
}
