//! Log aggregator: fans in the shared log channel and keeps it audibly alive.

use std::time::Duration;

use crate::error::SubstrateError;
use crate::substrate::{Subscriber, keys};
use crate::worker::WorkerContext;

/// How long the log stream may stay silent before the aggregator
/// self-publishes a heartbeat.
pub const DEFAULT_CANARY_PERIOD: Duration = Duration::from_secs(10);

/// Prints every log-channel message with a timestamp; if nothing arrives
/// within the canary period it publishes a heartbeat to the same channel, so
/// the stream never goes silent while the aggregator is alive. Runs until
/// externally terminated.
pub struct LogAggregator {
    ctx: WorkerContext,
    subscriber: Box<dyn Subscriber>,
    canary_period: Duration,
}

impl LogAggregator {
    pub fn new(ctx: WorkerContext) -> Self {
        Self::with_canary_period(ctx, DEFAULT_CANARY_PERIOD)
    }

    pub fn with_canary_period(ctx: WorkerContext, canary_period: Duration) -> Self {
        let subscriber = ctx.substrate.subscriber();
        Self {
            ctx,
            subscriber,
            canary_period,
        }
    }

    pub async fn run(mut self) -> Result<(), SubstrateError> {
        self.ctx.log("started").await?;
        self.subscriber.subscribe(keys::LOG_CHANNEL).await;
        loop {
            match self.subscriber.receive(self.canary_period).await {
                Some((_, message)) => {
                    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
                    println!("[{timestamp}] {message}");
                }
                None => self.ctx.log("still alive, nothing happened").await?,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::substrate::{MemorySubstrate, Substrate};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_heartbeat_when_idle() {
        let substrate = Arc::new(MemorySubstrate::new());
        let mut watcher = substrate.subscriber();
        watcher.subscribe(keys::LOG_CHANNEL).await;

        let ctx = WorkerContext::new("logger", substrate.clone());
        let logger = LogAggregator::with_canary_period(ctx, Duration::from_millis(50));
        let handle = tokio::spawn(logger.run());

        // First message is the logger's own "started" line.
        let (_, first) = watcher
            .receive(Duration::from_secs(1))
            .await
            .expect("started message");
        assert_eq!(first, "logger: started");

        // With no traffic, a heartbeat must follow within the canary period.
        let (_, heartbeat) = watcher
            .receive(Duration::from_secs(1))
            .await
            .expect("heartbeat");
        assert_eq!(heartbeat, "logger: still alive, nothing happened");

        handle.abort();
    }
}
