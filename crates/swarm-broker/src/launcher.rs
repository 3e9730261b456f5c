//! The broker consumer → workflow launcher loop.

use std::sync::Arc;
use std::time::Duration;

use swarm_core::FeedbackEvent;
use swarm_flow::Engine;

use crate::error::Result;
use crate::{ConsumedRecord, FeedbackConsumer};

/// Delay before re-polling after a launch failure, so an unreachable
/// orchestrator or storage backend is not hammered.
const LAUNCH_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Consumes feedback records and launches one workflow per feedback ID.
///
/// Commit discipline: the offset is committed only after the engine's start
/// returns, for both the newly-started and already-exists outcomes. On a
/// crash mid-batch, unacknowledged records are redelivered and deduplicated
/// by the deterministic workflow ID.
pub struct Launcher<C> {
    consumer: C,
    engine: Arc<Engine>,
}

impl<C: FeedbackConsumer> Launcher<C> {
    /// Creates a launcher over a consumer and an engine.
    #[must_use]
    pub fn new(consumer: C, engine: Arc<Engine>) -> Self {
        Self { consumer, engine }
    }

    /// Runs the consume loop until the stream closes.
    ///
    /// # Errors
    ///
    /// Returns an error if the consumer transport fails unrecoverably.
    pub async fn run(&self) -> Result<()> {
        while let Some(record) = self.consumer.next().await? {
            self.process(record).await?;
        }
        tracing::info!("feedback stream closed, launcher stopping");
        Ok(())
    }

    #[tracing::instrument(skip(self, record), fields(key = %record.key, offset = record.offset))]
    async fn process(&self, record: ConsumedRecord) -> Result<()> {
        let event: FeedbackEvent = match serde_json::from_slice(&record.payload) {
            Ok(event) => event,
            Err(error) => {
                // A malformed record can never launch; park it behind a
                // commit so it is not redelivered forever.
                tracing::warn!(%error, "skipping malformed feedback record");
                metrics::counter!("swarm_launcher_malformed_records_total").increment(1);
                self.consumer.commit(&record).await?;
                return Ok(());
            }
        };

        loop {
            match self.engine.start(event.clone()).await {
                Ok(outcome) => {
                    if outcome.newly_started {
                        metrics::counter!("swarm_launcher_workflows_launched_total").increment(1);
                    } else {
                        tracing::debug!(workflow_id = %outcome.workflow_id, "redelivered record absorbed");
                    }
                    self.consumer.commit(&record).await?;
                    return Ok(());
                }
                Err(error) => {
                    tracing::warn!(%error, "workflow start failed, will retry without committing");
                    tokio::time::sleep(LAUNCH_RETRY_DELAY).await;
                }
            }
        }
    }
}
