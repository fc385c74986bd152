use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::{
    accumulator::BatchAccumulator,
    config::Config,
    errors::BendIngestError,
    ingestors::BatchIngestor,
    message::MessageBatch,
    source::MessageSource,
    Result,
};

/// Finite exponential backoff for a batch that failed to load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Wait before the attempt following `failed_attempt` (1-based)
    pub fn backoff(&self, failed_attempt: u32) -> Duration {
        let exp = failed_attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << exp)
            .min(self.max_backoff)
    }
}

/// Drives poll -> accumulate -> flush -> commit for one subscription.
/// Offsets are committed only after the batch holding them has loaded.
pub struct ConsumeWorker<S> {
    name: String,
    source: S,
    ingestor: Arc<dyn BatchIngestor>,
    accumulator: BatchAccumulator,
    poll_timeout: Duration,
    retry: RetryPolicy,
}

impl<S: MessageSource> ConsumeWorker<S> {
    pub fn new(
        name: impl Into<String>,
        config: &Config,
        source: S,
        ingestor: Arc<dyn BatchIngestor>,
    ) -> Self {
        Self {
            name: name.into(),
            source,
            ingestor,
            accumulator: BatchAccumulator::new(config.batch_size, config.batch_max_interval()),
            poll_timeout: config.poll_timeout(),
            retry: RetryPolicy::with_max_attempts(config.max_ingest_attempts),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs until `stop` is cancelled. A flush in flight when the stop arrives
    /// completes, including its commit; messages still accumulating are left
    /// uncommitted for redelivery.
    pub async fn run(self, stop: CancellationToken) -> Result<()> {
        let span = info_span!("worker", name = %self.name);
        self.run_loop(stop).instrument(span).await
    }

    async fn run_loop(mut self, stop: CancellationToken) -> Result<()> {
        info!("started");

        loop {
            let polled = tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                polled = self.source.poll(self.poll_timeout) => polled,
            };

            match polled {
                Ok(Some(msg)) => self.accumulator.append(msg, Instant::now()),
                Ok(None) => {}
                Err(err) => {
                    warn!(stage = err.stage(), "poll failed: {err}");
                    tokio::select! {
                        biased;
                        _ = stop.cancelled() => break,
                        _ = tokio::time::sleep(self.poll_timeout) => {}
                    }
                }
            }

            if let Some(reason) = self.accumulator.flush_reason(Instant::now()) {
                let batch = self.accumulator.drain_and_reset();
                debug!(?reason, size = batch.len(), "flushing");
                self.flush(batch, &stop).await?;
            }
        }

        if !self.accumulator.is_empty() {
            info!(
                pending = self.accumulator.len(),
                "leaving unflushed messages uncommitted"
            );
        }
        info!("stopped");
        Ok(())
    }

    async fn flush(&mut self, batch: MessageBatch, stop: &CancellationToken) -> Result<()> {
        let mut attempt = 1;
        loop {
            let err = match self.ingestor.ingest(&batch).await {
                Ok(()) => break,
                Err(err) => err,
            };

            error!(
                stage = err.stage(),
                attempt,
                max_attempts = self.retry.max_attempts,
                "ingest batch of {} messages failed: {err}",
                batch.len()
            );
            if attempt >= self.retry.max_attempts {
                return Err(BendIngestError::WorkerUnhealthy {
                    worker: self.name.clone(),
                    attempts: attempt,
                    source: Box::new(err),
                });
            }

            tokio::select! {
                _ = stop.cancelled() => {
                    warn!("stop requested, abandoning batch for redelivery");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.retry.backoff(attempt)) => {}
            }
            attempt += 1;
        }

        // a failed commit only means redelivery, the rows are already loaded
        if let Err(err) = self.source.commit(batch.offsets()).await {
            warn!(stage = err.stage(), "commit failed: {err}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use rdkafka::error::KafkaError;

    use super::*;
    use crate::message::{Message, PartitionOffsets};

    struct BrokenBroker {
        polls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl MessageSource for BrokenBroker {
        async fn poll(&mut self, _timeout: Duration) -> Result<Option<Message>> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            Err(KafkaError::NoMessageReceived.into())
        }

        async fn commit(&mut self, _offsets: &PartitionOffsets) -> Result<()> {
            Ok(())
        }
    }

    struct NothingToLoad;

    #[async_trait]
    impl BatchIngestor for NothingToLoad {
        async fn create_target_table(&self) -> Result<()> {
            Ok(())
        }

        async fn ingest(&self, batch: &MessageBatch) -> Result<()> {
            panic!("unexpected batch of {}", batch.len())
        }
    }

    #[tokio::test]
    async fn poll_errors_wait_before_polling_again() -> anyhow::Result<()> {
        let polls = Arc::new(AtomicUsize::new(0));
        let config = Config {
            poll_timeout_ms: 50,
            ..Default::default()
        };
        let source = BrokenBroker {
            polls: polls.clone(),
        };
        let worker = ConsumeWorker::new("worker-0", &config, source, Arc::new(NothingToLoad));

        let stop = CancellationToken::new();
        let running = tokio::spawn(worker.run(stop.clone()));
        tokio::time::sleep(Duration::from_millis(300)).await;
        stop.cancel();
        running.await??;

        let polls = polls.load(Ordering::SeqCst);
        assert!((2..=10).contains(&polls), "polled {polls} times");
        Ok(())
    }

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let retry = RetryPolicy::default();
        assert_eq!(Duration::from_secs(1), retry.backoff(1));
        assert_eq!(Duration::from_secs(2), retry.backoff(2));
        assert_eq!(Duration::from_secs(16), retry.backoff(5));
        assert_eq!(Duration::from_secs(30), retry.backoff(6));
        assert_eq!(Duration::from_secs(30), retry.backoff(u32::MAX));
    }
}
