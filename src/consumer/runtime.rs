use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{Consumer, EventSource, Flow};
use crate::error::Result;
use crate::state::{CursorStore, StreamName};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(100),
            max: Duration::from_secs(10),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RuntimeSettings {
    pub batch_size: usize,
    /// Idle wait once the stream is drained.
    pub poll_interval: Duration,
    pub backoff: BackoffPolicy,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            batch_size: 100,
            poll_interval: Duration::from_millis(250),
            backoff: BackoffPolicy::default(),
        }
    }
}

pub(crate) struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub(crate) fn new(policy: BackoffPolicy) -> Self {
        Self {
            base: policy.base,
            max: policy.max,
            current: policy.base,
        }
    }

    pub(crate) fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        let next = self.current.checked_mul(2).unwrap_or(self.max);
        self.current = std::cmp::min(next, self.max);
        delay
    }

    pub(crate) fn reset(&mut self) {
        self.current = self.base;
    }
}

/// Drives one consumer over one stream.
pub struct ConsumerRuntime<K> {
    source: Arc<dyn EventSource<K>>,
    consumer: Arc<dyn Consumer<K>>,
    cursors: Arc<dyn CursorStore>,
    settings: RuntimeSettings,
    stream: StreamName,
}

impl<K: Send + Sync + 'static> ConsumerRuntime<K> {
    pub fn new(
        source: Arc<dyn EventSource<K>>,
        consumer: Arc<dyn Consumer<K>>,
        cursors: Arc<dyn CursorStore>,
        settings: RuntimeSettings,
    ) -> Self {
        let stream = source.stream();
        Self {
            source,
            consumer,
            cursors,
            settings,
            stream,
        }
    }

    pub fn stream(&self) -> &StreamName {
        &self.stream
    }

    pub fn consumer_name(&self) -> &str {
        self.consumer.name()
    }

    /// Handles one batch from the stored cursor.
    ///
    /// Returns the number of events advanced past. A `Retry` stops the batch
    /// with the consumer's error and leaves the cursor on the last advanced
    /// event.
    pub async fn process_batch(&self) -> Result<usize> {
        let name = self.consumer.name();
        let cursor = self
            .cursors
            .get_cursor(&self.stream, name)
            .await?
            .unwrap_or(0);

        let events = self
            .source
            .events_after(cursor, self.settings.batch_size)
            .await?;

        let mut advanced = 0;
        for event in events.iter().filter(|e| e.ordinal > cursor) {
            match self.consumer.handle(event).await {
                Flow::Advance => {
                    self.cursors
                        .set_cursor(&self.stream, name, event.ordinal)
                        .await?;
                    advanced += 1;
                }
                Flow::Retry(e) => {
                    debug!(
                        stream = %self.stream,
                        consumer = name,
                        ordinal = event.ordinal,
                        "Consumer asked for redelivery"
                    );
                    return Err(e);
                }
            }
        }

        Ok(advanced)
    }

    /// Runs until `shutdown` flips to true. Errors never end the loop.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut backoff = Backoff::new(self.settings.backoff);
        info!(stream = %self.stream, consumer = self.consumer.name(), "Consumer started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let delay = match self.process_batch().await {
                Ok(0) => {
                    backoff.reset();
                    self.settings.poll_interval
                }
                Ok(_) => {
                    backoff.reset();
                    continue;
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    warn!(
                        stream = %self.stream,
                        consumer = self.consumer.name(),
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "Consumer batch failed"
                    );
                    delay
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!(stream = %self.stream, consumer = self.consumer.name(), "Consumer stopped");
    }
}
