//! Cursor-driven stream consumers.
//!
//! A [`ConsumerRuntime`] pairs one [`EventSource`] with one [`Consumer`] and
//! loops forever: read the stored cursor, fetch the next batch, hand each
//! event to the consumer and store its ordinal once the consumer advances.

mod runtime;
mod source;

use async_trait::async_trait;

use crate::error::{PlayerError, Result};
use crate::state::{Event, StreamName};

pub(crate) use runtime::Backoff;
pub use runtime::{BackoffPolicy, ConsumerRuntime, RuntimeSettings};
pub use source::{EngineSource, LocalSource, PeerSource};

/// Outcome of handling one event.
#[derive(Debug)]
pub enum Flow {
    /// Processed (or deliberately skipped); store the cursor.
    Advance,
    /// Keep the cursor and redeliver after a backoff.
    Retry(PlayerError),
}

impl Flow {
    pub fn is_advance(&self) -> bool {
        matches!(self, Flow::Advance)
    }
}

impl From<Result<()>> for Flow {
    fn from(result: Result<()>) -> Self {
        match result {
            Ok(()) => Flow::Advance,
            Err(e) => Flow::Retry(e),
        }
    }
}

#[async_trait]
pub trait Consumer<K>: Send + Sync {
    /// Cursor key; unique per stream.
    fn name(&self) -> &str;

    /// Must be idempotent: the same event may be delivered more than once.
    async fn handle(&self, event: &Event<K>) -> Flow;
}

#[async_trait]
pub trait EventSource<K>: Send + Sync {
    fn stream(&self) -> StreamName;

    /// Events with an ordinal strictly greater than `after`, ascending.
    async fn events_after(&self, after: u64, limit: usize) -> Result<Vec<Event<K>>>;
}
