//! Storage seams for the round ledger and consumer cursors.

use async_trait::async_trait;

use super::events::{RoundEvent, StreamName};
use super::model::{Created, Part, PartWrite, Round};
use super::RoundStatus;
use crate::error::{PlayerError, Result};

/// Durable rounds, parts and the local round-transition stream.
///
/// Every status change goes through [`RoundStore::transition`], which compares
/// the persisted status with `from`, applies the part effects and appends the
/// matching [`RoundEvent`] in one transaction.
#[async_trait]
pub trait RoundStore: Send + Sync {
    /// Inserts a round in `Ready` unless one already exists for `external_id`.
    async fn create_round(&self, external_id: i64, player: &str) -> Result<Created>;

    async fn lookup(&self, id: i64) -> Result<Option<Round>>;

    async fn lookup_by_external_id(&self, external_id: i64) -> Result<Option<Round>>;

    async fn list_rounds(&self) -> Result<Vec<Round>>;

    /// Fails with [`PlayerError::Conflict`] when the round is no longer in
    /// `from`, and with [`PlayerError::InvalidTransition`] when the edge is not
    /// in the transition table.
    async fn transition(
        &self,
        round_id: i64,
        from: RoundStatus,
        to: RoundStatus,
        effects: Vec<PartWrite>,
    ) -> Result<Round>;

    /// Part writes that do not change the round's status (peer replication).
    async fn write_parts(&self, round_id: i64, writes: Vec<PartWrite>) -> Result<()>;

    async fn list_parts(&self, round_id: i64) -> Result<Vec<Part>>;

    async fn round_events_after(&self, after: u64, limit: usize) -> Result<Vec<RoundEvent>>;

    async fn lookup_required(&self, id: i64) -> Result<Round> {
        self.lookup(id)
            .await?
            .ok_or_else(|| PlayerError::RoundNotFound(format!("id {}", id)))
    }

    async fn find_part(&self, round_id: i64, player: &str) -> Result<Option<Part>> {
        Ok(self
            .list_parts(round_id)
            .await?
            .into_iter()
            .find(|p| p.belongs_to(player)))
    }
}

/// Per (stream, consumer) read positions.
#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn get_cursor(&self, stream: &StreamName, consumer: &str) -> Result<Option<u64>>;

    /// Positions only move forward; a lower position is ignored.
    async fn set_cursor(&self, stream: &StreamName, consumer: &str, position: u64) -> Result<()>;
}
