//! SQLite-backed round store with a dedicated writer thread and read pool.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use tokio::sync::oneshot;
use tracing::debug;

use super::events::{RoundEvent, StreamName};
use super::model::{Created, Part, PartWrite, Round};
use super::store::{CursorStore, RoundStore};
use super::writer::{RoundWriter, WriteCommand};
use super::{RoundStatus, store_err, store_err_with};
use crate::error::{PlayerError, Result};

pub const DEFAULT_READ_POOL_SIZE: usize = 4;
const READ_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub(super) const ROUND_COLUMNS: &str = "id, external_id, player, status, created_at, updated_at";
const PART_COLUMNS: &str =
    "id, round_id, player, rank, value, submitted, created_at, updated_at";

/// Fields: (id, external_id, player, status, created_at, updated_at)
pub(super) type RoundRow = (i64, i64, String, RoundStatus, String, String);

/// Fields: (id, round_id, player, rank, value, submitted, created_at, updated_at)
type PartRow = (i64, i64, String, Option<i64>, i64, bool, String, String);

pub(super) fn map_round_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RoundRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn map_part_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PartRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| store_err_with("Failed to parse timestamp", e))
}

impl TryFrom<RoundRow> for Round {
    type Error = PlayerError;

    fn try_from(row: RoundRow) -> Result<Self> {
        let (id, external_id, player, status, created_at, updated_at) = row;
        Ok(Round {
            id,
            external_id,
            player,
            status,
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
        })
    }
}

impl TryFrom<PartRow> for Part {
    type Error = PlayerError;

    fn try_from(row: PartRow) -> Result<Self> {
        let (id, round_id, player, rank, value, submitted, created_at, updated_at) = row;
        Ok(Part {
            id,
            round_id,
            player,
            rank,
            value,
            submitted,
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
        })
    }
}

struct ReadPool {
    connections: Vec<Mutex<Connection>>,
    next: AtomicUsize,
}

impl ReadPool {
    fn new(db_path: &Path, size: usize) -> Result<Self> {
        let mut connections = Vec::with_capacity(size);
        for _ in 0..size.max(1) {
            let conn = Connection::open_with_flags(
                db_path,
                rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY
                    | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .map_err(|e| store_err_with("Failed to open read connection", e))?;
            conn.busy_timeout(READ_BUSY_TIMEOUT)
                .map_err(|e| store_err_with("Failed to set busy timeout", e))?;
            connections.push(Mutex::new(conn));
        }
        Ok(Self {
            connections,
            next: AtomicUsize::new(0),
        })
    }

    fn acquire(&self) -> parking_lot::MutexGuard<'_, Connection> {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.connections.len();
        self.connections[idx].lock()
    }
}

struct SqliteStoreInner {
    writer_tx: Sender<WriteCommand>,
    read_pool: ReadPool,
    db_path: PathBuf,
    /// Holds the writer thread handle. Must not be dropped while the store is alive.
    #[allow(dead_code)]
    writer: RoundWriter,
}

#[derive(Clone)]
pub struct SqliteStore {
    inner: Arc<SqliteStoreInner>,
}

impl SqliteStore {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        Self::with_read_pool_size(db_path, DEFAULT_READ_POOL_SIZE)
    }

    pub fn with_read_pool_size(db_path: impl AsRef<Path>, pool_size: usize) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();

        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| store_err_with("Failed to create db directory", e))?;
        }

        let writer = RoundWriter::new(db_path.clone())?;
        let writer_tx = writer.sender();

        let read_pool = ReadPool::new(&db_path, pool_size)?;

        Ok(Self {
            inner: Arc::new(SqliteStoreInner {
                writer_tx,
                read_pool,
                db_path,
                writer,
            }),
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.inner.db_path
    }

    async fn write<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> WriteCommand,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();

        self.inner
            .writer_tx
            .send(build(tx))
            .map_err(|_| store_err("Writer thread disconnected"))?;

        rx.await
            .map_err(|_| store_err("Writer response channel dropped"))?
    }

    async fn read<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);

        tokio::task::spawn_blocking(move || {
            let guard = inner.read_pool.acquire();
            f(&guard)
        })
        .await
        .map_err(|e| store_err_with("Query task failed", e))?
    }

    fn query_round(conn: &Connection, filter: &str, key: i64) -> Result<Option<Round>> {
        let row = conn
            .prepare_cached(&format!(
                "SELECT {} FROM rounds WHERE {} = ?1",
                ROUND_COLUMNS, filter
            ))
            .and_then(|mut stmt| stmt.query_row(params![key], map_round_row).optional())
            .map_err(|e| store_err_with("Failed to query round", e))?;
        row.map(Round::try_from).transpose()
    }
}

#[async_trait]
impl RoundStore for SqliteStore {
    async fn create_round(&self, external_id: i64, player: &str) -> Result<Created> {
        let player = player.to_string();
        self.write(|response| WriteCommand::CreateRound {
            external_id,
            player,
            response,
        })
        .await
    }

    async fn lookup(&self, id: i64) -> Result<Option<Round>> {
        self.read(move |conn| Self::query_round(conn, "id", id))
            .await
    }

    async fn lookup_by_external_id(&self, external_id: i64) -> Result<Option<Round>> {
        self.read(move |conn| Self::query_round(conn, "external_id", external_id))
            .await
    }

    async fn list_rounds(&self) -> Result<Vec<Round>> {
        self.read(|conn| {
            let mut stmt = conn
                .prepare_cached(&format!(
                    "SELECT {} FROM rounds ORDER BY external_id ASC",
                    ROUND_COLUMNS
                ))
                .map_err(|e| store_err_with("Failed to prepare statement", e))?;

            let rows = stmt
                .query_map([], map_round_row)
                .map_err(|e| store_err_with("Failed to query rounds", e))?;

            let mut rounds = Vec::new();
            for row in rows {
                let row = row.map_err(|e| store_err_with("Failed to read row", e))?;
                rounds.push(Round::try_from(row)?);
            }
            Ok(rounds)
        })
        .await
    }

    async fn transition(
        &self,
        round_id: i64,
        from: RoundStatus,
        to: RoundStatus,
        effects: Vec<PartWrite>,
    ) -> Result<Round> {
        self.write(|response| WriteCommand::Transition {
            round_id,
            from,
            to,
            effects,
            response,
        })
        .await
    }

    async fn write_parts(&self, round_id: i64, writes: Vec<PartWrite>) -> Result<()> {
        self.write(|response| WriteCommand::WriteParts {
            round_id,
            writes,
            response,
        })
        .await
    }

    async fn list_parts(&self, round_id: i64) -> Result<Vec<Part>> {
        self.read(move |conn| {
            let mut stmt = conn
                .prepare_cached(&format!(
                    "SELECT {} FROM parts WHERE round_id = ?1 ORDER BY id ASC",
                    PART_COLUMNS
                ))
                .map_err(|e| store_err_with("Failed to prepare statement", e))?;

            let rows = stmt
                .query_map(params![round_id], map_part_row)
                .map_err(|e| store_err_with("Failed to query parts", e))?;

            let mut parts = Vec::new();
            for row in rows {
                let row = row.map_err(|e| store_err_with("Failed to read row", e))?;
                parts.push(Part::try_from(row)?);
            }
            Ok(parts)
        })
        .await
    }

    async fn round_events_after(&self, after: u64, limit: usize) -> Result<Vec<RoundEvent>> {
        self.read(move |conn| {
            let mut stmt = conn
                .prepare_cached(
                    "SELECT ordinal, round_id, status, created_at
                       FROM round_events
                       WHERE ordinal > ?1
                       ORDER BY ordinal ASC
                       LIMIT ?2",
                )
                .map_err(|e| store_err_with("Failed to prepare statement", e))?;

            let rows = stmt
                .query_map(params![after as i64, limit as i64], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, RoundStatus>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })
                .map_err(|e| store_err_with("Failed to query round events", e))?;

            let mut events = Vec::new();
            for row in rows {
                let (ordinal, round_id, status, created_at) =
                    row.map_err(|e| store_err_with("Failed to read row", e))?;
                events.push(RoundEvent {
                    ordinal: ordinal as u64,
                    kind: status,
                    foreign_id: round_id,
                    timestamp: parse_timestamp(&created_at)?,
                });
            }

            debug!(after, count = events.len(), "Round events queried");
            Ok(events)
        })
        .await
    }
}

#[async_trait]
impl CursorStore for SqliteStore {
    async fn get_cursor(&self, stream: &StreamName, consumer: &str) -> Result<Option<u64>> {
        let stream = stream.as_str().to_string();
        let consumer = consumer.to_string();
        self.read(move |conn| {
            conn.query_row(
                "SELECT position FROM cursors WHERE stream_name = ?1 AND consumer_name = ?2",
                params![&stream, &consumer],
                |row| row.get::<_, i64>(0),
            )
            .optional()
            .map(|pos| pos.map(|p| p as u64))
            .map_err(|e| store_err_with("Failed to read cursor", e))
        })
        .await
    }

    async fn set_cursor(&self, stream: &StreamName, consumer: &str, position: u64) -> Result<()> {
        let stream = stream.as_str().to_string();
        let consumer = consumer.to_string();
        self.write(|response| WriteCommand::SetCursor {
            stream,
            consumer,
            position,
            response,
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::NewPart;
    use tempfile::TempDir;

    fn temp_store() -> (TempDir, SqliteStore) {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(dir.path().join("player.db")).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_create_round_is_idempotent() {
        let (_dir, store) = temp_store();

        let first = store.create_round(42, "alice").await.unwrap();
        assert!(first.is_new());
        assert_eq!(first.round().status, RoundStatus::Ready);

        let second = store.create_round(42, "alice").await.unwrap();
        assert!(!second.is_new());
        assert_eq!(second.round().id, first.round().id);

        assert_eq!(store.list_rounds().await.unwrap().len(), 1);
        let events = store.round_events_after(0, 10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, RoundStatus::Ready);
    }

    #[tokio::test]
    async fn test_transition_appends_event() {
        let (_dir, store) = temp_store();
        let round = store.create_round(1, "alice").await.unwrap().round().clone();

        let updated = store
            .transition(round.id, RoundStatus::Ready, RoundStatus::Joined, vec![])
            .await
            .unwrap();
        assert_eq!(updated.status, RoundStatus::Joined);

        let events = store.round_events_after(0, 10).await.unwrap();
        let kinds: Vec<_> = events.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![RoundStatus::Ready, RoundStatus::Joined]);
        assert!(events[0].ordinal < events[1].ordinal);
        assert!(events.iter().all(|e| e.foreign_id == round.id));
    }

    #[tokio::test]
    async fn test_transition_conflict_on_stale_status() {
        let (_dir, store) = temp_store();
        let round = store.create_round(1, "alice").await.unwrap().round().clone();
        store
            .transition(round.id, RoundStatus::Ready, RoundStatus::Joined, vec![])
            .await
            .unwrap();

        let err = store
            .transition(round.id, RoundStatus::Ready, RoundStatus::Joined, vec![])
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        // No event for the failed attempt.
        assert_eq!(store.round_events_after(0, 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_transition_rejects_unknown_edge() {
        let (_dir, store) = temp_store();
        let round = store.create_round(1, "alice").await.unwrap().round().clone();

        let err = store
            .transition(round.id, RoundStatus::Ready, RoundStatus::Submitted, vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, PlayerError::InvalidTransition { .. }));

        let current = store.lookup_required(round.id).await.unwrap();
        assert_eq!(current.status, RoundStatus::Ready);
    }

    #[tokio::test]
    async fn test_failed_transition_rolls_back_parts() {
        let (_dir, store) = temp_store();
        let round = store.create_round(1, "alice").await.unwrap().round().clone();

        let err = store
            .transition(
                round.id,
                RoundStatus::Collecting,
                RoundStatus::Collected,
                vec![PartWrite::Upsert(NewPart::ranked("alice", 10, 1))],
            )
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert!(store.list_parts(round.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_part_upsert_rank_set_once() {
        let (_dir, store) = temp_store();
        let round = store.create_round(1, "alice").await.unwrap().round().clone();

        store
            .write_parts(round.id, vec![PartWrite::Upsert(NewPart::new("bob", 7))])
            .await
            .unwrap();
        store
            .write_parts(round.id, vec![PartWrite::Upsert(NewPart::new("BOB", 99))])
            .await
            .unwrap();

        let parts = store.list_parts(round.id).await.unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].value, 7);
        assert_eq!(parts[0].rank, None);

        store
            .write_parts(round.id, vec![PartWrite::Upsert(NewPart::ranked("bob", 8, 3))])
            .await
            .unwrap();
        store
            .write_parts(round.id, vec![PartWrite::Upsert(NewPart::ranked("bob", 1, 1))])
            .await
            .unwrap();

        let part = store.find_part(round.id, "bob").await.unwrap().unwrap();
        assert_eq!(part.rank, Some(3));
        assert_eq!(part.value, 7);
    }

    #[tokio::test]
    async fn test_mark_submitted_is_monotonic() {
        let (_dir, store) = temp_store();
        let round = store.create_round(1, "alice").await.unwrap().round().clone();
        store
            .write_parts(
                round.id,
                vec![
                    PartWrite::Upsert(NewPart::new("bob", 7)),
                    PartWrite::MarkSubmitted {
                        player: "bob".into(),
                    },
                ],
            )
            .await
            .unwrap();
        store
            .write_parts(round.id, vec![PartWrite::Upsert(NewPart::ranked("bob", 7, 2))])
            .await
            .unwrap();

        let part = store.find_part(round.id, "bob").await.unwrap().unwrap();
        assert!(part.submitted);
        assert_eq!(part.rank, Some(2));
    }

    #[tokio::test]
    async fn test_cursor_only_moves_forward() {
        let (_dir, store) = temp_store();
        let stream = StreamName::engine();

        assert_eq!(store.get_cursor(&stream, "join").await.unwrap(), None);

        store.set_cursor(&stream, "join", 5).await.unwrap();
        store.set_cursor(&stream, "join", 3).await.unwrap();
        assert_eq!(store.get_cursor(&stream, "join").await.unwrap(), Some(5));

        assert_eq!(
            store.get_cursor(&StreamName::local(), "join").await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_concurrent_creates_single_row() {
        let (_dir, store) = temp_store();

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.create_round(9, "alice").await })
            })
            .collect();

        let results = futures::future::join_all(handles).await;
        let new_count = results
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .filter(Created::is_new)
            .count();
        assert_eq!(new_count, 1);
        assert_eq!(store.list_rounds().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_part_upserts_single_row() {
        let (_dir, store) = temp_store();
        let round = store.create_round(9, "alice").await.unwrap().round().clone();

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let store = store.clone();
                let part = if i % 2 == 0 {
                    NewPart::new("bob", 7)
                } else {
                    NewPart::ranked("BOB", 7, i)
                };
                tokio::spawn(async move {
                    store
                        .write_parts(round.id, vec![PartWrite::Upsert(part)])
                        .await
                })
            })
            .collect();

        for result in futures::future::join_all(handles).await {
            result.unwrap().unwrap();
        }

        let parts = store.list_parts(round.id).await.unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].value, 7);
        assert!(parts[0].is_ranked());
    }

    #[tokio::test]
    async fn test_reopen_keeps_state() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("player.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.create_round(3, "alice").await.unwrap();
            store
                .set_cursor(&StreamName::local(), "join_rounds", 1)
                .await
                .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let round = store.lookup_by_external_id(3).await.unwrap().unwrap();
        assert_eq!(round.status, RoundStatus::Ready);
        assert_eq!(
            store
                .get_cursor(&StreamName::local(), "join_rounds")
                .await
                .unwrap(),
            Some(1)
        );
    }
}
