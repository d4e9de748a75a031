//! Dedicated writer thread for the SQLite round store.
//!
//! All mutations are serialized through one connection, so round events are
//! committed in ordinal order and a reader never sees a gap that later fills.

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use super::machine::describe_allowed;
use super::model::{Created, PartWrite, Round};
use super::sqlite::{ROUND_COLUMNS, map_round_row};
use super::{RoundStatus, store_err, store_err_with};
use crate::error::{PlayerError, Result};

const SCHEMA_VERSION: i64 = 1;

pub(super) enum WriteCommand {
    CreateRound {
        external_id: i64,
        player: String,
        response: oneshot::Sender<Result<Created>>,
    },
    Transition {
        round_id: i64,
        from: RoundStatus,
        to: RoundStatus,
        effects: Vec<PartWrite>,
        response: oneshot::Sender<Result<Round>>,
    },
    WriteParts {
        round_id: i64,
        writes: Vec<PartWrite>,
        response: oneshot::Sender<Result<()>>,
    },
    SetCursor {
        stream: String,
        consumer: String,
        position: u64,
        response: oneshot::Sender<Result<()>>,
    },
    Shutdown,
}

pub(super) struct RoundWriter {
    tx: Sender<WriteCommand>,
    handle: Option<JoinHandle<()>>,
}

impl RoundWriter {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<WriteCommand>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();

        let handle = thread::Builder::new()
            .name("round-writer".into())
            .spawn(move || match Self::init_db(&db_path) {
                Ok(conn) => {
                    let _ = ready_tx.send(Ok(()));
                    Self::process_commands(&conn, rx);
                }
                Err(e) => {
                    error!(error = %e, "Round writer init failed");
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| store_err_with("Failed to spawn writer thread", e))?;

        ready_rx
            .recv()
            .map_err(|_| store_err("Writer thread died during init"))??;

        Ok(Self {
            tx,
            handle: Some(handle),
        })
    }

    pub fn sender(&self) -> Sender<WriteCommand> {
        self.tx.clone()
    }

    fn init_db(db_path: &PathBuf) -> Result<Connection> {
        let conn =
            Connection::open(db_path).map_err(|e| store_err_with("Failed to open database", e))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .map_err(|e| store_err_with("Failed to enable WAL", e))?;
        Self::init_schema(&conn)?;
        Ok(conn)
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS rounds (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                external_id INTEGER NOT NULL UNIQUE,
                player TEXT NOT NULL,
                status INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS parts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                round_id INTEGER NOT NULL REFERENCES rounds(id),
                player TEXT NOT NULL COLLATE NOCASE,
                rank INTEGER,
                value INTEGER NOT NULL,
                submitted INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (round_id, player)
            );

            CREATE TABLE IF NOT EXISTS round_events (
                ordinal INTEGER PRIMARY KEY AUTOINCREMENT,
                round_id INTEGER NOT NULL,
                status INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_round_events_round
                ON round_events(round_id);

            CREATE TABLE IF NOT EXISTS cursors (
                stream_name TEXT NOT NULL,
                consumer_name TEXT NOT NULL,
                position INTEGER NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (stream_name, consumer_name)
            );

            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            );
            ",
        )
        .map_err(|e| store_err_with("Failed to init schema", e))?;

        conn.execute(
            "INSERT OR IGNORE INTO schema_version VALUES (?1)",
            params![SCHEMA_VERSION],
        )
        .map_err(|e| store_err_with("Failed to record schema version", e))?;

        Ok(())
    }

    fn process_commands(conn: &Connection, rx: Receiver<WriteCommand>) {
        for cmd in rx {
            match cmd {
                WriteCommand::CreateRound {
                    external_id,
                    player,
                    response,
                } => {
                    let _ = response.send(Self::create_round(conn, external_id, &player));
                }
                WriteCommand::Transition {
                    round_id,
                    from,
                    to,
                    effects,
                    response,
                } => {
                    let _ = response.send(Self::transition(conn, round_id, from, to, &effects));
                }
                WriteCommand::WriteParts {
                    round_id,
                    writes,
                    response,
                } => {
                    let _ = response.send(Self::write_parts(conn, round_id, &writes));
                }
                WriteCommand::SetCursor {
                    stream,
                    consumer,
                    position,
                    response,
                } => {
                    let _ = response.send(Self::set_cursor(conn, &stream, &consumer, position));
                }
                WriteCommand::Shutdown => {
                    debug!("Writer thread received shutdown signal");
                    break;
                }
            }
        }
    }

    fn create_round(conn: &Connection, external_id: i64, player: &str) -> Result<Created> {
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| store_err_with("Failed to start transaction", e))?;

        if let Some(existing) = Self::round_by_external_id(&tx, external_id)? {
            return Ok(Created::Existing(existing));
        }

        let now = Utc::now().to_rfc3339();
        tx.execute(
            "INSERT INTO rounds (external_id, player, status, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?4)",
            params![external_id, player, RoundStatus::Ready, &now],
        )
        .map_err(|e| store_err_with("Failed to insert round", e))?;
        let round_id = tx.last_insert_rowid();

        Self::append_event(&tx, round_id, RoundStatus::Ready, &now)?;
        let round = Self::round_by_id(&tx, round_id)?
            .ok_or_else(|| store_err("Inserted round vanished"))?;

        tx.commit()
            .map_err(|e| store_err_with("Failed to commit", e))?;

        debug!(round_id, external_id, "Round created");
        Ok(Created::New(round))
    }

    fn transition(
        conn: &Connection,
        round_id: i64,
        from: RoundStatus,
        to: RoundStatus,
        effects: &[PartWrite],
    ) -> Result<Round> {
        if !from.can_transition_to(to) {
            return Err(PlayerError::InvalidTransition {
                from,
                to,
                allowed: describe_allowed(from),
            });
        }

        let tx = conn
            .unchecked_transaction()
            .map_err(|e| store_err_with("Failed to start transaction", e))?;

        let actual: RoundStatus = tx
            .query_row(
                "SELECT status FROM rounds WHERE id = ?1",
                params![round_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| store_err_with("Failed to read round status", e))?
            .ok_or_else(|| PlayerError::RoundNotFound(format!("id {}", round_id)))?;

        if actual != from {
            return Err(PlayerError::Conflict {
                round_id,
                expected: from,
                actual,
            });
        }

        let now = Utc::now().to_rfc3339();
        Self::apply_part_writes(&tx, round_id, effects, &now)?;

        tx.execute(
            "UPDATE rounds SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![to, &now, round_id],
        )
        .map_err(|e| store_err_with("Failed to update round status", e))?;

        let ordinal = Self::append_event(&tx, round_id, to, &now)?;
        let round = Self::round_by_id(&tx, round_id)?
            .ok_or_else(|| PlayerError::RoundNotFound(format!("id {}", round_id)))?;

        tx.commit()
            .map_err(|e| store_err_with("Failed to commit", e))?;

        debug!(round_id, %from, %to, ordinal, "Round transitioned");
        Ok(round)
    }

    fn write_parts(conn: &Connection, round_id: i64, writes: &[PartWrite]) -> Result<()> {
        if writes.is_empty() {
            return Ok(());
        }

        let tx = conn
            .unchecked_transaction()
            .map_err(|e| store_err_with("Failed to start transaction", e))?;

        let now = Utc::now().to_rfc3339();
        Self::apply_part_writes(&tx, round_id, writes, &now)?;

        tx.commit()
            .map_err(|e| store_err_with("Failed to commit parts", e))?;

        debug!(round_id, count = writes.len(), "Parts written");
        Ok(())
    }

    fn apply_part_writes(
        tx: &Transaction<'_>,
        round_id: i64,
        writes: &[PartWrite],
        now: &str,
    ) -> Result<()> {
        for write in writes {
            match write {
                PartWrite::Upsert(part) => {
                    // Value is fixed at insert; only a missing rank may be attached.
                    tx.execute(
                        "INSERT INTO parts (round_id, player, rank, value, submitted, created_at, updated_at)
                           VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5)
                         ON CONFLICT (round_id, player) DO UPDATE SET
                           updated_at = CASE WHEN parts.rank IS NULL AND excluded.rank IS NOT NULL
                                        THEN excluded.updated_at ELSE parts.updated_at END,
                           rank = COALESCE(parts.rank, excluded.rank)",
                        params![round_id, &part.player, part.rank, part.value, now],
                    )
                    .map_err(|e| store_err_with("Failed to upsert part", e))?;
                }
                PartWrite::MarkSubmitted { player } => {
                    tx.execute(
                        "UPDATE parts SET submitted = 1, updated_at = ?3
                           WHERE round_id = ?1 AND player = ?2 AND submitted = 0",
                        params![round_id, player, now],
                    )
                    .map_err(|e| store_err_with("Failed to mark part submitted", e))?;
                }
            }
        }
        Ok(())
    }

    fn set_cursor(conn: &Connection, stream: &str, consumer: &str, position: u64) -> Result<()> {
        conn.execute(
            "INSERT INTO cursors (stream_name, consumer_name, position, updated_at)
               VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (stream_name, consumer_name) DO UPDATE SET
               position = MAX(cursors.position, excluded.position),
               updated_at = excluded.updated_at",
            params![stream, consumer, position as i64, Utc::now().to_rfc3339()],
        )
        .map_err(|e| store_err_with("Failed to store cursor", e))?;
        Ok(())
    }

    fn append_event(
        tx: &Transaction<'_>,
        round_id: i64,
        status: RoundStatus,
        now: &str,
    ) -> Result<i64> {
        tx.execute(
            "INSERT INTO round_events (round_id, status, created_at) VALUES (?1, ?2, ?3)",
            params![round_id, status, now],
        )
        .map_err(|e| store_err_with("Failed to append round event", e))?;
        Ok(tx.last_insert_rowid())
    }

    fn round_by_id(tx: &Transaction<'_>, id: i64) -> Result<Option<Round>> {
        let row = tx
            .query_row(
                &format!("SELECT {} FROM rounds WHERE id = ?1", ROUND_COLUMNS),
                params![id],
                map_round_row,
            )
            .optional()
            .map_err(|e| store_err_with("Failed to read round", e))?;
        row.map(Round::try_from).transpose()
    }

    fn round_by_external_id(tx: &Transaction<'_>, external_id: i64) -> Result<Option<Round>> {
        let row = tx
            .query_row(
                &format!("SELECT {} FROM rounds WHERE external_id = ?1", ROUND_COLUMNS),
                params![external_id],
                map_round_row,
            )
            .optional()
            .map_err(|e| store_err_with("Failed to read round", e))?;
        row.map(Round::try_from).transpose()
    }
}

impl Drop for RoundWriter {
    fn drop(&mut self) {
        let _ = self.tx.send(WriteCommand::Shutdown);
        if let Some(handle) = self.handle.take()
            && let Err(e) = handle.join()
        {
            warn!("Writer thread panicked: {:?}", e);
        }
    }
}
