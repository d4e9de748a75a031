//! Shared fixtures for integration tests.
#![allow(dead_code)]

pub mod engine;

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use round_player::consumer::{BackoffPolicy, RuntimeSettings};
use round_player::gateway::EngineGateway;
use round_player::state::{Round, RoundStatus, RoundStore, SqliteStore};
use round_player::Player;

pub use engine::{EngineCall, ScriptedEngine, collection};

/// A player over a fresh on-disk store.
pub struct PlayerFixture {
    pub dir: TempDir,
    pub store: Arc<SqliteStore>,
    pub player: Arc<Player>,
}

impl PlayerFixture {
    pub fn new(name: &str, team: &str, engine: Arc<ScriptedEngine>) -> Self {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteStore::open(dir.path().join(format!("{name}.db"))).unwrap());
        let engine: Arc<dyn EngineGateway> = engine;
        let player = Arc::new(Player::new(name, team, store.clone(), engine));
        Self { dir, store, player }
    }

    pub async fn round(&self, external_id: i64) -> Round {
        self.store
            .lookup_by_external_id(external_id)
            .await
            .unwrap()
            .expect("round should exist")
    }

    pub async fn status(&self, external_id: i64) -> Option<RoundStatus> {
        self.store
            .lookup_by_external_id(external_id)
            .await
            .unwrap()
            .map(|r| r.status)
    }
}

/// Runtime settings tight enough for tests to settle quickly.
pub fn fast_settings() -> RuntimeSettings {
    RuntimeSettings {
        batch_size: 16,
        poll_interval: Duration::from_millis(10),
        backoff: BackoffPolicy {
            base: Duration::from_millis(5),
            max: Duration::from_millis(50),
        },
    }
}

/// Polls `store` until the round for `external_id` reaches `status`.
pub async fn wait_for_status(
    store: &dyn RoundStore,
    external_id: i64,
    status: RoundStatus,
    timeout: Duration,
) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(round) = store.lookup_by_external_id(external_id).await.unwrap()
            && round.status == status
        {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
