use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::consumer::{BackoffPolicy, RuntimeSettings};
use crate::error::{PlayerError, Result};
use crate::state::DEFAULT_READ_POOL_SIZE;

pub const DEFAULT_CONFIG_FILE: &str = "round-player.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub player: PlayerIdentity,
    pub engine: EngineConfig,
    pub store: StoreConfig,
    pub consumer: ConsumerConfig,
    pub server: ServerConfig,
    pub matchmaking: MatchmakingConfig,
    /// Sibling players. Each `name` must match the name that peer plays as.
    pub peers: Vec<PeerConfig>,
}

impl PlayerConfig {
    /// Loads `path`, falling back to defaults when the file does not exist.
    pub async fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = fs::read_to_string(path).await?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        let content = self.to_toml()?;
        fs::write(path, content).await?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| PlayerError::Config(e.to_string()))
    }

    /// Total players in the match: every peer plus this one.
    pub fn match_size(&self) -> u32 {
        self.peers.len() as u32 + 1
    }

    pub fn runtime_settings(&self) -> RuntimeSettings {
        RuntimeSettings {
            batch_size: self.consumer.batch_size,
            poll_interval: Duration::from_millis(self.consumer.poll_interval_ms),
            backoff: BackoffPolicy {
                base: Duration::from_millis(self.consumer.backoff_initial_ms),
                max: Duration::from_millis(self.consumer.backoff_max_ms),
            },
        }
    }

    pub fn match_retry(&self) -> BackoffPolicy {
        BackoffPolicy {
            base: Duration::from_millis(self.matchmaking.retry_delay_ms),
            max: Duration::from_millis(self.matchmaking.retry_delay_ms.saturating_mul(8)),
        }
    }

    /// Validate configuration values for consistency and safety.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.player.name.trim().is_empty() {
            errors.push("player.name must not be empty".into());
        }
        if self.player.team.trim().is_empty() {
            errors.push("player.team must not be empty".into());
        }

        if self.engine.address.is_empty() {
            errors.push("engine.address must not be empty".into());
        }
        if self.engine.request_timeout_secs == 0 {
            errors.push("engine.request_timeout_secs must be greater than 0".into());
        }

        if self.store.read_pool_size == 0 {
            errors.push("store.read_pool_size must be greater than 0".into());
        }

        if self.consumer.batch_size == 0 {
            errors.push("consumer.batch_size must be greater than 0".into());
        }
        if self.consumer.backoff_initial_ms == 0 {
            errors.push("consumer.backoff_initial_ms must be greater than 0".into());
        }
        if self.consumer.backoff_initial_ms > self.consumer.backoff_max_ms {
            errors.push("consumer.backoff_initial_ms must not exceed backoff_max_ms".into());
        }

        if self.server.listen_address.is_empty() {
            errors.push("server.listen_address must not be empty".into());
        }
        if self.server.request_timeout_secs == 0 {
            errors.push("server.request_timeout_secs must be greater than 0".into());
        }

        for (i, peer) in self.peers.iter().enumerate() {
            if peer.name.trim().is_empty() {
                errors.push(format!("peers[{}].name must not be empty", i));
            }
            if peer.address.is_empty() {
                errors.push(format!("peers[{}].address must not be empty", i));
            }
            if peer.name.eq_ignore_ascii_case(&self.player.name) {
                errors.push(format!("peers[{}] must not be this player", i));
            }
            if self.peers[..i]
                .iter()
                .any(|p| p.name.eq_ignore_ascii_case(&peer.name))
            {
                errors.push(format!("peers[{}].name '{}' is duplicated", i, peer.name));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(PlayerError::Config(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerIdentity {
    /// Name this player joins rounds as.
    pub name: String,
    pub team: String,
}

impl Default for PlayerIdentity {
    fn default() -> Self {
        Self {
            name: "player".into(),
            team: "team".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub address: String,
    pub request_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:7400".into(),
            request_timeout_secs: 10,
        }
    }
}

impl EngineConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerConfig {
    pub name: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub db_path: PathBuf,
    pub read_pool_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("round-player.db"),
            read_pool_size: DEFAULT_READ_POOL_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    pub batch_size: usize,
    pub poll_interval_ms: u64,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            poll_interval_ms: 250,
            backoff_initial_ms: 100,
            backoff_max_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_address: String,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: "127.0.0.1:7500".into(),
            request_timeout_secs: 10,
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchmakingConfig {
    /// Ask the engine to start a match on `run`.
    pub start_match: bool,
    pub retry_delay_ms: u64,
}

impl Default for MatchmakingConfig {
    fn default() -> Self {
        Self {
            start_match: true,
            retry_delay_ms: 1_000,
        }
    }
}
