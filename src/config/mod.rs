//! Configuration types and loading.
//!
//! `PlayerConfig` is read from a TOML file; every section has defaults and the
//! whole file is validated at once.

mod settings;

pub use settings::{
    ConsumerConfig, DEFAULT_CONFIG_FILE, EngineConfig, MatchmakingConfig, PeerConfig,
    PlayerConfig, PlayerIdentity, ServerConfig, StoreConfig,
};
