pub mod cli;
pub mod config;
pub mod consumer;
pub mod coordination;
pub mod error;
pub mod gateway;
pub mod node;
pub mod output;
pub mod state;

pub use config::PlayerConfig;
pub use consumer::{Consumer, ConsumerRuntime, EventSource, Flow};
pub use coordination::{Coordinator, Player};
pub use error::{EngineError, PlayerError, Result};
pub use gateway::{EngineGateway, PeerGateway, PeerService};
pub use node::{PlayerNode, RunningNode};
pub use state::{Part, Round, RoundStatus, RoundStore, SqliteStore};
