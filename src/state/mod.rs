//! Durable round state: status machine, part ledger, streams and cursors.

mod events;
mod machine;
mod model;
mod sqlite;
mod store;
mod writer;

use crate::error::PlayerError;

fn store_err(msg: impl std::fmt::Display) -> PlayerError {
    PlayerError::Store(msg.to_string())
}

fn store_err_with<E: std::fmt::Display>(context: &str, err: E) -> PlayerError {
    PlayerError::Store(format!("{}: {}", context, err))
}

pub use events::{EngineEvent, EngineEventType, Event, RoundEvent, StreamName};
pub use machine::RoundStatus;
pub use model::{Created, NewPart, Part, PartWrite, Round};
pub use sqlite::{DEFAULT_READ_POOL_SIZE, SqliteStore};
pub use store::{CursorStore, RoundStore};
