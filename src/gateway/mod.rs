//! Outbound seams to the engine and to sibling players.
//!
//! - `EngineGateway`: the authoritative game engine
//! - `PeerGateway`: a sibling player, served locally by `PeerService`
//! - `EngineClient` / `PeerClient`: line-delimited JSON clients
//! - `PeerServer`: exposes this player's `PeerService` to siblings

mod engine;
mod peer;
mod rpc;
mod server;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{EngineResult, Result};
use crate::state::{EngineEvent, Part, Round, RoundEvent};

pub use engine::{EngineClient, EngineRequest};
pub use peer::{PeerClient, PeerRequest, PeerService};
pub use rpc::{ErrorPayload, Response};
pub use server::PeerServer;

/// One player's share of a collected round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    pub player: String,
    pub value: i64,
}

/// Engine reply to a collect call: every contributor's value plus this
/// player's rank for the round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub contributions: Vec<Contribution>,
    pub rank: i64,
}

#[async_trait]
pub trait EngineGateway: Send + Sync {
    async fn start_match(&self, team: &str, players: u32) -> EngineResult<()>;

    /// Returns false when the engine accepted the call but did not let the
    /// player in.
    async fn join_round(&self, team: &str, player: &str, external_id: i64) -> EngineResult<bool>;

    async fn collect_round(
        &self,
        team: &str,
        player: &str,
        external_id: i64,
    ) -> EngineResult<Collection>;

    async fn submit_round(
        &self,
        team: &str,
        player: &str,
        external_id: i64,
        total: i64,
    ) -> EngineResult<()>;

    async fn events_after(&self, cursor: u64, limit: usize) -> EngineResult<Vec<EngineEvent>>;
}

#[async_trait]
pub trait PeerGateway: Send + Sync {
    fn name(&self) -> &str;

    /// The peer's local round-transition stream.
    async fn events_after(&self, cursor: u64, limit: usize) -> Result<Vec<RoundEvent>>;

    /// Every part the peer holds for the engine round.
    async fn get_parts(&self, external_id: i64) -> Result<Vec<Part>>;

    /// The peer's round by its own local id, as carried in its events.
    async fn get_round(&self, round_id: i64) -> Result<Round>;

    async fn ping(&self) -> Result<()>;
}
