//! Round coordination: the stream consumers that move rounds through their
//! lifecycle and the submission barrier between players.
//!
//! - Engine notifications (`notify_*`) project engine rounds into local rounds
//! - Local transitions (`join_rounds`, `collect_parts`, `submit_parts`) call
//!   the engine and advance the round
//! - Peer transitions (`collect_peer_parts`, `acknowledge_peer_submissions`)
//!   replicate siblings' parts and feed the barrier

mod barrier;
mod engine;
mod local;
mod loops;
mod peer;

use std::sync::Arc;

use crate::gateway::EngineGateway;
use crate::state::RoundStore;

pub use engine::{NotifyRoundComplete, NotifyToCollect, NotifyToJoin, NotifyToSubmit};
pub use local::{CollectParts, JoinRounds, SubmitParts};
pub use loops::{Coordinator, ping_peers, start_match_forever};
pub use peer::{AcknowledgePeerSubmissions, CollectPeerParts};

pub const CONSUMER_NOTIFY_TO_JOIN: &str = "notify_to_join";
pub const CONSUMER_NOTIFY_TO_COLLECT: &str = "notify_to_collect";
pub const CONSUMER_NOTIFY_TO_SUBMIT: &str = "notify_to_submit";
pub const CONSUMER_NOTIFY_ROUND_COMPLETE: &str = "notify_round_complete";
pub const CONSUMER_JOIN_ROUNDS: &str = "join_rounds";
pub const CONSUMER_COLLECT_PARTS: &str = "collect_parts";
pub const CONSUMER_SUBMIT_PARTS: &str = "submit_parts";
pub const CONSUMER_COLLECT_PEER_PARTS: &str = "collect_peer_parts";
pub const CONSUMER_ACK_PEER_SUBMISSIONS: &str = "acknowledge_peer_submissions";

/// Identity and dependencies shared by every handler.
pub struct Player {
    name: String,
    team: String,
    store: Arc<dyn RoundStore>,
    engine: Arc<dyn EngineGateway>,
}

impl Player {
    pub fn new(
        name: impl Into<String>,
        team: impl Into<String>,
        store: Arc<dyn RoundStore>,
        engine: Arc<dyn EngineGateway>,
    ) -> Self {
        Self {
            name: name.into(),
            team: team.into(),
            store,
            engine,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn team(&self) -> &str {
        &self.team
    }

    pub fn store(&self) -> &Arc<dyn RoundStore> {
        &self.store
    }

    pub fn engine(&self) -> &Arc<dyn EngineGateway> {
        &self.engine
    }

    pub fn is_self(&self, player: &str) -> bool {
        self.name.eq_ignore_ascii_case(player)
    }
}
