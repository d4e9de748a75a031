//! Stream events.
//!
//! Every stream (local round transitions, engine notifications, a peer's
//! round transitions) carries the same envelope; only the type differs.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::RoundStatus;

/// An immutable fact on one stream.
///
/// `ordinal` is strictly increasing within its stream. `foreign_id` names the
/// entity the fact is about: a local round id on round streams, an external
/// round id on the engine stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event<K> {
    pub ordinal: u64,
    #[serde(rename = "type")]
    pub kind: K,
    pub foreign_id: i64,
    pub timestamp: DateTime<Utc>,
}

impl<K> Event<K> {
    pub fn new(ordinal: u64, kind: K, foreign_id: i64) -> Self {
        Self {
            ordinal,
            kind,
            foreign_id,
            timestamp: Utc::now(),
        }
    }
}

impl<K: PartialEq> Event<K> {
    pub fn is(&self, kind: &K) -> bool {
        self.kind == *kind
    }
}

/// Round status change on this player's (or a peer's) local stream.
pub type RoundEvent = Event<RoundStatus>;

/// Notification from the engine, keyed by external round id.
pub type EngineEvent = Event<EngineEventType>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineEventType {
    MatchStarted,
    RoundOpen,
    RoundCollectReady,
    RoundSubmitReady,
    RoundSucceeded,
    RoundFailed,
    MatchEnded,
    /// Anything this player does not understand; always skipped.
    #[serde(other)]
    Unknown,
}

impl EngineEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MatchStarted => "match_started",
            Self::RoundOpen => "round_open",
            Self::RoundCollectReady => "round_collect_ready",
            Self::RoundSubmitReady => "round_submit_ready",
            Self::RoundSucceeded => "round_succeeded",
            Self::RoundFailed => "round_failed",
            Self::MatchEnded => "match_ended",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_round_complete(&self) -> bool {
        matches!(self, Self::RoundSucceeded | Self::RoundFailed)
    }
}

impl fmt::Display for EngineEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identity of a stream for cursor bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamName(String);

impl StreamName {
    pub fn engine() -> Self {
        Self("engine".into())
    }

    pub fn local() -> Self {
        Self("local".into())
    }

    /// Keyed by the lowercased name, matching case-insensitive part ownership.
    pub fn peer(name: &str) -> Self {
        Self(format!("peer:{}", name.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
