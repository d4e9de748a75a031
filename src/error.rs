use thiserror::Error;

use crate::state::RoundStatus;

/// Named outcomes reported by the engine.
///
/// Several of these are not failures from the player's point of view: a
/// redelivered join or submit hits `AlreadyJoined` / `AlreadySubmitted` and
/// must be treated as the call having landed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("match already active")]
    ActiveMatch,

    #[error("player already joined round")]
    AlreadyJoined,

    #[error("join out of sync with round state")]
    OutOfSyncJoin,

    #[error("player already excluded from round")]
    AlreadyExcluded,

    #[error("player excluded from collect")]
    ExcludedCollect,

    #[error("player already submitted round")]
    AlreadySubmitted,

    #[error("engine rejected request ({code}): {message}")]
    Rejected { code: String, message: String },

    #[error("engine unavailable: {0}")]
    Unavailable(String),
}

impl EngineError {
    /// Join outcomes that mean the join already landed (or can never land
    /// again), so the local round may advance.
    pub fn is_idempotent_join(&self) -> bool {
        matches!(
            self,
            Self::AlreadyJoined | Self::OutOfSyncJoin | Self::AlreadyExcluded
        )
    }

    pub fn is_idempotent_submit(&self) -> bool {
        matches!(self, Self::AlreadySubmitted)
    }

    pub fn is_excluded_collect(&self) -> bool {
        matches!(self, Self::ExcludedCollect)
    }

    pub fn is_active_match(&self) -> bool {
        matches!(self, Self::ActiveMatch)
    }

    /// Stable wire code, shared with the engine's error responses.
    pub fn code(&self) -> &str {
        match self {
            Self::ActiveMatch => "active_match",
            Self::AlreadyJoined => "already_joined",
            Self::OutOfSyncJoin => "out_of_sync_join",
            Self::AlreadyExcluded => "already_excluded",
            Self::ExcludedCollect => "excluded_collect",
            Self::AlreadySubmitted => "already_submitted",
            Self::Rejected { code, .. } => code,
            Self::Unavailable(_) => "unavailable",
        }
    }

    pub fn from_code(code: &str, message: impl Into<String>) -> Self {
        match code {
            "active_match" => Self::ActiveMatch,
            "already_joined" => Self::AlreadyJoined,
            "out_of_sync_join" => Self::OutOfSyncJoin,
            "already_excluded" => Self::AlreadyExcluded,
            "excluded_collect" => Self::ExcludedCollect,
            "already_submitted" => Self::AlreadySubmitted,
            "unavailable" => Self::Unavailable(message.into()),
            other => Self::Rejected {
                code: other.to_string(),
                message: message.into(),
            },
        }
    }
}

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("Round not found: {0}")]
    RoundNotFound(String),

    #[error("Round {round_id} status conflict: expected {expected}, got {actual}")]
    Conflict {
        round_id: i64,
        expected: RoundStatus,
        actual: RoundStatus,
    },

    #[error("Invalid round transition: {from} → {to} (allowed: {allowed})")]
    InvalidTransition {
        from: RoundStatus,
        to: RoundStatus,
        allowed: String,
    },

    /// The event is valid but arrived before the round caught up with it.
    #[error("Round not ready: {0}")]
    NotReady(String),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Peer {peer} error: {message}")]
    Peer { peer: String, message: String },

    #[error("RPC error ({code}): {message}")]
    Rpc { code: String, message: String },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl PlayerError {
    pub fn peer(peer: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Peer {
            peer: peer.into(),
            message: message.to_string(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::RoundNotFound(_))
    }

    /// Engine outcome carried by this error, if any.
    pub fn engine(&self) -> Option<&EngineError> {
        match self {
            Self::Engine(e) => Some(e),
            _ => None,
        }
    }

    /// Stable code used on the peer wire.
    pub fn code(&self) -> &str {
        match self {
            Self::RoundNotFound(_) => "round_not_found",
            Self::Conflict { .. } => "conflict",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::NotReady(_) => "not_ready",
            Self::Engine(e) => e.code(),
            Self::Peer { .. } => "peer",
            Self::Rpc { code, .. } => code,
            Self::Store(_) => "store",
            Self::Config(_) => "config",
            Self::Timeout(_) => "timeout",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
            Self::Toml(_) => "toml",
        }
    }
}

pub type Result<T> = std::result::Result<T, PlayerError>;

pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idempotent_join_outcomes() {
        assert!(EngineError::AlreadyJoined.is_idempotent_join());
        assert!(EngineError::OutOfSyncJoin.is_idempotent_join());
        assert!(EngineError::AlreadyExcluded.is_idempotent_join());
        assert!(!EngineError::ExcludedCollect.is_idempotent_join());
        assert!(!EngineError::Unavailable("down".into()).is_idempotent_join());
    }

    #[test]
    fn test_engine_code_roundtrip() {
        for err in [
            EngineError::ActiveMatch,
            EngineError::AlreadyJoined,
            EngineError::OutOfSyncJoin,
            EngineError::AlreadyExcluded,
            EngineError::ExcludedCollect,
            EngineError::AlreadySubmitted,
        ] {
            assert_eq!(EngineError::from_code(err.code(), ""), err);
        }

        let unknown = EngineError::from_code("no_such_round", "round 9 unknown");
        assert_eq!(
            unknown,
            EngineError::Rejected {
                code: "no_such_round".into(),
                message: "round 9 unknown".into(),
            }
        );
    }

    #[test]
    fn test_conflict_display() {
        let err = PlayerError::Conflict {
            round_id: 7,
            expected: RoundStatus::Joined,
            actual: RoundStatus::Collecting,
        };
        assert!(err.is_conflict());
        assert_eq!(
            err.to_string(),
            "Round 7 status conflict: expected Joined, got Collecting"
        );
    }
}
