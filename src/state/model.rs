use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::RoundStatus;

/// A player's local view of one engine round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    pub id: i64,
    /// Round id on the engine.
    pub external_id: i64,
    pub player: String,
    pub status: RoundStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One contributor's value for a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    pub id: i64,
    pub round_id: i64,
    /// Owner of the value, self or a peer.
    pub player: String,
    /// Only known once the owner has collected from the engine.
    pub rank: Option<i64>,
    pub value: i64,
    pub submitted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Part {
    pub fn is_ranked(&self) -> bool {
        self.rank.is_some()
    }

    pub fn belongs_to(&self, player: &str) -> bool {
        self.player.eq_ignore_ascii_case(player)
    }
}

/// A part about to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPart {
    pub player: String,
    pub value: i64,
    pub rank: Option<i64>,
}

impl NewPart {
    pub fn new(player: impl Into<String>, value: i64) -> Self {
        Self {
            player: player.into(),
            value,
            rank: None,
        }
    }

    pub fn ranked(player: impl Into<String>, value: i64, rank: i64) -> Self {
        Self {
            player: player.into(),
            value,
            rank: Some(rank),
        }
    }
}

impl From<&Part> for NewPart {
    fn from(part: &Part) -> Self {
        Self {
            player: part.player.clone(),
            value: part.value,
            rank: part.rank,
        }
    }
}

/// Part-ledger effect committed in the same transaction as a status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartWrite {
    /// Insert-if-absent; a ranked write attaches its rank to an unranked
    /// row. The stored value and an existing rank are never replaced.
    Upsert(NewPart),
    MarkSubmitted { player: String },
}

/// Result of announcing a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Created {
    New(Round),
    Existing(Round),
}

impl Created {
    pub fn round(&self) -> &Round {
        match self {
            Self::New(r) | Self::Existing(r) => r,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Self::New(_))
    }
}
