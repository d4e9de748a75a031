use std::fmt;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput};
use serde::{Deserialize, Serialize};

/// Status of a player's local view of one round.
///
/// Declaration order is lifecycle order; `Ord` relies on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    /// Announced by the engine; the player should join.
    Ready,
    Joined,
    /// The engine opened collection; the collect call is in flight.
    Collecting,
    Collected,
    /// Submission barrier released; the submit call is in flight.
    Submitting,
    Submitted,
    Success,
    Failed,
}

impl RoundStatus {
    pub const ALL: [RoundStatus; 8] = [
        RoundStatus::Ready,
        RoundStatus::Joined,
        RoundStatus::Collecting,
        RoundStatus::Collected,
        RoundStatus::Submitting,
        RoundStatus::Submitted,
        RoundStatus::Success,
        RoundStatus::Failed,
    ];

    pub fn allowed_transitions(&self) -> &'static [RoundStatus] {
        use RoundStatus::*;
        match self {
            Ready => &[Joined, Failed],
            Joined => &[Collecting, Failed],
            Collecting => &[Collected, Failed],
            Collected => &[Submitting, Failed],
            Submitting => &[Submitted, Failed],
            Submitted => &[Success, Failed],
            // Terminal: self-transitions only, to re-emit an idempotent event.
            Success => &[Success],
            Failed => &[Failed],
        }
    }

    pub fn can_transition_to(&self, target: RoundStatus) -> bool {
        self.allowed_transitions().contains(&target)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RoundStatus::Success | RoundStatus::Failed)
    }

    /// True when a round in this status has not yet reached `target` but
    /// still can.
    pub fn is_behind(&self, target: RoundStatus) -> bool {
        !self.is_terminal() && *self < target
    }

    /// Stable integer code used for persistence.
    pub fn code(&self) -> i64 {
        match self {
            Self::Ready => 1,
            Self::Joined => 2,
            Self::Collecting => 3,
            Self::Collected => 4,
            Self::Submitting => 5,
            Self::Submitted => 6,
            Self::Success => 7,
            Self::Failed => 8,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "Ready",
            Self::Joined => "Joined",
            Self::Collecting => "Collecting",
            Self::Collected => "Collected",
            Self::Submitting => "Submitting",
            Self::Submitted => "Submitted",
            Self::Success => "Success",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl ToSql for RoundStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.code()))
    }
}

impl FromSql for RoundStatus {
    fn column_result(value: rusqlite::types::ValueRef<'_>) -> FromSqlResult<Self> {
        let code = value.as_i64()?;
        Self::from_code(code).ok_or(FromSqlError::OutOfRange(code))
    }
}

/// Describes an allowed-transitions list for error messages.
pub(crate) fn describe_allowed(from: RoundStatus) -> String {
    from.allowed_transitions()
        .iter()
        .map(RoundStatus::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        use RoundStatus::*;
        let path = [
            Ready, Joined, Collecting, Collected, Submitting, Submitted, Success,
        ];
        for pair in path.windows(2) {
            assert!(
                pair[0].can_transition_to(pair[1]),
                "{} -> {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_every_live_status_can_fail() {
        for status in RoundStatus::ALL {
            assert!(status.can_transition_to(RoundStatus::Failed) || status == RoundStatus::Success);
        }
    }

    #[test]
    fn test_no_regression() {
        for from in RoundStatus::ALL {
            for to in from.allowed_transitions() {
                assert!(
                    *to >= from || *to == RoundStatus::Failed,
                    "{} -> {} regresses",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(!RoundStatus::Ready.can_transition_to(RoundStatus::Collected));
        assert!(!RoundStatus::Joined.can_transition_to(RoundStatus::Success));
        assert!(!RoundStatus::Success.can_transition_to(RoundStatus::Failed));
        assert!(!RoundStatus::Failed.can_transition_to(RoundStatus::Ready));
    }

    #[test]
    fn test_terminal_self_transitions() {
        assert!(RoundStatus::Success.can_transition_to(RoundStatus::Success));
        assert!(RoundStatus::Failed.can_transition_to(RoundStatus::Failed));
        assert!(RoundStatus::Success.is_terminal());
        assert!(RoundStatus::Failed.is_terminal());
        assert!(!RoundStatus::Submitted.is_terminal());
    }

    #[test]
    fn test_is_behind() {
        assert!(RoundStatus::Ready.is_behind(RoundStatus::Joined));
        assert!(RoundStatus::Joined.is_behind(RoundStatus::Collected));
        assert!(!RoundStatus::Collected.is_behind(RoundStatus::Collected));
        assert!(!RoundStatus::Submitted.is_behind(RoundStatus::Collected));
        assert!(!RoundStatus::Failed.is_behind(RoundStatus::Submitted));
    }

    #[test]
    fn test_code_roundtrip() {
        for status in RoundStatus::ALL {
            assert_eq!(RoundStatus::from_code(status.code()), Some(status));
        }
        assert_eq!(RoundStatus::from_code(0), None);
        assert_eq!(RoundStatus::from_code(9), None);
    }
}
