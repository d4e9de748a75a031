//! Consumers of this player's own round transitions. Each one makes the
//! engine call that belongs to the status and advances the round.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{CONSUMER_COLLECT_PARTS, CONSUMER_JOIN_ROUNDS, CONSUMER_SUBMIT_PARTS, Player};
use crate::consumer::{Consumer, Flow};
use crate::error::Result;
use crate::state::{NewPart, PartWrite, Round, RoundEvent, RoundStatus};

/// The round named by a local event, if it is still in the event's status.
async fn current_round(player: &Player, event: &RoundEvent) -> Result<Option<Round>> {
    let round = player.store.lookup_required(event.foreign_id).await?;
    if round.status != event.kind {
        debug!(
            round_id = round.id,
            status = %round.status,
            event = %event.kind,
            "Round moved on"
        );
        return Ok(None);
    }
    Ok(Some(round))
}

/// `Ready` → join on the engine.
pub struct JoinRounds {
    player: Arc<Player>,
}

impl JoinRounds {
    pub fn new(player: Arc<Player>) -> Self {
        Self { player }
    }

    async fn on_event(&self, event: &RoundEvent) -> Result<()> {
        if !event.is(&RoundStatus::Ready) {
            return Ok(());
        }
        let Some(round) = current_round(&self.player, event).await? else {
            return Ok(());
        };

        let joined = match self
            .player
            .engine
            .join_round(self.player.team(), self.player.name(), round.external_id)
            .await
        {
            Ok(joined) => joined,
            Err(e) if e.is_idempotent_join() => {
                debug!(round_id = round.id, outcome = e.code(), "Join already landed");
                true
            }
            Err(e) => return Err(e.into()),
        };

        let to = if joined {
            RoundStatus::Joined
        } else {
            warn!(round_id = round.id, external_id = round.external_id, "Engine did not join player");
            RoundStatus::Failed
        };

        self.player
            .store
            .transition(round.id, RoundStatus::Ready, to, vec![])
            .await?;
        info!(round_id = round.id, external_id = round.external_id, status = %to, "Join settled");
        Ok(())
    }
}

#[async_trait]
impl Consumer<RoundStatus> for JoinRounds {
    fn name(&self) -> &str {
        CONSUMER_JOIN_ROUNDS
    }

    async fn handle(&self, event: &RoundEvent) -> Flow {
        self.on_event(event).await.into()
    }
}

/// `Collecting` → fetch contributions and store them with `Collected`.
pub struct CollectParts {
    player: Arc<Player>,
}

impl CollectParts {
    pub fn new(player: Arc<Player>) -> Self {
        Self { player }
    }

    async fn on_event(&self, event: &RoundEvent) -> Result<()> {
        if !event.is(&RoundStatus::Collecting) {
            return Ok(());
        }
        let Some(round) = current_round(&self.player, event).await? else {
            return Ok(());
        };

        let collection = match self
            .player
            .engine
            .collect_round(self.player.team(), self.player.name(), round.external_id)
            .await
        {
            Ok(collection) => collection,
            Err(e) if e.is_excluded_collect() => {
                warn!(round_id = round.id, external_id = round.external_id, "Excluded from collect");
                self.player
                    .store
                    .transition(round.id, RoundStatus::Collecting, RoundStatus::Failed, vec![])
                    .await?;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let parts: Vec<PartWrite> = collection
            .contributions
            .iter()
            .map(|c| {
                if self.player.is_self(&c.player) {
                    NewPart::ranked(&c.player, c.value, collection.rank)
                } else {
                    NewPart::new(&c.player, c.value)
                }
            })
            .map(PartWrite::Upsert)
            .collect();
        let count = parts.len();

        self.player
            .store
            .transition(round.id, RoundStatus::Collecting, RoundStatus::Collected, parts)
            .await?;
        info!(
            round_id = round.id,
            external_id = round.external_id,
            parts = count,
            rank = collection.rank,
            "Parts collected"
        );
        Ok(())
    }
}

#[async_trait]
impl Consumer<RoundStatus> for CollectParts {
    fn name(&self) -> &str {
        CONSUMER_COLLECT_PARTS
    }

    async fn handle(&self, event: &RoundEvent) -> Flow {
        self.on_event(event).await.into()
    }
}

/// `Submitting` → submit the sum of this player's unsubmitted parts.
pub struct SubmitParts {
    player: Arc<Player>,
}

impl SubmitParts {
    pub fn new(player: Arc<Player>) -> Self {
        Self { player }
    }

    async fn on_event(&self, event: &RoundEvent) -> Result<()> {
        if !event.is(&RoundStatus::Submitting) {
            return Ok(());
        }
        let Some(round) = current_round(&self.player, event).await? else {
            return Ok(());
        };

        let total: i64 = self
            .player
            .store
            .list_parts(round.id)
            .await?
            .iter()
            .filter(|p| self.player.is_self(&p.player) && !p.submitted)
            .map(|p| p.value)
            .sum();

        match self
            .player
            .engine
            .submit_round(self.player.team(), self.player.name(), round.external_id, total)
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_idempotent_submit() => {
                debug!(round_id = round.id, "Submission already landed");
            }
            Err(e) => return Err(e.into()),
        }

        self.player
            .store
            .transition(
                round.id,
                RoundStatus::Submitting,
                RoundStatus::Submitted,
                vec![PartWrite::MarkSubmitted {
                    player: self.player.name().to_string(),
                }],
            )
            .await?;
        info!(round_id = round.id, external_id = round.external_id, total, "Round submitted");
        Ok(())
    }
}

#[async_trait]
impl Consumer<RoundStatus> for SubmitParts {
    fn name(&self) -> &str {
        CONSUMER_SUBMIT_PARTS
    }

    async fn handle(&self, event: &RoundEvent) -> Flow {
        self.on_event(event).await.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::tests::{StubEngine, collected_round, test_player};
    use crate::error::{EngineError, PlayerError};
    use crate::gateway::{Collection, Contribution};
    use crate::state::{Event, RoundStore};

    fn local_event(kind: RoundStatus, round_id: i64) -> RoundEvent {
        Event::new(1, kind, round_id)
    }

    #[tokio::test]
    async fn test_join_idempotent_outcomes_advance() {
        for outcome in [
            Ok(true),
            Err(EngineError::AlreadyJoined),
            Err(EngineError::OutOfSyncJoin),
            Err(EngineError::AlreadyExcluded),
        ] {
            let engine = StubEngine::default();
            *engine.join.lock() = outcome;
            let (_dir, store, player) = test_player(engine);
            let round = store.create_round(1, "alice").await.unwrap().round().clone();

            let flow = JoinRounds::new(player)
                .handle(&local_event(RoundStatus::Ready, round.id))
                .await;
            assert!(flow.is_advance());
            assert_eq!(
                store.lookup_required(round.id).await.unwrap().status,
                RoundStatus::Joined
            );
        }
    }

    #[tokio::test]
    async fn test_join_not_landing_fails_round() {
        let engine = StubEngine::default();
        *engine.join.lock() = Ok(false);
        let (_dir, store, player) = test_player(engine);
        let round = store.create_round(1, "alice").await.unwrap().round().clone();

        JoinRounds::new(player)
            .handle(&local_event(RoundStatus::Ready, round.id))
            .await;
        assert_eq!(
            store.lookup_required(round.id).await.unwrap().status,
            RoundStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_join_transient_error_retries() {
        let engine = StubEngine::default();
        *engine.join.lock() = Err(EngineError::Unavailable("down".into()));
        let (_dir, store, player) = test_player(engine);
        let round = store.create_round(1, "alice").await.unwrap().round().clone();

        let flow = JoinRounds::new(player)
            .handle(&local_event(RoundStatus::Ready, round.id))
            .await;
        assert!(matches!(flow, Flow::Retry(PlayerError::Engine(_))));
        assert_eq!(
            store.lookup_required(round.id).await.unwrap().status,
            RoundStatus::Ready
        );
    }

    async fn collecting_round(store: &dyn RoundStore) -> i64 {
        let round = store.create_round(6, "alice").await.unwrap().round().clone();
        for (from, to) in [
            (RoundStatus::Ready, RoundStatus::Joined),
            (RoundStatus::Joined, RoundStatus::Collecting),
        ] {
            store.transition(round.id, from, to, vec![]).await.unwrap();
        }
        round.id
    }

    #[tokio::test]
    async fn test_collect_ranks_only_own_part() {
        let engine = StubEngine::default();
        *engine.collect.lock() = Ok(Collection {
            contributions: vec![
                Contribution {
                    player: "Alice".into(),
                    value: 3,
                },
                Contribution {
                    player: "bob".into(),
                    value: 4,
                },
            ],
            rank: 2,
        });
        let (_dir, store, player) = test_player(engine);
        let round_id = collecting_round(store.as_ref()).await;

        let consumer = CollectParts::new(player);
        let event = local_event(RoundStatus::Collecting, round_id);
        assert!(consumer.handle(&event).await.is_advance());
        assert!(consumer.handle(&event).await.is_advance());

        assert_eq!(
            store.lookup_required(round_id).await.unwrap().status,
            RoundStatus::Collected
        );
        let parts = store.list_parts(round_id).await.unwrap();
        assert_eq!(parts.len(), 2);
        let own = parts.iter().find(|p| p.belongs_to("alice")).unwrap();
        let bob = parts.iter().find(|p| p.belongs_to("bob")).unwrap();
        assert_eq!(own.rank, Some(2));
        assert_eq!(bob.rank, None);
        assert_eq!(bob.value, 4);
    }

    #[tokio::test]
    async fn test_excluded_collect_fails_without_parts() {
        let engine = StubEngine::default();
        *engine.collect.lock() = Err(EngineError::ExcludedCollect);
        let (_dir, store, player) = test_player(engine);
        let round_id = collecting_round(store.as_ref()).await;

        let flow = CollectParts::new(player)
            .handle(&local_event(RoundStatus::Collecting, round_id))
            .await;
        assert!(flow.is_advance());
        assert_eq!(
            store.lookup_required(round_id).await.unwrap().status,
            RoundStatus::Failed
        );
        assert!(store.list_parts(round_id).await.unwrap().is_empty());
    }

    async fn submitting_round(store: &dyn RoundStore) -> i64 {
        let round_id = collected_round(store, 6, &[("alice", 3), ("bob", 4)]).await;
        store
            .transition(
                round_id,
                RoundStatus::Collected,
                RoundStatus::Submitting,
                vec![],
            )
            .await
            .unwrap();
        round_id
    }

    #[tokio::test]
    async fn test_submit_sums_own_parts_and_marks_them() {
        let engine = StubEngine::default();
        let totals = engine.submitted.clone();
        let (_dir, store, player) = test_player(engine);
        let round_id = submitting_round(store.as_ref()).await;

        let flow = SubmitParts::new(player)
            .handle(&local_event(RoundStatus::Submitting, round_id))
            .await;
        assert!(flow.is_advance());

        let round = store.lookup_required(round_id).await.unwrap();
        assert_eq!(round.status, RoundStatus::Submitted);
        let own = store.find_part(round_id, "alice").await.unwrap().unwrap();
        assert!(own.submitted);
        let bob = store.find_part(round_id, "bob").await.unwrap().unwrap();
        assert!(!bob.submitted);
        assert_eq!(*totals.lock(), vec![3]);
    }

    #[tokio::test]
    async fn test_already_submitted_counts_as_success() {
        let engine = StubEngine::default();
        *engine.submit.lock() = Err(EngineError::AlreadySubmitted);
        let (_dir, store, player) = test_player(engine);
        let round_id = submitting_round(store.as_ref()).await;

        let flow = SubmitParts::new(player)
            .handle(&local_event(RoundStatus::Submitting, round_id))
            .await;
        assert!(flow.is_advance());
        assert_eq!(
            store.lookup_required(round_id).await.unwrap().status,
            RoundStatus::Submitted
        );
    }

    #[tokio::test]
    async fn test_stale_local_event_is_skipped() {
        let (_dir, store, player) = test_player(StubEngine::default());
        let round = store.create_round(1, "alice").await.unwrap().round().clone();
        store
            .transition(round.id, RoundStatus::Ready, RoundStatus::Failed, vec![])
            .await
            .unwrap();

        let flow = JoinRounds::new(player)
            .handle(&local_event(RoundStatus::Ready, round.id))
            .await;
        assert!(flow.is_advance());
        assert_eq!(
            store.lookup_required(round.id).await.unwrap().status,
            RoundStatus::Failed
        );
    }
}
