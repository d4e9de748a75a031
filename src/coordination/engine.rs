//! Consumers of the engine notification stream.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{
    CONSUMER_NOTIFY_ROUND_COMPLETE, CONSUMER_NOTIFY_TO_COLLECT, CONSUMER_NOTIFY_TO_JOIN,
    CONSUMER_NOTIFY_TO_SUBMIT, Player,
};
use crate::consumer::{Consumer, Flow};
use crate::error::{PlayerError, Result};
use crate::state::{EngineEvent, EngineEventType, Round, RoundStatus};

/// Looks up the local round for an engine notification that requires the
/// round to have reached `required`. A missing or lagging round is not an
/// error of the event; the sibling consumer that advances it may simply be
/// behind, so the event is redelivered.
async fn round_at_least(
    player: &Player,
    event: &EngineEvent,
    required: RoundStatus,
) -> Result<Option<Round>> {
    let external_id = event.foreign_id;
    let Some(round) = player.store.lookup_by_external_id(external_id).await? else {
        return Err(PlayerError::NotReady(format!(
            "external round {} not announced yet",
            external_id
        )));
    };

    if round.status == required {
        return Ok(Some(round));
    }
    if round.status.is_behind(required) {
        return Err(PlayerError::NotReady(format!(
            "round {} is {}, waiting for {}",
            round.id, round.status, required
        )));
    }

    debug!(
        round_id = round.id,
        status = %round.status,
        event = %event.kind,
        "Round already past notification"
    );
    Ok(None)
}

/// `RoundOpen` → create the local round in `Ready`.
pub struct NotifyToJoin {
    player: Arc<Player>,
}

impl NotifyToJoin {
    pub fn new(player: Arc<Player>) -> Self {
        Self { player }
    }

    async fn on_event(&self, event: &EngineEvent) -> Result<()> {
        if !event.is(&EngineEventType::RoundOpen) {
            return Ok(());
        }

        let created = self
            .player
            .store
            .create_round(event.foreign_id, self.player.name())
            .await?;
        if created.is_new() {
            info!(
                round_id = created.round().id,
                external_id = event.foreign_id,
                "Round announced"
            );
        } else {
            debug!(external_id = event.foreign_id, "Round already known");
        }
        Ok(())
    }
}

#[async_trait]
impl Consumer<EngineEventType> for NotifyToJoin {
    fn name(&self) -> &str {
        CONSUMER_NOTIFY_TO_JOIN
    }

    async fn handle(&self, event: &EngineEvent) -> Flow {
        self.on_event(event).await.into()
    }
}

/// `RoundCollectReady` → `Joined → Collecting`.
pub struct NotifyToCollect {
    player: Arc<Player>,
}

impl NotifyToCollect {
    pub fn new(player: Arc<Player>) -> Self {
        Self { player }
    }

    async fn on_event(&self, event: &EngineEvent) -> Result<()> {
        if !event.is(&EngineEventType::RoundCollectReady) {
            return Ok(());
        }

        let Some(round) = round_at_least(&self.player, event, RoundStatus::Joined).await? else {
            return Ok(());
        };

        self.player
            .store
            .transition(
                round.id,
                RoundStatus::Joined,
                RoundStatus::Collecting,
                vec![],
            )
            .await?;
        info!(round_id = round.id, external_id = round.external_id, "Collection opened");
        Ok(())
    }
}

#[async_trait]
impl Consumer<EngineEventType> for NotifyToCollect {
    fn name(&self) -> &str {
        CONSUMER_NOTIFY_TO_COLLECT
    }

    async fn handle(&self, event: &EngineEvent) -> Flow {
        self.on_event(event).await.into()
    }
}

/// `RoundSubmitReady` → run the submission barrier.
pub struct NotifyToSubmit {
    player: Arc<Player>,
}

impl NotifyToSubmit {
    pub fn new(player: Arc<Player>) -> Self {
        Self { player }
    }

    async fn on_event(&self, event: &EngineEvent) -> Result<()> {
        if !event.is(&EngineEventType::RoundSubmitReady) {
            return Ok(());
        }

        let Some(round) = round_at_least(&self.player, event, RoundStatus::Collected).await?
        else {
            return Ok(());
        };

        self.player.maybe_ready_to_submit(round.id).await
    }
}

#[async_trait]
impl Consumer<EngineEventType> for NotifyToSubmit {
    fn name(&self) -> &str {
        CONSUMER_NOTIFY_TO_SUBMIT
    }

    async fn handle(&self, event: &EngineEvent) -> Flow {
        self.on_event(event).await.into()
    }
}

/// `RoundSucceeded` / `RoundFailed` → settle the round.
pub struct NotifyRoundComplete {
    player: Arc<Player>,
}

impl NotifyRoundComplete {
    pub fn new(player: Arc<Player>) -> Self {
        Self { player }
    }

    async fn on_event(&self, event: &EngineEvent) -> Result<()> {
        if !event.kind.is_round_complete() {
            return Ok(());
        }

        let Some(round) = self
            .player
            .store
            .lookup_by_external_id(event.foreign_id)
            .await?
        else {
            debug!(external_id = event.foreign_id, "Completed round never joined");
            return Ok(());
        };

        if round.status.is_terminal() || round.status == RoundStatus::Ready {
            debug!(round_id = round.id, status = %round.status, "Completion ignored");
            return Ok(());
        }

        let succeeded = event.is(&EngineEventType::RoundSucceeded);
        if succeeded && round.status == RoundStatus::Submitting {
            return Err(PlayerError::NotReady(format!(
                "round {} submit still in flight",
                round.id
            )));
        }

        let to = if succeeded && round.status == RoundStatus::Submitted {
            RoundStatus::Success
        } else {
            RoundStatus::Failed
        };

        self.player
            .store
            .transition(round.id, round.status, to, vec![])
            .await?;
        info!(
            round_id = round.id,
            external_id = round.external_id,
            outcome = %to,
            "Round complete"
        );
        Ok(())
    }
}

#[async_trait]
impl Consumer<EngineEventType> for NotifyRoundComplete {
    fn name(&self) -> &str {
        CONSUMER_NOTIFY_ROUND_COMPLETE
    }

    async fn handle(&self, event: &EngineEvent) -> Flow {
        self.on_event(event).await.into()
    }
}
