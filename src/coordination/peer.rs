//! Consumers of a sibling's round transitions.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{CONSUMER_ACK_PEER_SUBMISSIONS, CONSUMER_COLLECT_PEER_PARTS, Player};
use crate::consumer::{Consumer, Flow};
use crate::error::{PlayerError, Result};
use crate::gateway::PeerGateway;
use crate::state::{NewPart, PartWrite, Round, RoundEvent, RoundStatus};

/// Resolves a peer event to this player's round for the same engine round.
async fn local_round_for(
    player: &Player,
    peer: &dyn PeerGateway,
    event: &RoundEvent,
) -> Result<(Round, Round)> {
    let peer_round = peer.get_round(event.foreign_id).await?;
    let local = player
        .store
        .lookup_by_external_id(peer_round.external_id)
        .await?
        .ok_or_else(|| {
            PlayerError::NotReady(format!(
                "external round {} not announced locally",
                peer_round.external_id
            ))
        })?;
    Ok((peer_round, local))
}

/// Peer `Collected` → replicate the peer's own ranked part.
pub struct CollectPeerParts {
    player: Arc<Player>,
    peer: Arc<dyn PeerGateway>,
}

impl CollectPeerParts {
    pub fn new(player: Arc<Player>, peer: Arc<dyn PeerGateway>) -> Self {
        Self { player, peer }
    }

    async fn on_event(&self, event: &RoundEvent) -> Result<()> {
        if !event.is(&RoundStatus::Collected) {
            return Ok(());
        }

        let (peer_round, local) = local_round_for(&self.player, self.peer.as_ref(), event).await?;
        let peer_name = self.peer.name();

        if let Some(existing) = self.player.store.find_part(local.id, peer_name).await?
            && existing.is_ranked()
        {
            debug!(round_id = local.id, peer = peer_name, "Peer part already ranked");
            return Ok(());
        }

        // Rows the peer holds for other players are its copies, not theirs.
        let parts = self.peer.get_parts(peer_round.external_id).await?;
        let writes: Vec<PartWrite> = parts
            .iter()
            .filter(|p| p.belongs_to(peer_name))
            .map(|p| PartWrite::Upsert(NewPart::from(p)))
            .collect();
        let count = writes.len();

        self.player.store.write_parts(local.id, writes).await?;
        info!(
            round_id = local.id,
            external_id = local.external_id,
            peer = peer_name,
            parts = count,
            "Peer parts replicated"
        );
        Ok(())
    }
}

#[async_trait]
impl Consumer<RoundStatus> for CollectPeerParts {
    fn name(&self) -> &str {
        CONSUMER_COLLECT_PEER_PARTS
    }

    async fn handle(&self, event: &RoundEvent) -> Flow {
        self.on_event(event).await.into()
    }
}

/// Peer `Submitted` → mark the peer's part submitted and try the barrier.
pub struct AcknowledgePeerSubmissions {
    player: Arc<Player>,
    peer: Arc<dyn PeerGateway>,
}

impl AcknowledgePeerSubmissions {
    pub fn new(player: Arc<Player>, peer: Arc<dyn PeerGateway>) -> Self {
        Self { player, peer }
    }

    async fn on_event(&self, event: &RoundEvent) -> Result<()> {
        if !event.is(&RoundStatus::Submitted) {
            return Ok(());
        }

        // A settled round still records the submission; the barrier below
        // is a no-op outside Collected.
        let (peer_round, local) = local_round_for(&self.player, self.peer.as_ref(), event).await?;
        let peer_name = self.peer.name();
        let mut writes = Vec::with_capacity(2);

        if self
            .player
            .store
            .find_part(local.id, peer_name)
            .await?
            .is_none()
        {
            // The Collected event may not have been replicated yet.
            let parts = self.peer.get_parts(peer_round.external_id).await?;
            match parts.iter().find(|p| p.belongs_to(peer_name)) {
                Some(own) => writes.push(PartWrite::Upsert(NewPart::from(own))),
                None => debug!(round_id = local.id, peer = peer_name, "Peer holds no own part"),
            }
        }
        writes.push(PartWrite::MarkSubmitted {
            player: peer_name.to_string(),
        });

        self.player.store.write_parts(local.id, writes).await?;
        info!(
            round_id = local.id,
            external_id = local.external_id,
            peer = peer_name,
            "Peer submission acknowledged"
        );

        self.player.maybe_ready_to_submit(local.id).await
    }
}

#[async_trait]
impl Consumer<RoundStatus> for AcknowledgePeerSubmissions {
    fn name(&self) -> &str {
        CONSUMER_ACK_PEER_SUBMISSIONS
    }

    async fn handle(&self, event: &RoundEvent) -> Flow {
        self.on_event(event).await.into()
    }
}
