use tracing::{debug, info};

use super::Player;
use crate::error::Result;
use crate::state::RoundStatus;

impl Player {
    /// Releases the submission barrier for a collected round once every
    /// other player's part is known to be submitted.
    ///
    /// Safe to call from both triggers (the engine's submit notification and
    /// a peer's submission ack); anything but `Collected` is a no-op.
    pub async fn maybe_ready_to_submit(&self, round_id: i64) -> Result<()> {
        let round = self.store.lookup_required(round_id).await?;
        if round.status != RoundStatus::Collected {
            debug!(round_id, status = %round.status, "Barrier skipped");
            return Ok(());
        }

        let parts = self.store.list_parts(round_id).await?;
        let waiting: Vec<&str> = parts
            .iter()
            .filter(|p| !self.is_self(&p.player) && !p.submitted)
            .map(|p| p.player.as_str())
            .collect();

        if !waiting.is_empty() {
            debug!(round_id, ?waiting, "Barrier waiting on peers");
            return Ok(());
        }

        self.store
            .transition(
                round_id,
                RoundStatus::Collected,
                RoundStatus::Submitting,
                vec![],
            )
            .await?;
        info!(round_id, external_id = round.external_id, "Barrier released");
        Ok(())
    }
}
