use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::{
    AcknowledgePeerSubmissions, CollectParts, CollectPeerParts, JoinRounds, NotifyRoundComplete,
    NotifyToCollect, NotifyToJoin, NotifyToSubmit, Player, SubmitParts,
};
use crate::consumer::{
    Backoff, BackoffPolicy, Consumer, ConsumerRuntime, EngineSource, EventSource, LocalSource,
    PeerSource, RuntimeSettings,
};
use crate::gateway::{EngineGateway, PeerGateway};
use crate::state::{CursorStore, EngineEventType, RoundStatus};

/// Wires every stream consumer for one player.
pub struct Coordinator {
    player: Arc<Player>,
    cursors: Arc<dyn CursorStore>,
    peers: Vec<Arc<dyn PeerGateway>>,
    settings: RuntimeSettings,
}

impl Coordinator {
    pub fn new(
        player: Arc<Player>,
        cursors: Arc<dyn CursorStore>,
        peers: Vec<Arc<dyn PeerGateway>>,
        settings: RuntimeSettings,
    ) -> Self {
        Self {
            player,
            cursors,
            peers,
            settings,
        }
    }

    pub fn player(&self) -> &Arc<Player> {
        &self.player
    }

    /// Spawns one task per (stream, consumer): four on the engine stream,
    /// three on the local stream and two per peer.
    pub fn spawn(&self, shutdown: &watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(7 + 2 * self.peers.len());
        let player = &self.player;

        let engine: Arc<dyn EventSource<EngineEventType>> =
            Arc::new(EngineSource::new(player.engine().clone()));
        let engine_consumers: [Arc<dyn Consumer<EngineEventType>>; 4] = [
            Arc::new(NotifyToJoin::new(player.clone())),
            Arc::new(NotifyToCollect::new(player.clone())),
            Arc::new(NotifyToSubmit::new(player.clone())),
            Arc::new(NotifyRoundComplete::new(player.clone())),
        ];
        for consumer in engine_consumers {
            handles.push(self.spawn_runtime(engine.clone(), consumer, shutdown));
        }

        let local: Arc<dyn EventSource<RoundStatus>> =
            Arc::new(LocalSource::new(player.store().clone()));
        let local_consumers: [Arc<dyn Consumer<RoundStatus>>; 3] = [
            Arc::new(JoinRounds::new(player.clone())),
            Arc::new(CollectParts::new(player.clone())),
            Arc::new(SubmitParts::new(player.clone())),
        ];
        for consumer in local_consumers {
            handles.push(self.spawn_runtime(local.clone(), consumer, shutdown));
        }

        for peer in &self.peers {
            let source: Arc<dyn EventSource<RoundStatus>> =
                Arc::new(PeerSource::new(peer.clone()));
            let peer_consumers: [Arc<dyn Consumer<RoundStatus>>; 2] = [
                Arc::new(CollectPeerParts::new(player.clone(), peer.clone())),
                Arc::new(AcknowledgePeerSubmissions::new(player.clone(), peer.clone())),
            ];
            for consumer in peer_consumers {
                handles.push(self.spawn_runtime(source.clone(), consumer, shutdown));
            }
        }

        info!(
            player = player.name(),
            consumers = handles.len(),
            peers = self.peers.len(),
            "Consumers spawned"
        );
        handles
    }

    fn spawn_runtime<K: Send + Sync + 'static>(
        &self,
        source: Arc<dyn EventSource<K>>,
        consumer: Arc<dyn Consumer<K>>,
        shutdown: &watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let runtime = ConsumerRuntime::new(source, consumer, self.cursors.clone(), self.settings);
        tokio::spawn(runtime.run(shutdown.clone()))
    }
}

/// Asks the engine to start a match for the team until it accepts or reports
/// one already active. Returns false if shut down first.
pub async fn start_match_forever(
    engine: Arc<dyn EngineGateway>,
    team: String,
    players: u32,
    retry: BackoffPolicy,
    mut shutdown: watch::Receiver<bool>,
) -> bool {
    let mut backoff = Backoff::new(retry);

    loop {
        if *shutdown.borrow() {
            return false;
        }

        match engine.start_match(&team, players).await {
            Ok(()) => {
                info!(team = %team, players, "Match started");
                return true;
            }
            Err(e) if e.is_active_match() => {
                info!(team = %team, "Match already active");
                return true;
            }
            Err(e) => {
                let delay = backoff.next_delay();
                warn!(team = %team, error = %e, retry_in_ms = delay.as_millis() as u64, "Start match failed");
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            return false;
                        }
                    }
                }
            }
        }
    }
}

/// Pings every peer once and logs reachability. Returns the reachable count.
pub async fn ping_peers(peers: &[Arc<dyn PeerGateway>]) -> usize {
    let results = join_all(peers.iter().map(|peer| async move {
        let result = peer.ping().await;
        (peer.name().to_string(), result)
    }))
    .await;

    let mut reachable = 0;
    for (name, result) in results {
        match result {
            Ok(()) => {
                info!(peer = %name, "Peer reachable");
                reachable += 1;
            }
            Err(e) => warn!(peer = %name, error = %e, "Peer unreachable"),
        }
    }
    reachable
}
