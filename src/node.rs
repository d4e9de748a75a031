//! Process wiring: store, gateways, peer server, match starter and consumers.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::PlayerConfig;
use crate::coordination::{Coordinator, Player, ping_peers, start_match_forever};
use crate::error::Result;
use crate::gateway::{EngineClient, EngineGateway, PeerClient, PeerGateway, PeerServer, PeerService};
use crate::state::{CursorStore, RoundStore, SqliteStore};

/// A configured player that has not started yet.
pub struct PlayerNode {
    config: PlayerConfig,
    store: SqliteStore,
    engine: Arc<dyn EngineGateway>,
    peers: Vec<Arc<dyn PeerGateway>>,
}

impl PlayerNode {
    /// Opens the store and builds network gateways from `config`.
    pub fn from_config(config: PlayerConfig) -> Result<Self> {
        config.validate()?;
        let store =
            SqliteStore::with_read_pool_size(&config.store.db_path, config.store.read_pool_size)?;

        let timeout = config.engine.request_timeout();
        let engine: Arc<dyn EngineGateway> =
            Arc::new(EngineClient::new(config.engine.address.clone(), timeout));
        let peers = config
            .peers
            .iter()
            .map(|p| {
                Arc::new(PeerClient::new(p.name.clone(), p.address.clone(), timeout))
                    as Arc<dyn PeerGateway>
            })
            .collect();

        Ok(Self::with_gateways(config, store, engine, peers))
    }

    pub fn with_gateways(
        config: PlayerConfig,
        store: SqliteStore,
        engine: Arc<dyn EngineGateway>,
        peers: Vec<Arc<dyn PeerGateway>>,
    ) -> Self {
        Self {
            config,
            store,
            engine,
            peers,
        }
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    /// Binds the peer server and spawns every background task.
    pub async fn start(self) -> Result<RunningNode> {
        let Self {
            config,
            store,
            engine,
            peers,
        } = self;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let round_store: Arc<dyn RoundStore> = Arc::new(store.clone());
        let cursors: Arc<dyn CursorStore> = Arc::new(store.clone());

        let service = PeerService::new(config.player.name.clone(), round_store.clone());
        let server = PeerServer::bind(
            &config.server.listen_address,
            service,
            config.server.request_timeout(),
        )
        .await?;
        let local_addr = server.local_addr()?;

        let mut handles = vec![tokio::spawn(server.serve(shutdown_rx.clone()))];

        let reachable = ping_peers(&peers).await;
        if reachable < peers.len() {
            warn!(reachable, total = peers.len(), "Some peers unreachable at startup");
        }

        if config.matchmaking.start_match {
            let engine = engine.clone();
            let team = config.player.team.clone();
            let players = config.match_size();
            let retry = config.match_retry();
            let shutdown = shutdown_rx.clone();
            handles.push(tokio::spawn(async move {
                start_match_forever(engine, team, players, retry, shutdown).await;
            }));
        }

        let player = Arc::new(Player::new(
            config.player.name.clone(),
            config.player.team.clone(),
            round_store,
            engine,
        ));
        let coordinator = Coordinator::new(player, cursors, peers, config.runtime_settings());
        handles.extend(coordinator.spawn(&shutdown_rx));

        info!(
            player = %config.player.name,
            team = %config.player.team,
            %local_addr,
            "Player running"
        );

        Ok(RunningNode {
            shutdown_tx,
            handles,
            local_addr,
            store,
        })
    }
}

/// Handle to a started player.
pub struct RunningNode {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
    local_addr: SocketAddr,
    store: SqliteStore,
}

impl RunningNode {
    /// Address the peer server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    /// Signals every task to stop and waits for them.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Task ended abnormally");
            }
        }
        info!("Player stopped");
    }
}
