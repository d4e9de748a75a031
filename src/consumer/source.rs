use std::sync::Arc;

use async_trait::async_trait;

use super::EventSource;
use crate::error::Result;
use crate::gateway::{EngineGateway, PeerGateway};
use crate::state::{EngineEvent, EngineEventType, RoundEvent, RoundStatus, RoundStore, StreamName};

/// This player's own round transitions.
pub struct LocalSource {
    store: Arc<dyn RoundStore>,
}

impl LocalSource {
    pub fn new(store: Arc<dyn RoundStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventSource<RoundStatus> for LocalSource {
    fn stream(&self) -> StreamName {
        StreamName::local()
    }

    async fn events_after(&self, after: u64, limit: usize) -> Result<Vec<RoundEvent>> {
        self.store.round_events_after(after, limit).await
    }
}

/// Engine notifications.
pub struct EngineSource {
    engine: Arc<dyn EngineGateway>,
}

impl EngineSource {
    pub fn new(engine: Arc<dyn EngineGateway>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl EventSource<EngineEventType> for EngineSource {
    fn stream(&self) -> StreamName {
        StreamName::engine()
    }

    async fn events_after(&self, after: u64, limit: usize) -> Result<Vec<EngineEvent>> {
        Ok(self.engine.events_after(after, limit).await?)
    }
}

/// A sibling's round transitions.
pub struct PeerSource {
    peer: Arc<dyn PeerGateway>,
}

impl PeerSource {
    pub fn new(peer: Arc<dyn PeerGateway>) -> Self {
        Self { peer }
    }
}

#[async_trait]
impl EventSource<RoundStatus> for PeerSource {
    fn stream(&self) -> StreamName {
        StreamName::peer(self.peer.name())
    }

    async fn events_after(&self, after: u64, limit: usize) -> Result<Vec<RoundEvent>> {
        self.peer.events_after(after, limit).await
    }
}
