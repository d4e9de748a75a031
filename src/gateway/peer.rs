use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::PeerGateway;
use super::rpc;
use crate::error::{PlayerError, Result};
use crate::state::{Part, Round, RoundEvent, RoundStore};

/// Requests a sibling may send to this player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PeerRequest {
    EventsAfter { cursor: u64, limit: usize },
    GetParts { external_id: i64 },
    GetRound { round_id: i64 },
    Ping,
}

/// This player's side of the peer interface, answered from the local store.
#[derive(Clone)]
pub struct PeerService {
    name: String,
    store: Arc<dyn RoundStore>,
}

impl PeerService {
    pub fn new(name: impl Into<String>, store: Arc<dyn RoundStore>) -> Self {
        Self {
            name: name.into(),
            store,
        }
    }

    pub async fn handle(&self, request: PeerRequest) -> Result<serde_json::Value> {
        let value = match request {
            PeerRequest::EventsAfter { cursor, limit } => {
                serde_json::to_value(self.events_after(cursor, limit).await?)?
            }
            PeerRequest::GetParts { external_id } => {
                serde_json::to_value(self.get_parts(external_id).await?)?
            }
            PeerRequest::GetRound { round_id } => {
                serde_json::to_value(self.get_round(round_id).await?)?
            }
            PeerRequest::Ping => {
                self.ping().await?;
                serde_json::Value::Null
            }
        };
        Ok(value)
    }
}

#[async_trait]
impl PeerGateway for PeerService {
    fn name(&self) -> &str {
        &self.name
    }

    async fn events_after(&self, cursor: u64, limit: usize) -> Result<Vec<RoundEvent>> {
        self.store.round_events_after(cursor, limit).await
    }

    async fn get_parts(&self, external_id: i64) -> Result<Vec<Part>> {
        let round = self
            .store
            .lookup_by_external_id(external_id)
            .await?
            .ok_or_else(|| PlayerError::RoundNotFound(format!("external id {}", external_id)))?;
        self.store.list_parts(round.id).await
    }

    async fn get_round(&self, round_id: i64) -> Result<Round> {
        self.store.lookup_required(round_id).await
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// A sibling player reached over the line-delimited JSON transport.
#[derive(Debug, Clone)]
pub struct PeerClient {
    name: String,
    address: String,
    timeout: Duration,
}

impl PeerClient {
    pub fn new(name: impl Into<String>, address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            timeout,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn send<T: DeserializeOwned>(&self, request: PeerRequest) -> Result<T> {
        rpc::call(&self.address, &request, self.timeout)
            .await
            .map_err(|e| match e {
                PlayerError::Rpc { code, message } if code == "round_not_found" => {
                    PlayerError::RoundNotFound(message)
                }
                other => PlayerError::peer(&self.name, other),
            })
    }
}

#[async_trait]
impl PeerGateway for PeerClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn events_after(&self, cursor: u64, limit: usize) -> Result<Vec<RoundEvent>> {
        self.send(PeerRequest::EventsAfter { cursor, limit }).await
    }

    async fn get_parts(&self, external_id: i64) -> Result<Vec<Part>> {
        self.send(PeerRequest::GetParts { external_id }).await
    }

    async fn get_round(&self, round_id: i64) -> Result<Round> {
        self.send(PeerRequest::GetRound { round_id }).await
    }

    async fn ping(&self) -> Result<()> {
        self.send(PeerRequest::Ping).await
    }
}
