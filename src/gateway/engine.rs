use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::rpc;
use super::{Collection, EngineGateway};
use crate::error::{EngineError, EngineResult, PlayerError};
use crate::state::EngineEvent;

/// Requests understood by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EngineRequest {
    StartMatch {
        team: String,
        players: u32,
    },
    JoinRound {
        team: String,
        player: String,
        round_id: i64,
    },
    CollectRound {
        team: String,
        player: String,
        round_id: i64,
    },
    SubmitRound {
        team: String,
        player: String,
        round_id: i64,
        total: i64,
    },
    EventsAfter {
        cursor: u64,
        limit: usize,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct JoinReply {
    joined: bool,
}

/// Engine gateway over the line-delimited JSON transport.
#[derive(Debug, Clone)]
pub struct EngineClient {
    address: String,
    timeout: Duration,
}

impl EngineClient {
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn send<T: DeserializeOwned>(&self, request: EngineRequest) -> EngineResult<T> {
        rpc::call(&self.address, &request, self.timeout)
            .await
            .map_err(into_engine_error)
    }
}

fn into_engine_error(err: PlayerError) -> EngineError {
    match err {
        PlayerError::Rpc { code, message } => EngineError::from_code(&code, message),
        PlayerError::Engine(e) => e,
        other => EngineError::Unavailable(other.to_string()),
    }
}

#[async_trait]
impl EngineGateway for EngineClient {
    async fn start_match(&self, team: &str, players: u32) -> EngineResult<()> {
        debug!(team, players, "Starting match");
        self.send(EngineRequest::StartMatch {
            team: team.to_string(),
            players,
        })
        .await
    }

    async fn join_round(&self, team: &str, player: &str, external_id: i64) -> EngineResult<bool> {
        let reply: JoinReply = self
            .send(EngineRequest::JoinRound {
                team: team.to_string(),
                player: player.to_string(),
                round_id: external_id,
            })
            .await?;
        Ok(reply.joined)
    }

    async fn collect_round(
        &self,
        team: &str,
        player: &str,
        external_id: i64,
    ) -> EngineResult<Collection> {
        self.send(EngineRequest::CollectRound {
            team: team.to_string(),
            player: player.to_string(),
            round_id: external_id,
        })
        .await
    }

    async fn submit_round(
        &self,
        team: &str,
        player: &str,
        external_id: i64,
        total: i64,
    ) -> EngineResult<()> {
        self.send(EngineRequest::SubmitRound {
            team: team.to_string(),
            player: player.to_string(),
            round_id: external_id,
            total,
        })
        .await
    }

    async fn events_after(&self, cursor: u64, limit: usize) -> EngineResult<Vec<EngineEvent>> {
        self.send(EngineRequest::EventsAfter { cursor, limit }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{ErrorPayload, Response};
    use tokio::io::{AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    /// Accepts one connection, records the request line and writes `reply`.
    async fn one_shot_engine(reply: Response) -> (String, tokio::task::JoinHandle<EngineRequest>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let handle = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = socket.into_split();
            let mut reader = BufReader::new(read_half);
            let line = rpc::read_line(&mut reader).await.unwrap().unwrap();
            write_half
                .write_all(&rpc::encode_line(&reply).unwrap())
                .await
                .unwrap();
            serde_json::from_str(&line).unwrap()
        });
        (address, handle)
    }

    #[tokio::test]
    async fn test_join_round_sends_request() {
        let (address, handle) = one_shot_engine(Response::ok(&JoinReply { joined: true }).unwrap()).await;
        let client = EngineClient::new(address, Duration::from_secs(2));

        let joined = client.join_round("red", "alice", 11).await.unwrap();
        assert!(joined);

        assert_eq!(
            handle.await.unwrap(),
            EngineRequest::JoinRound {
                team: "red".into(),
                player: "alice".into(),
                round_id: 11,
            }
        );
    }

    #[tokio::test]
    async fn test_named_engine_error_is_mapped() {
        let (address, _handle) = one_shot_engine(Response::err(ErrorPayload {
            code: "already_submitted".into(),
            message: "round 3".into(),
        }))
        .await;
        let client = EngineClient::new(address, Duration::from_secs(2));

        let err = client.submit_round("red", "alice", 3, 10).await.unwrap_err();
        assert!(err.is_idempotent_submit());
    }

    #[tokio::test]
    async fn test_unreachable_engine_is_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let client = EngineClient::new(address, Duration::from_millis(500));
        let err = client.events_after(0, 10).await.unwrap_err();
        assert!(matches!(err, EngineError::Unavailable(_)));
    }
}
