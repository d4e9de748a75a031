use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::peer::{PeerRequest, PeerService};
use super::rpc::{self, Response};
use crate::error::{PlayerError, Result};

/// Serves this player's `PeerService` to siblings.
pub struct PeerServer {
    listener: TcpListener,
    service: PeerService,
    timeout: Duration,
}

impl PeerServer {
    pub async fn bind(address: &str, service: PeerService, timeout: Duration) -> Result<Self> {
        let listener = TcpListener::bind(address).await?;
        Ok(Self {
            listener,
            service,
            timeout,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until `shutdown` flips to true.
    pub async fn serve(self, mut shutdown: watch::Receiver<bool>) {
        if let Ok(addr) = self.listener.local_addr() {
            info!(%addr, "Peer server listening");
        }

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((socket, remote)) => {
                        let service = self.service.clone();
                        let timeout = self.timeout;
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(socket, service, timeout).await {
                                warn!(%remote, error = %e, "Peer connection failed");
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "Accept failed"),
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Peer server stopped");
    }
}

async fn handle_connection(socket: TcpStream, service: PeerService, timeout: Duration) -> Result<()> {
    let (read_half, mut write_half) = socket.into_split();
    let mut reader = BufReader::new(read_half);

    let line = tokio::time::timeout(timeout, rpc::read_line(&mut reader))
        .await
        .map_err(|_| PlayerError::Timeout("peer request".into()))??;
    let Some(line) = line else {
        return Ok(());
    };

    let response = match serde_json::from_str::<PeerRequest>(&line) {
        Ok(request) => {
            debug!(?request, "Peer request");
            match service.handle(request).await {
                Ok(ok) => Response::Ok { ok },
                Err(e) => Response::err(&e),
            }
        }
        Err(e) => Response::err(PlayerError::from(e)),
    };

    write_half.write_all(&rpc::encode_line(&response)?).await?;
    write_half.flush().await?;
    Ok(())
}
