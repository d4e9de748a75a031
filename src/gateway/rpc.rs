//! Line-delimited JSON codec shared by the engine and peer transports.
//!
//! One request per connection: the client writes a single JSON line, the
//! server answers with a single `Response` line and closes.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::trace;

use crate::error::{PlayerError, Result};

/// Upper bound on a single request or response line.
pub(crate) const MAX_LINE_BYTES: u64 = 4 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Ok { ok: serde_json::Value },
    Err { err: ErrorPayload },
}

impl Response {
    pub fn ok<T: Serialize>(payload: &T) -> Result<Self> {
        Ok(Response::Ok {
            ok: serde_json::to_value(payload)?,
        })
    }

    pub fn err(error: impl Into<ErrorPayload>) -> Self {
        Response::Err { err: error.into() }
    }

    pub fn into_result<T: DeserializeOwned>(self) -> Result<T> {
        match self {
            Response::Ok { ok } => Ok(serde_json::from_value(ok)?),
            Response::Err { err } => Err(PlayerError::Rpc {
                code: err.code,
                message: err.message,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

impl From<&PlayerError> for ErrorPayload {
    fn from(e: &PlayerError) -> Self {
        ErrorPayload {
            code: e.code().to_string(),
            message: e.to_string(),
        }
    }
}

impl From<PlayerError> for ErrorPayload {
    fn from(e: PlayerError) -> Self {
        ErrorPayload::from(&e)
    }
}

pub(crate) fn encode_line<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec(value)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Reads one line; `None` when the peer closed before sending anything.
pub(crate) async fn read_line<R>(reader: &mut BufReader<R>) -> Result<Option<String>>
where
    R: AsyncRead + Unpin,
{
    read_bounded_line(reader, MAX_LINE_BYTES).await
}

async fn read_bounded_line<R>(reader: &mut BufReader<R>, limit: u64) -> Result<Option<String>>
where
    R: AsyncRead + Unpin,
{
    let mut line = String::new();
    let n = AsyncReadExt::take(&mut *reader, limit + 1)
        .read_line(&mut line)
        .await?;
    if n == 0 {
        return Ok(None);
    }
    if n as u64 > limit {
        return Err(PlayerError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("line exceeds {} bytes", limit),
        )));
    }
    Ok(Some(line))
}

/// Sends one request and decodes the reply, bounded by `timeout`.
pub(crate) async fn call<Req, T>(address: &str, request: &Req, timeout: Duration) -> Result<T>
where
    Req: Serialize + Sync,
    T: DeserializeOwned,
{
    let exchange = async {
        let stream = TcpStream::connect(address).await?;
        let (read_half, mut write_half) = stream.into_split();

        write_half.write_all(&encode_line(request)?).await?;
        write_half.flush().await?;

        let mut reader = BufReader::new(read_half);
        let line = read_line(&mut reader).await?.ok_or_else(|| {
            PlayerError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed before response",
            ))
        })?;

        trace!(address, bytes = line.len(), "RPC response received");
        let response: Response = serde_json::from_str(&line)?;
        Ok::<_, PlayerError>(response)
    };

    tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| PlayerError::Timeout(format!("request to {}", address)))??
        .into_result()
}
