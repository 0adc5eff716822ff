use std::io;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::debug;

use crate::api::{Api, ApiError, Envelope, Response};
use crate::limits::MAX_LINE_LEN;

/// One request per line: `{"method"?: "POST", "path": "/blocks/list", "body": ...}`.
#[derive(Debug, Deserialize)]
pub struct WireRequest {
    #[serde(default)]
    pub method: Option<String>,
    pub path: String,
    #[serde(default)]
    pub body: Option<Value>,
}

/// One reply per line: `{"status": 200, "body": {...}}`.
#[derive(Debug, Serialize)]
struct WireResponse<'a> {
    status: u16,
    body: &'a Envelope,
}

fn codec_err(e: LinesCodecError) -> io::Error {
    match e {
        LinesCodecError::Io(e) => e,
        other => io::Error::new(io::ErrorKind::InvalidData, other.to_string()),
    }
}

/// Decode a request line and run it. Undecodable lines get a 400 reply.
pub async fn handle_line(api: &Api, line: &str) -> Response {
    match serde_json::from_str::<WireRequest>(line) {
        Ok(req) => {
            let method = req.method.as_deref().unwrap_or("POST");
            api.handle(method, &req.path, req.body.as_ref()).await
        }
        Err(e) => Response::from_error(&ApiError::MalformedRequest(format!("Invalid request line: {e}"))),
    }
}

fn encode_response(resp: &Response) -> io::Result<String> {
    serde_json::to_string(&WireResponse {
        status: resp.status,
        body: &resp.body,
    })
    .map_err(io::Error::other)
}

/// Serve one connection until the peer closes it. Requests on a connection
/// are answered strictly in order.
pub async fn process_connection<S>(socket: S, api: Arc<Api>) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(socket, LinesCodec::new_with_max_length(MAX_LINE_LEN));

    while let Some(next) = framed.next().await {
        let resp = match next {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => handle_line(&api, &line).await,
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                debug!("request line over {MAX_LINE_LEN} bytes");
                Response::from_error(&ApiError::MalformedRequest("request line too long".into()))
            }
            Err(e) => return Err(codec_err(e)),
        };
        framed.send(encode_response(&resp)?).await.map_err(codec_err)?;
    }
    Ok(())
}
