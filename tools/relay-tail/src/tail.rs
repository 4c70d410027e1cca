//! Live tail over the consumer WebSocket.

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::connect_async;

/// Close code sent when a newer consumer took over the channel.
pub const CLOSE_SUPERSEDED: u16 = 4001;
/// Close code sent when the token was rejected after upgrade.
pub const CLOSE_UNAUTHORIZED: u16 = 4003;

const TOKEN_HEADER: &str = "x-relay-token";

#[derive(Debug, Error)]
pub enum TailError {
    #[error("relay refused the stream ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("invalid relay url {0:?}")]
    InvalidUrl(String),
    #[error("token is not a valid header value")]
    InvalidToken,
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
}

/// How a tail session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TailEnd {
    /// Relay closed with 1000.
    Normal,
    Superseded,
    Unauthorized(String),
    /// Any other close code.
    Closed { code: u16, reason: String },
    /// Stream ended without a close frame.
    Dropped,
}

impl TailEnd {
    pub fn is_success(&self) -> bool {
        matches!(self, TailEnd::Normal)
    }
}

/// `http(s)://host` → `ws(s)://host/channels/stream`.
pub fn stream_url(base_url: &str) -> Result<String, TailError> {
    let base = base_url.trim_end_matches('/');
    let rest = if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if base.starts_with("ws://") || base.starts_with("wss://") {
        base.to_string()
    } else {
        return Err(TailError::InvalidUrl(base_url.to_string()));
    };
    Ok(format!("{}/channels/stream", rest))
}

/// Attach with `token` and hand every relayed message to `on_message` until
/// the relay closes the stream.
pub async fn tail<F>(base_url: &str, token: &str, mut on_message: F) -> Result<TailEnd, TailError>
where
    F: FnMut(&str),
{
    let mut request = stream_url(base_url)?.into_client_request()?;
    request.headers_mut().insert(
        TOKEN_HEADER,
        HeaderValue::from_str(token).map_err(|_| TailError::InvalidToken)?,
    );

    let (ws_stream, _) = connect_async(request).await.map_err(|e| match e {
        tungstenite::Error::Http(response) => {
            let status = response.status().as_u16();
            let body = response
                .body()
                .as_ref()
                .map(|b| String::from_utf8_lossy(b).to_string())
                .unwrap_or_default();
            TailError::Rejected { status, body }
        }
        other => TailError::WebSocket(other),
    })?;

    let (mut write, mut read) = ws_stream.split();

    while let Some(msg) = read.next().await {
        match msg? {
            Message::Text(text) => on_message(&text),
            Message::Binary(data) => on_message(&String::from_utf8_lossy(&data)),
            Message::Ping(data) => {
                let _ = write.send(Message::Pong(data)).await;
            }
            Message::Close(frame) => {
                return Ok(match frame {
                    None => TailEnd::Normal,
                    Some(frame) => classify(frame.code, frame.reason.to_string()),
                });
            }
            _ => {}
        }
    }

    Ok(TailEnd::Dropped)
}

fn classify(code: CloseCode, reason: String) -> TailEnd {
    match u16::from(code) {
        1000 => TailEnd::Normal,
        CLOSE_SUPERSEDED => TailEnd::Superseded,
        CLOSE_UNAUTHORIZED => TailEnd::Unauthorized(reason),
        code => TailEnd::Closed { code, reason },
    }
}
