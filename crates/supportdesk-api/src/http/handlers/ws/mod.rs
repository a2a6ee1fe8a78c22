//! WebSocket transport for guest chat windows and admin consoles.
//!
//! Each connection owns a bounded `mpsc` queue that is registered with the
//! notification hub as its observer. The connection task multiplexes that
//! queue and the socket with `tokio::select!`: a `Refresh` notice makes it
//! re-read registry state and push a fresh snapshot, client frames are
//! parsed as tagged JSON commands. Malformed frames are answered with an
//! `error` frame and otherwise ignored.

pub mod admin;
pub mod guest;

use axum::extract::ws::Message;
use futures_util::{Sink, SinkExt};
use serde::Serialize;

/// Serialize `frame` and send it as a text message.
///
/// Returns `false` once the client is gone.
async fn send_frame<W, T>(sender: &mut W, frame: &T) -> bool
where
    W: Sink<Message, Error = axum::Error> + Unpin,
    T: Serialize,
{
    let json = match serde_json::to_string(frame) {
        Ok(json) => json,
        Err(err) => {
            tracing::warn!("Failed to serialize WebSocket frame: {err}");
            return true;
        }
    };
    sender.send(Message::Text(json.into())).await.is_ok()
}

/// Frame sent when a client command cannot be honoured.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename = "error")]
struct ErrorFrame {
    message: String,
}

impl ErrorFrame {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

const PONG: &str = r#"{"type":"pong"}"#;
