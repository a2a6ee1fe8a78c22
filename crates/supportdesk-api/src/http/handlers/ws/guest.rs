//! Guest chat socket at `/ws/guest?client_id=...`.
//!
//! On connect the guest's session is resumed or created and a `session`
//! snapshot is pushed; every later `Refresh` for this session pushes a new
//! one. Inbound commands:
//!
//! - `{"type":"send","content":"..."}` appends a guest message.
//! - `{"type":"ping"}` is answered with `{"type":"pong"}`.
//!
//! On close the guest goes offline, unless a newer connection for the same
//! client has taken over in the meantime.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures_util::{Sink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use supportdesk_core::chat::store::ChatStore;
use supportdesk_core::notify::observer::Observer;
use supportdesk_types::chat::{ChatNotice, ChatSession, ObserverHandle};

use super::{ErrorFrame, PONG, send_frame};
use crate::http::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct GuestQuery {
    pub client_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum GuestCommand {
    Send { content: String },
    Ping,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum GuestFrame<'a> {
    Session { session: &'a ChatSession },
}

pub async fn guest_ws_handler<S: ChatStore + 'static>(
    ws: WebSocketUpgrade,
    State(state): State<AppState<S>>,
    Query(query): Query<GuestQuery>,
) -> Result<impl IntoResponse, AppError> {
    let client_id = query.client_id.trim().to_string();
    if client_id.is_empty() {
        return Err(AppError::Validation("client_id must not be empty".to_string()));
    }
    Ok(ws.on_upgrade(move |socket| handle_guest_connection(socket, state, client_id)))
}

async fn handle_guest_connection<S: ChatStore + 'static>(
    socket: WebSocket,
    state: AppState<S>,
    client_id: String,
) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let registry = state.registry.clone();
    let handle = ObserverHandle::new();

    let buffer = state.config.chat.observer_buffer.max(1);
    let (notice_tx, mut notice_rx) = mpsc::channel::<ChatNotice>(buffer);
    let observer: Arc<dyn Observer> = Arc::new(notice_tx);

    let session_id = match registry.connect_guest(&client_id, handle, observer).await {
        Ok(session) => session.session_id,
        Err(err) => {
            tracing::warn!(%client_id, error = %err, "Failed to open guest session");
            // Sessions are keyed by client id; clears anything left attached to us.
            release(&state, &client_id, handle).await;
            let frame = ErrorFrame::new("chat is unavailable, please retry");
            let _ = send_frame(&mut ws_sender, &frame).await;
            return;
        }
    };

    tracing::debug!(%session_id, %handle, "guest connected");

    if !push_snapshot(&mut ws_sender, &state, &session_id).await {
        release(&state, &session_id, handle).await;
        return;
    }

    loop {
        tokio::select! {
            notice = notice_rx.recv() => {
                match notice {
                    Some(ChatNotice::Refresh) => {
                        if !push_snapshot(&mut ws_sender, &state, &session_id).await {
                            break;
                        }
                    }
                    // Announcements are for the support console only.
                    Some(ChatNotice::Broadcast { .. }) => {}
                    None => break,
                }
            }

            msg_result = ws_receiver.next() => {
                match msg_result {
                    Some(Ok(Message::Text(text))) => {
                        if !process_command(&text, &mut ws_sender, &state, &session_id).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(err)) => {
                        tracing::debug!("Guest WebSocket receive error: {err}");
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    release(&state, &session_id, handle).await;
    tracing::debug!(%session_id, %handle, "guest disconnected");
}

/// Returns `false` once the client is gone.
async fn process_command<S, W>(
    text: &str,
    ws_sender: &mut W,
    state: &AppState<S>,
    session_id: &str,
) -> bool
where
    S: ChatStore + 'static,
    W: Sink<Message, Error = axum::Error> + Unpin,
{
    let cmd: GuestCommand = match serde_json::from_str(text) {
        Ok(cmd) => cmd,
        Err(err) => {
            tracing::warn!(raw = %text, error = %err, "Ignoring malformed guest command");
            return send_frame(ws_sender, &ErrorFrame::new("unrecognised command")).await;
        }
    };

    match cmd {
        GuestCommand::Send { content } => {
            let content = content.trim();
            if content.is_empty() {
                return true;
            }
            if let Err(err) = state.registry.append_guest_message(session_id, content).await {
                // Already in memory and shown to support; only persistence failed.
                tracing::warn!(%session_id, error = %err, "Guest message not persisted");
            }
            push_snapshot(ws_sender, state, session_id).await
        }
        GuestCommand::Ping => ws_sender.send(Message::Text(PONG.into())).await.is_ok(),
    }
}

async fn push_snapshot<S, W>(ws_sender: &mut W, state: &AppState<S>, session_id: &str) -> bool
where
    S: ChatStore + 'static,
    W: Sink<Message, Error = axum::Error> + Unpin,
{
    match state.registry.get_session(session_id).await {
        Some(session) => send_frame(ws_sender, &GuestFrame::Session { session: &session }).await,
        None => true,
    }
}

/// Take the guest offline and drop its observer, unless superseded.
async fn release<S: ChatStore + 'static>(
    state: &AppState<S>,
    session_id: &str,
    handle: ObserverHandle,
) {
    if let Err(err) = state.registry.disconnect_guest(session_id, handle).await {
        tracing::warn!(%session_id, error = %err, "Offline status not persisted");
    }
}
