//! Support console socket at `/ws/admin`.
//!
//! The connection attaches as an admin observer (the first admin to attach
//! loads persisted sessions). It pushes the session list on connect and on
//! every `Refresh`, plus the detail of the session the admin has open, and
//! forwards broadcast announcements. Inbound commands:
//!
//! - `{"type":"open","session_id":"..."}` selects a session and marks it read.
//! - `{"type":"reply","session_id":"...","content":"..."}` sends a support reply.
//! - `{"type":"ping"}` is answered with `{"type":"pong"}`.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{Sink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use supportdesk_core::chat::store::ChatStore;
use supportdesk_types::chat::{ChatNotice, ChatSession, ObserverHandle, SessionSummary};

use super::{ErrorFrame, PONG, send_frame};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AdminCommand {
    Open { session_id: String },
    Reply { session_id: String, content: String },
    Ping,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AdminFrame<'a> {
    Sessions { sessions: Vec<SessionSummary> },
    Session { session: &'a ChatSession },
    Broadcast { text: &'a str },
}

pub async fn admin_ws_handler<S: ChatStore + 'static>(
    ws: WebSocketUpgrade,
    State(state): State<AppState<S>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_admin_connection(socket, state))
}

/// Per-connection console state.
struct Console<S: ChatStore + 'static> {
    state: AppState<S>,
    /// Session whose detail view is open, if any.
    selected: Option<String>,
}

async fn handle_admin_connection<S: ChatStore + 'static>(socket: WebSocket, state: AppState<S>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let handle = ObserverHandle::new();

    let buffer = state.config.chat.observer_buffer.max(1);
    let (notice_tx, mut notice_rx) = mpsc::channel::<ChatNotice>(buffer);
    match state.registry.attach_admin(handle, Arc::new(notice_tx)).await {
        Ok(loaded) if loaded > 0 => {
            tracing::info!(%handle, loaded, "admin attached, persisted sessions loaded");
        }
        Ok(_) => tracing::debug!(%handle, "admin attached"),
        // The observer stays attached; the list just starts out incomplete.
        Err(err) => tracing::warn!(%handle, error = %err, "Failed to load persisted sessions"),
    }

    let mut console = Console {
        state,
        selected: None,
    };

    if console.refresh(&mut ws_sender).await {
        loop {
            tokio::select! {
                notice = notice_rx.recv() => {
                    let alive = match notice {
                        Some(ChatNotice::Refresh) => console.refresh(&mut ws_sender).await,
                        Some(ChatNotice::Broadcast { text }) => {
                            send_frame(&mut ws_sender, &AdminFrame::Broadcast { text: &text }).await
                        }
                        None => false,
                    };
                    if !alive {
                        break;
                    }
                }

                msg_result = ws_receiver.next() => {
                    match msg_result {
                        Some(Ok(Message::Text(text))) => {
                            if !console.process_command(&text, &mut ws_sender).await {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Err(err)) => {
                            tracing::debug!("Admin WebSocket receive error: {err}");
                            break;
                        }
                        Some(Ok(_)) => {}
                    }
                }
            }
        }
    }

    console.state.registry.detach_admin(&handle);
    tracing::debug!(%handle, "admin disconnected");
}

impl<S: ChatStore + 'static> Console<S> {
    /// Push the session list and the open session's detail.
    ///
    /// Returns `false` once the client is gone.
    async fn refresh<W>(&self, ws_sender: &mut W) -> bool
    where
        W: Sink<Message, Error = axum::Error> + Unpin,
    {
        let sessions = self.state.registry.list_sessions().await;
        let summaries = sessions.iter().map(ChatSession::summary).collect();
        if !send_frame(ws_sender, &AdminFrame::Sessions { sessions: summaries }).await {
            return false;
        }

        let Some(selected) = &self.selected else {
            return true;
        };
        match sessions.iter().find(|s| &s.session_id == selected) {
            Some(session) => send_frame(ws_sender, &AdminFrame::Session { session }).await,
            None => true,
        }
    }

    async fn process_command<W>(&mut self, text: &str, ws_sender: &mut W) -> bool
    where
        W: Sink<Message, Error = axum::Error> + Unpin,
    {
        let cmd: AdminCommand = match serde_json::from_str(text) {
            Ok(cmd) => cmd,
            Err(err) => {
                tracing::warn!(raw = %text, error = %err, "Ignoring malformed admin command");
                return send_frame(ws_sender, &ErrorFrame::new("unrecognised command")).await;
            }
        };

        let registry = &self.state.registry;
        match cmd {
            AdminCommand::Open { session_id } => {
                // Clearing notifies every admin, this one included, which
                // pushes the detail view through `refresh`.
                if registry.clear_unread(&session_id).await {
                    self.selected = Some(session_id);
                    true
                } else {
                    let message = format!("unknown session '{session_id}'");
                    send_frame(ws_sender, &ErrorFrame::new(message)).await
                }
            }
            AdminCommand::Reply {
                session_id,
                content,
            } => {
                let content = content.trim();
                if content.is_empty() {
                    return true;
                }
                match registry.append_admin_message(&session_id, content).await {
                    Ok(Some(_)) => true,
                    Ok(None) => {
                        let message = format!("unknown session '{session_id}'");
                        send_frame(ws_sender, &ErrorFrame::new(message)).await
                    }
                    Err(err) => {
                        tracing::warn!(%session_id, error = %err, "Support reply not persisted");
                        send_frame(ws_sender, &ErrorFrame::new("reply saved but not persisted")).await
                    }
                }
            }
            AdminCommand::Ping => ws_sender.send(Message::Text(PONG.into())).await.is_ok(),
        }
    }
}
