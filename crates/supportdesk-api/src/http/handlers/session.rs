//! Admin-side session HTTP handlers.
//!
//! Endpoints:
//! - GET  /api/v1/sessions                - Session summaries, most recent first
//! - GET  /api/v1/sessions/{id}           - Full session with history
//! - POST /api/v1/sessions/{id}/read      - Reset the unread counter
//! - POST /api/v1/sessions/{id}/messages  - Send a support reply

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};

use supportdesk_core::chat::store::ChatStore;
use supportdesk_types::chat::{ChatMessage, ChatSession, SessionSummary};

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Body of a support reply.
#[derive(Debug, Deserialize)]
pub struct ReplyRequest {
    pub content: String,
}

/// Result of marking a session read.
#[derive(Debug, Serialize)]
pub struct ReadReceipt {
    pub session_id: String,
    pub unread_count: u32,
}

fn not_found(session_id: &str) -> AppError {
    AppError::NotFound(format!("Session '{session_id}' not found"))
}

/// GET /api/v1/sessions
pub async fn list_sessions<S: ChatStore + 'static>(
    State(state): State<AppState<S>>,
) -> Result<Json<ApiResponse<Vec<SessionSummary>>>, AppError> {
    let start = Instant::now();

    let summaries: Vec<SessionSummary> = state
        .registry
        .list_sessions()
        .await
        .iter()
        .map(ChatSession::summary)
        .collect();

    Ok(Json(
        ApiResponse::success(summaries, start).with_link("self", "/api/v1/sessions"),
    ))
}

/// GET /api/v1/sessions/{id}
pub async fn get_session<S: ChatStore + 'static>(
    State(state): State<AppState<S>>,
    Path(session_id): Path<String>,
) -> Result<Json<ApiResponse<ChatSession>>, AppError> {
    let start = Instant::now();

    let session = state
        .registry
        .get_session(&session_id)
        .await
        .ok_or_else(|| not_found(&session_id))?;

    let self_link = format!("/api/v1/sessions/{session_id}");
    Ok(Json(
        ApiResponse::success(session, start)
            .with_link("self", &self_link)
            .with_link("messages", &format!("{self_link}/messages")),
    ))
}

/// POST /api/v1/sessions/{id}/read
pub async fn mark_read<S: ChatStore + 'static>(
    State(state): State<AppState<S>>,
    Path(session_id): Path<String>,
) -> Result<Json<ApiResponse<ReadReceipt>>, AppError> {
    let start = Instant::now();

    if !state.registry.clear_unread(&session_id).await {
        return Err(not_found(&session_id));
    }

    Ok(Json(ApiResponse::success(
        ReadReceipt {
            session_id,
            unread_count: 0,
        },
        start,
    )))
}

/// POST /api/v1/sessions/{id}/messages
///
/// A store failure is reported, but the reply is already in memory and
/// visible to admins and the guest.
pub async fn send_reply<S: ChatStore + 'static>(
    State(state): State<AppState<S>>,
    Path(session_id): Path<String>,
    Json(body): Json<ReplyRequest>,
) -> Result<Json<ApiResponse<ChatMessage>>, AppError> {
    let start = Instant::now();

    let content = body.content.trim();
    if content.is_empty() {
        return Err(AppError::Validation("Reply content must not be empty".to_string()));
    }

    let message = state
        .registry
        .append_admin_message(&session_id, content)
        .await?
        .ok_or_else(|| not_found(&session_id))?;

    tracing::info!(%session_id, "support reply sent");
    Ok(Json(ApiResponse::success(message, start)))
}
