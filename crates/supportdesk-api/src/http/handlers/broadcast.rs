//! POST /api/v1/broadcast - push an announcement to every connected admin.

use std::time::Instant;

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use supportdesk_core::chat::store::ChatStore;

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct BroadcastReceipt {
    /// Admin connections that accepted the notice.
    pub delivered: usize,
}

pub async fn broadcast<S: ChatStore + 'static>(
    State(state): State<AppState<S>>,
    Json(body): Json<BroadcastRequest>,
) -> Result<Json<ApiResponse<BroadcastReceipt>>, AppError> {
    let start = Instant::now();

    if body.text.trim().is_empty() {
        return Err(AppError::Validation("Broadcast text must not be empty".to_string()));
    }

    let delivered = state.registry.broadcast(&body.text);
    Ok(Json(ApiResponse::success(BroadcastReceipt { delivered }, start)))
}
