//! HTTP/WebSocket transport for supportdesk.
//!
//! Axum REST API at `/api/v1/` with envelope responses, plus the guest and
//! admin WebSocket endpoints under `/ws/`.

pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
