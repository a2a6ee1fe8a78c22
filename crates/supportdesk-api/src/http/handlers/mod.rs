//! HTTP and WebSocket request handlers.

pub mod broadcast;
pub mod session;
pub mod ws;
