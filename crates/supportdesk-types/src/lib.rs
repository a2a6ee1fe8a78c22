//! Shared domain types for supportdesk.
//!
//! Chat sessions, messages, store records, observer notices, configuration,
//! and the error types shared by every crate in the workspace.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod chat;
pub mod config;
pub mod error;
