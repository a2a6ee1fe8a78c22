//! Infrastructure layer for supportdesk.
//!
//! Implementations of the `ChatStore` port from `supportdesk-core`
//! (SQLite and in-memory) and the configuration file loader.

pub mod config;
pub mod memory;
pub mod sqlite;
