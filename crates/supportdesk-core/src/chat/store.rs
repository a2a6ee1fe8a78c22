//! ChatStore trait definition.
//!
//! The durable owner of record for sessions and messages. The registry keeps
//! the authoritative in-memory view and writes through this port.

use chrono::{DateTime, Utc};
use supportdesk_types::chat::{MessageRecord, SessionRecord};
use supportdesk_types::error::RepositoryError;

/// Persistence contract for chat sessions and their messages.
///
/// Implementations live in supportdesk-infra (`SqliteChatStore`,
/// `InMemoryChatStore`). Uses native async fn in traits (RPITIT, Rust 2024 edition).
pub trait ChatStore: Send + Sync {
    /// Look up the session created for a client, if any.
    fn find_session_by_client_id(
        &self,
        client_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<SessionRecord>, RepositoryError>> + Send;

    /// Insert a new session record.
    ///
    /// Must fail with `RepositoryError::Conflict` when a record for the same
    /// client id already exists.
    fn insert_session(
        &self,
        record: &SessionRecord,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Persist the online flag and bump `updated_at`.
    fn update_session_online_status(
        &self,
        session_id: &str,
        online: bool,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Append a message to a session.
    fn insert_message(
        &self,
        session_id: &str,
        sender: &str,
        content: &str,
        timestamp: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<MessageRecord, RepositoryError>> + Send;

    /// All messages of a session, ascending by timestamp (insertion order on ties).
    fn list_messages(
        &self,
        session_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<MessageRecord>, RepositoryError>> + Send;

    /// Every persisted session.
    fn list_all_sessions(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<SessionRecord>, RepositoryError>> + Send;
}
