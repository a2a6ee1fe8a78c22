//! Process-local `ChatStore` for tests and `--ephemeral` runs.
//!
//! Same contract as the SQLite store, including the unique client id and
//! message ordering, but nothing survives a restart.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use supportdesk_core::chat::store::ChatStore;
use supportdesk_types::chat::{MessageRecord, SessionRecord};
use supportdesk_types::error::RepositoryError;

/// In-memory implementation of `ChatStore`.
#[derive(Debug, Default)]
pub struct InMemoryChatStore {
    /// Keyed by client id; the unique key of the contract.
    sessions: DashMap<String, SessionRecord>,
    messages: DashMap<String, Vec<MessageRecord>>,
    next_message_id: AtomicI64,
}

impl InMemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChatStore for InMemoryChatStore {
    async fn find_session_by_client_id(
        &self,
        client_id: &str,
    ) -> Result<Option<SessionRecord>, RepositoryError> {
        Ok(self.sessions.get(client_id).map(|r| r.value().clone()))
    }

    async fn insert_session(&self, record: &SessionRecord) -> Result<(), RepositoryError> {
        match self.sessions.entry(record.client_id.clone()) {
            Entry::Occupied(_) => Err(RepositoryError::Conflict(format!(
                "client_id '{}' already has a session",
                record.client_id
            ))),
            Entry::Vacant(entry) => {
                entry.insert(record.clone());
                Ok(())
            }
        }
    }

    async fn update_session_online_status(
        &self,
        session_id: &str,
        online: bool,
    ) -> Result<(), RepositoryError> {
        let mut session = self
            .sessions
            .iter_mut()
            .find(|r| r.session_id == session_id)
            .ok_or(RepositoryError::NotFound)?;
        session.is_online = online;
        session.updated_at = Utc::now();
        Ok(())
    }

    async fn insert_message(
        &self,
        session_id: &str,
        sender: &str,
        content: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<MessageRecord, RepositoryError> {
        if !self.sessions.iter().any(|r| r.session_id == session_id) {
            return Err(RepositoryError::NotFound);
        }

        let record = MessageRecord {
            id: self.next_message_id.fetch_add(1, Ordering::SeqCst) + 1,
            session_id: session_id.to_string(),
            sender: sender.to_string(),
            content: content.to_string(),
            created_at: timestamp,
        };
        self.messages
            .entry(session_id.to_string())
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    async fn list_messages(&self, session_id: &str) -> Result<Vec<MessageRecord>, RepositoryError> {
        let mut messages = self
            .messages
            .get(session_id)
            .map(|r| r.value().clone())
            .unwrap_or_default();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(messages)
    }

    async fn list_all_sessions(&self) -> Result<Vec<SessionRecord>, RepositoryError> {
        let mut sessions: Vec<SessionRecord> =
            self.sessions.iter().map(|r| r.value().clone()).collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(sessions)
    }
}
