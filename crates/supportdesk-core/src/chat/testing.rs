//! In-crate fake store for registry tests.
//!
//! Records every call and can be told to fail or stall, which the real
//! stores in supportdesk-infra cannot do on demand.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use supportdesk_types::chat::{MessageRecord, SessionRecord};
use supportdesk_types::error::RepositoryError;

use super::store::ChatStore;

#[derive(Default)]
pub struct FakeStore {
    sessions: Mutex<Vec<SessionRecord>>,
    messages: Mutex<Vec<MessageRecord>>,
    /// Number of upcoming `insert_message` calls that fail.
    pub failing_message_inserts: AtomicU32,
    /// Number of upcoming `insert_session` calls that fail.
    pub failing_session_inserts: AtomicU32,
    /// Number of upcoming lookups that miss even when a record exists,
    /// simulating another process inserting between lookup and insert.
    pub stale_lookups: AtomicU32,
    /// Session whose `list_messages` calls fail.
    pub unreadable_history: Mutex<Option<String>>,
    /// Delay applied inside `find_session_by_client_id` to widen race windows.
    pub lookup_delay: Mutex<Option<Duration>>,
    pub session_inserts: AtomicUsize,
    pub message_inserts: AtomicUsize,
    pub online_updates: AtomicUsize,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a persisted session with history, as a previous process would have left it.
    pub fn seed(&self, record: SessionRecord, history: &[(&str, &str)]) {
        let session_id = record.session_id.clone();
        self.sessions.lock().unwrap().push(record);
        let mut messages = self.messages.lock().unwrap();
        for (sender, content) in history {
            let id = messages.len() as i64 + 1;
            messages.push(MessageRecord {
                id,
                session_id: session_id.clone(),
                sender: sender.to_string(),
                content: content.to_string(),
                created_at: Utc::now(),
            });
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn messages_for(&self, session_id: &str) -> Vec<MessageRecord> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect()
    }

    pub fn online_flag(&self, session_id: &str) -> Option<bool> {
        self.sessions
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.session_id == session_id)
            .map(|s| s.is_online)
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl ChatStore for FakeStore {
    async fn find_session_by_client_id(
        &self,
        client_id: &str,
    ) -> Result<Option<SessionRecord>, RepositoryError> {
        let delay = *self.lookup_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if Self::take_failure(&self.stale_lookups) {
            return Ok(None);
        }
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.client_id == client_id)
            .cloned())
    }

    async fn insert_session(&self, record: &SessionRecord) -> Result<(), RepositoryError> {
        if Self::take_failure(&self.failing_session_inserts) {
            return Err(RepositoryError::Connection);
        }
        let mut sessions = self.sessions.lock().unwrap();
        if sessions.iter().any(|s| s.client_id == record.client_id) {
            return Err(RepositoryError::Conflict(format!(
                "client_id '{}' already has a session",
                record.client_id
            )));
        }
        sessions.push(record.clone());
        self.session_inserts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update_session_online_status(
        &self,
        session_id: &str,
        online: bool,
    ) -> Result<(), RepositoryError> {
        self.online_updates.fetch_add(1, Ordering::SeqCst);
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions
            .iter_mut()
            .find(|s| s.session_id == session_id)
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
        if Self::take_failure(&self.failing_message_inserts) {
            return Err(RepositoryError::Query("database is locked".to_string()));
        }
        let mut messages = self.messages.lock().unwrap();
        let record = MessageRecord {
            id: messages.len() as i64 + 1,
            session_id: session_id.to_string(),
            sender: sender.to_string(),
            content: content.to_string(),
            created_at: timestamp,
        };
        messages.push(record.clone());
        self.message_inserts.fetch_add(1, Ordering::SeqCst);
        Ok(record)
    }

    async fn list_messages(&self, session_id: &str) -> Result<Vec<MessageRecord>, RepositoryError> {
        if self.unreadable_history.lock().unwrap().as_deref() == Some(session_id) {
            return Err(RepositoryError::Query("malformed row".to_string()));
        }
        Ok(self.messages_for(session_id))
    }

    async fn list_all_sessions(&self) -> Result<Vec<SessionRecord>, RepositoryError> {
        Ok(self.sessions.lock().unwrap().clone())
    }
}
