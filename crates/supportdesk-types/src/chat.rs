//! Chat session, message, and observer types for supportdesk.
//!
//! These types model support conversations between one guest client and the
//! support team: in-memory session snapshots, the records the store persists,
//! and the notices pushed to connected observers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;

/// A single message within a chat session.
///
/// Immutable once created. Messages are kept in append order, which is also
/// chronological order; they are never re-sorted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Display name of the author (the guest's display name or the support sender).
    pub sender: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Create a message stamped with the current time.
    pub fn new(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Opaque identity of a connected admin or guest endpoint.
///
/// Only used to register and remove observers; never carries business meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObserverHandle(pub Uuid);

impl ObserverHandle {
    /// Allocate a fresh handle (UUID v7, time-sortable).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ObserverHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObserverHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Snapshot of a chat session as held by the registry.
///
/// Returned by value: mutating a snapshot never affects the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    /// Stable per guest client. New sessions use the client id verbatim.
    pub session_id: String,
    pub display_name: String,
    /// Append-only history in chronological order.
    pub messages: Vec<ChatMessage>,
    pub is_online: bool,
    /// Guest messages not yet acknowledged by an admin.
    pub unread_count: u32,
    /// Handle of the guest connection currently attached, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guest_observer: Option<ObserverHandle>,
}

impl ChatSession {
    /// Timestamp of the most recent message, if the session has any.
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.messages.last().map(|m| m.timestamp)
    }

    /// Condensed view used by admin session lists.
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            display_name: self.display_name.clone(),
            is_online: self.is_online,
            unread_count: self.unread_count,
            message_count: self.messages.len(),
            last_message: self.messages.last().cloned(),
        }
    }
}

/// Admin-list view of a session: counters plus the latest message preview.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub display_name: String,
    pub is_online: bool,
    pub unread_count: u32,
    pub message_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message: Option<ChatMessage>,
}

/// Persisted session row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub client_id: String,
    pub display_name: String,
    pub is_online: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Persisted message row.
///
/// `id` is assigned by the store and only breaks ties between messages that
/// share a timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: i64,
    pub session_id: String,
    pub sender: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<MessageRecord> for ChatMessage {
    fn from(record: MessageRecord) -> Self {
        Self {
            sender: record.sender,
            content: record.content,
            timestamp: record.created_at,
        }
    }
}

/// What an observer is told when something it cares about changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatNotice {
    /// State changed; re-read whatever the observer displays.
    Refresh,
    /// One-off announcement to every connected admin.
    Broadcast { text: String },
}
