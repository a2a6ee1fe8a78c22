//! SQLite chat store implementation.
//!
//! Implements `ChatStore` from `supportdesk-core` using sqlx with split
//! read/write pools: raw queries, private Row structs, reads on the reader
//! pool and writes on the single writer connection.

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::Row;
use supportdesk_core::chat::store::ChatStore;
use supportdesk_types::chat::{MessageRecord, SessionRecord};
use supportdesk_types::error::RepositoryError;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `ChatStore`.
pub struct SqliteChatStore {
    pool: DatabasePool,
}

impl SqliteChatStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct SessionRow {
    session_id: String,
    client_id: String,
    display_name: String,
    is_online: bool,
    created_at: String,
    updated_at: String,
}

impl SessionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            session_id: row.try_get("session_id")?,
            client_id: row.try_get("client_id")?,
            display_name: row.try_get("display_name")?,
            is_online: row.try_get("is_online")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_record(self) -> Result<SessionRecord, RepositoryError> {
        Ok(SessionRecord {
            session_id: self.session_id,
            client_id: self.client_id,
            display_name: self.display_name,
            is_online: self.is_online,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

struct MessageRow {
    id: i64,
    session_id: String,
    sender: String,
    content: String,
    created_at: String,
}

impl MessageRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            session_id: row.try_get("session_id")?,
            sender: row.try_get("sender")?,
            content: row.try_get("content")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_record(self) -> Result<MessageRecord, RepositoryError> {
        Ok(MessageRecord {
            id: self.id,
            session_id: self.session_id,
            sender: self.sender,
            content: self.content,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

/// Fixed-width so that text ordering in SQL matches time ordering.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn map_err(e: sqlx::Error) -> RepositoryError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            RepositoryError::Connection
        }
        other => RepositoryError::Query(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// ChatStore implementation
// ---------------------------------------------------------------------------

impl ChatStore for SqliteChatStore {
    async fn find_session_by_client_id(
        &self,
        client_id: &str,
    ) -> Result<Option<SessionRecord>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM chat_sessions WHERE client_id = ?")
            .bind(client_id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(map_err)?;

        match row {
            Some(row) => {
                let session_row =
                    SessionRow::from_row(&row).map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(session_row.into_record()?))
            }
            None => Ok(None),
        }
    }

    async fn insert_session(&self, record: &SessionRecord) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"INSERT INTO chat_sessions (session_id, client_id, display_name, is_online, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&record.session_id)
        .bind(&record.client_id)
        .bind(&record.display_name)
        .bind(record.is_online)
        .bind(format_datetime(&record.created_at))
        .bind(format_datetime(&record.updated_at))
        .execute(&self.pool.writer)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.message().contains("UNIQUE") => {
                Err(RepositoryError::Conflict(format!(
                    "client_id '{}' already has a session",
                    record.client_id
                )))
            }
            Err(e) => Err(map_err(e)),
        }
    }

    async fn update_session_online_status(
        &self,
        session_id: &str,
        online: bool,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE chat_sessions SET is_online = ?, updated_at = ? WHERE session_id = ?",
        )
        .bind(online)
        .bind(format_datetime(&Utc::now()))
        .bind(session_id)
        .execute(&self.pool.writer)
        .await
        .map_err(map_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn insert_message(
        &self,
        session_id: &str,
        sender: &str,
        content: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<MessageRecord, RepositoryError> {
        let result = sqlx::query(
            r#"INSERT INTO chat_messages (session_id, sender, content, created_at)
               VALUES (?, ?, ?, ?)"#,
        )
        .bind(session_id)
        .bind(sender)
        .bind(content)
        .bind(format_datetime(&timestamp))
        .execute(&self.pool.writer)
        .await;

        match result {
            Ok(done) => Ok(MessageRecord {
                id: done.last_insert_rowid(),
                session_id: session_id.to_string(),
                sender: sender.to_string(),
                content: content.to_string(),
                created_at: timestamp,
            }),
            Err(sqlx::Error::Database(db_err)) if db_err.message().contains("FOREIGN KEY") => {
                Err(RepositoryError::NotFound)
            }
            Err(e) => Err(map_err(e)),
        }
    }

    async fn list_messages(&self, session_id: &str) -> Result<Vec<MessageRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM chat_messages WHERE session_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(map_err)?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in &rows {
            let message_row =
                MessageRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            messages.push(message_row.into_record()?);
        }

        Ok(messages)
    }

    async fn list_all_sessions(&self) -> Result<Vec<SessionRecord>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM chat_sessions ORDER BY created_at ASC")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(map_err)?;

        let mut sessions = Vec::with_capacity(rows.len());
        for row in &rows {
            let session_row =
                SessionRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            sessions.push(session_row.into_record()?);
        }

        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn test_store() -> (tempfile::TempDir, SqliteChatStore) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("chat.db").display());
        let pool = DatabasePool::new(&url).await.unwrap();
        (dir, SqliteChatStore::new(pool))
    }

    fn make_record(client_id: &str) -> SessionRecord {
        let now = Utc::now();
        SessionRecord {
            session_id: client_id.to_string(),
            client_id: client_id.to_string(),
            display_name: format!("Guest {client_id}"),
            is_online: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_insert_and_find_by_client_id() {
        let (_dir, store) = test_store().await;
        let record = make_record("GUEST-1-abc");
        store.insert_session(&record).await.unwrap();

        let found = store
            .find_session_by_client_id("GUEST-1-abc")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.session_id, "GUEST-1-abc");
        assert_eq!(found.display_name, "Guest GUEST-1-abc");
        assert!(found.is_online);

        assert!(store.find_session_by_client_id("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_client_id_is_conflict() {
        let (_dir, store) = test_store().await;
        store.insert_session(&make_record("C1")).await.unwrap();

        let mut dup = make_record("C1");
        dup.session_id = "C1-other".to_string();
        let err = store.insert_session(&dup).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_update_online_status() {
        let (_dir, store) = test_store().await;
        store.insert_session(&make_record("C1")).await.unwrap();

        store.update_session_online_status("C1", false).await.unwrap();
        let found = store.find_session_by_client_id("C1").await.unwrap().unwrap();
        assert!(!found.is_online);

        let err = store
            .update_session_online_status("missing", true)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn test_messages_listed_in_timestamp_order() {
        let (_dir, store) = test_store().await;
        store.insert_session(&make_record("C1")).await.unwrap();
        store.insert_session(&make_record("C2")).await.unwrap();

        let base = Utc::now();
        store
            .insert_message("C1", "support", "welcome", base)
            .await
            .unwrap();
        // Persisted out of order; the listing must follow the timestamps.
        store
            .insert_message("C1", "Guest C1", "second", base + Duration::milliseconds(20))
            .await
            .unwrap();
        store
            .insert_message("C1", "Guest C1", "first", base + Duration::milliseconds(10))
            .await
            .unwrap();
        store
            .insert_message("C2", "support", "elsewhere", base)
            .await
            .unwrap();

        let messages = store.list_messages("C1").await.unwrap();
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["welcome", "first", "second"]);
        assert!(messages.iter().all(|m| m.session_id == "C1"));
    }

    #[tokio::test]
    async fn test_equal_timestamps_keep_insertion_order() {
        let (_dir, store) = test_store().await;
        store.insert_session(&make_record("C1")).await.unwrap();

        let at = Utc::now();
        for content in ["a", "b", "c"] {
            store.insert_message("C1", "Guest C1", content, at).await.unwrap();
        }

        let contents: Vec<String> = store
            .list_messages("C1")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_message_for_unknown_session_is_not_found() {
        let (_dir, store) = test_store().await;
        let err = store
            .insert_message("ghost", "support", "hi", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn test_list_all_sessions() {
        let (_dir, store) = test_store().await;
        assert!(store.list_all_sessions().await.unwrap().is_empty());

        store.insert_session(&make_record("C1")).await.unwrap();
        store.insert_session(&make_record("C2")).await.unwrap();

        let all = store.list_all_sessions().await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_timestamps_round_trip_at_microsecond_precision() {
        let (_dir, store) = test_store().await;
        store.insert_session(&make_record("C1")).await.unwrap();

        let at = Utc::now();
        let inserted = store.insert_message("C1", "support", "hi", at).await.unwrap();
        let listed = store.list_messages("C1").await.unwrap();

        assert_eq!(listed[0].id, inserted.id);
        let drift = (listed[0].created_at - at).num_microseconds().unwrap().abs();
        assert!(drift < 1, "drift {drift}us");
    }
}
