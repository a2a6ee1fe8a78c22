//! Session registry: the in-process source of truth for support chats.
//!
//! Sessions live in a `DashMap` of per-session async mutexes, so mutations on
//! one session never wait on another. Opening a session for a client is
//! serialized per client id, which makes "check memory, check store, else
//! create" atomic for that client without a registry-wide lock.
//!
//! Locking rules:
//! - Never hold a `DashMap` guard across `.await`; clone the slot `Arc` out.
//! - Never hold a session mutex while calling the store or the hub.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use supportdesk_types::chat::{
    ChatMessage, ChatSession, MessageRecord, ObserverHandle, SessionRecord,
};
use supportdesk_types::config::ChatConfig;
use supportdesk_types::error::{ChatError, RepositoryError};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::policy::StorePolicy;
use super::store::ChatStore;
use crate::notify::hub::NotificationHub;
use crate::notify::observer::Observer;

type Slot = Arc<Mutex<ChatSession>>;

/// Owns every chat session known to this process.
///
/// Construct once at startup and share behind an `Arc`.
pub struct SessionRegistry<S: ChatStore> {
    store: S,
    hub: Arc<NotificationHub>,
    config: ChatConfig,
    policy: StorePolicy,
    sessions: DashMap<String, Slot>,
    open_locks: DashMap<String, Arc<Mutex<()>>>,
    load_lock: Mutex<()>,
}

impl<S: ChatStore> SessionRegistry<S> {
    pub fn new(store: S, hub: Arc<NotificationHub>, config: ChatConfig, policy: StorePolicy) -> Self {
        Self {
            store,
            hub,
            config,
            policy,
            sessions: DashMap::new(),
            open_locks: DashMap::new(),
            load_lock: Mutex::new(()),
        }
    }

    /// Access the backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Access the notification hub (guest observer registration lives there).
    pub fn hub(&self) -> &Arc<NotificationHub> {
        &self.hub
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Number of sessions held in memory.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    // --- Guest lifecycle ---

    /// Resume or create the session for a guest client and attach `handle`.
    ///
    /// Resolution order: in-memory session, then the store's record for the
    /// client (history restored in order), then a brand-new session with a
    /// welcome message. At most one session per client id, even under
    /// concurrent opens.
    ///
    /// A session is never attached without a persisted welcome message. If
    /// persisting it fails the attach is rolled back and the error returned;
    /// the next open writes it again.
    pub async fn open_guest_session(
        &self,
        client_id: &str,
        handle: ObserverHandle,
    ) -> Result<ChatSession, ChatError> {
        self.open(client_id, handle, None).await
    }

    /// Like [`open_guest_session`](Self::open_guest_session), and registers
    /// `observer` as the session's guest observer before the per-client lock
    /// is released. Reconnects therefore always leave the newest connection's
    /// observer in the hub.
    pub async fn connect_guest(
        &self,
        client_id: &str,
        handle: ObserverHandle,
        observer: Arc<dyn Observer>,
    ) -> Result<ChatSession, ChatError> {
        self.open(client_id, handle, Some(observer)).await
    }

    /// Mark a guest online or offline.
    ///
    /// Going offline detaches the guest observer handle, so admin replies no
    /// longer reach the guest until it reconnects. Unknown sessions are ignored.
    pub async fn set_guest_online(&self, session_id: &str, online: bool) -> Result<(), ChatError> {
        let Some(slot) = self.slot(session_id) else {
            debug!(%session_id, "ignoring status change for unknown session");
            return Ok(());
        };

        {
            let mut session = slot.lock().await;
            session.is_online = online;
            if !online {
                session.guest_observer = None;
            }
        }

        let persisted = self.persist_online(session_id, online).await;
        self.hub.notify_admins();
        persisted
    }

    /// Take a guest offline only if `handle` is still the attached connection,
    /// and drop the session's guest observer with it.
    ///
    /// A connection that was superseded by a reconnect must not knock the new
    /// one offline. Returns whether the session went offline.
    pub async fn disconnect_guest(
        &self,
        session_id: &str,
        handle: ObserverHandle,
    ) -> Result<bool, ChatError> {
        let Some(slot) = self.slot(session_id) else {
            return Ok(false);
        };

        // Same lock as `open`, so a reconnect cannot slip in between the
        // handle check and the observer removal.
        let open_lock = self.open_lock(session_id);
        let _guard = open_lock.lock().await;

        {
            let mut session = slot.lock().await;
            if session.guest_observer != Some(handle) {
                debug!(%session_id, %handle, "stale disconnect ignored");
                return Ok(false);
            }
            session.is_online = false;
            session.guest_observer = None;
        }
        self.hub.unregister_guest_observer(session_id);

        let persisted = self.persist_online(session_id, false).await;
        self.hub.notify_admins();
        persisted.map(|()| true)
    }

    // --- Messages ---

    /// Append a guest-authored message and bump the unread counter.
    ///
    /// Returns `Ok(None)` for unknown sessions. On a store failure the message
    /// stays in memory and the error is returned.
    pub async fn append_guest_message(
        &self,
        session_id: &str,
        content: &str,
    ) -> Result<Option<ChatMessage>, ChatError> {
        let Some(slot) = self.slot(session_id) else {
            debug!(%session_id, "dropping guest message for unknown session");
            return Ok(None);
        };

        let message = {
            let mut session = slot.lock().await;
            let message = ChatMessage::new(session.display_name.clone(), content);
            session.messages.push(message.clone());
            session.unread_count += 1;
            message
        };

        let persisted = self.persist_message(session_id, &message).await;
        self.hub.notify_admins();
        persisted.map(|_| Some(message))
    }

    /// Append a support reply, reset the unread counter and push to the guest.
    ///
    /// The guest observer is only invoked while a guest connection is
    /// attached. Returns `Ok(None)` for unknown sessions.
    pub async fn append_admin_message(
        &self,
        session_id: &str,
        content: &str,
    ) -> Result<Option<ChatMessage>, ChatError> {
        let Some(slot) = self.slot(session_id) else {
            debug!(%session_id, "dropping admin reply for unknown session");
            return Ok(None);
        };

        let (message, guest_attached) = {
            let mut session = slot.lock().await;
            let message = ChatMessage::new(self.config.support_sender.clone(), content);
            session.messages.push(message.clone());
            session.unread_count = 0;
            (message, session.guest_observer.is_some())
        };

        let persisted = self.persist_message(session_id, &message).await;
        if guest_attached {
            self.hub.notify_guest(session_id);
        }
        self.hub.notify_admins();
        persisted.map(|_| Some(message))
    }

    /// Reset the unread counter (an admin opened the session).
    ///
    /// Returns `false` for unknown sessions.
    pub async fn clear_unread(&self, session_id: &str) -> bool {
        let Some(slot) = self.slot(session_id) else {
            return false;
        };
        slot.lock().await.unread_count = 0;
        self.hub.notify_admins();
        true
    }

    // --- Queries ---

    /// Snapshot of one session.
    pub async fn get_session(&self, session_id: &str) -> Option<ChatSession> {
        let slot = self.slot(session_id)?;
        let session = slot.lock().await.clone();
        Some(session)
    }

    /// Snapshots of every session, most recent activity first.
    ///
    /// Sessions without messages sort last; ties fall back to session id.
    pub async fn list_sessions(&self) -> Vec<ChatSession> {
        let slots: Vec<Slot> = self.sessions.iter().map(|r| r.value().clone()).collect();

        let mut sessions = Vec::with_capacity(slots.len());
        for slot in slots {
            sessions.push(slot.lock().await.clone());
        }

        sessions.sort_by(|a, b| {
            b.last_activity()
                .cmp(&a.last_activity())
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        sessions
    }

    // --- Admin lifecycle ---

    /// Register an admin observer.
    ///
    /// The first admin to attach to an empty registry triggers a bulk load of
    /// every persisted session (offline, with history). The observer stays
    /// registered even if that load fails.
    pub async fn attach_admin(
        &self,
        handle: ObserverHandle,
        observer: Arc<dyn Observer>,
    ) -> Result<usize, ChatError> {
        self.hub.register_admin(handle, observer);

        if self.sessions.is_empty() {
            return self.load_persisted_sessions().await;
        }
        Ok(0)
    }

    /// Unregister an admin observer. Idempotent.
    pub fn detach_admin(&self, handle: &ObserverHandle) -> bool {
        self.hub.unregister_admin(handle)
    }

    /// Push an announcement to every connected admin.
    pub fn broadcast(&self, text: &str) -> usize {
        info!(admins = self.hub.admin_count(), "broadcasting notice");
        self.hub.broadcast(text)
    }

    /// Load every persisted session not yet in memory. Returns how many were added.
    pub async fn load_persisted_sessions(&self) -> Result<usize, ChatError> {
        let _guard = self.load_lock.lock().await;

        let store = &self.store;
        let records = self
            .policy
            .run("list_all_sessions", move || store.list_all_sessions())
            .await
            .inspect_err(|e| warn!(error = %e, "bulk session load failed"))?;

        let mut loaded = 0;
        for record in records {
            if self.sessions.contains_key(&record.session_id) {
                continue;
            }
            // One unreadable history must not hide every other session.
            let Ok(history) = self.load_history(&record.session_id).await else {
                continue;
            };
            let session = ChatSession {
                session_id: record.session_id.clone(),
                display_name: record.display_name,
                messages: history,
                is_online: false,
                unread_count: 0,
                guest_observer: None,
            };
            if let dashmap::mapref::entry::Entry::Vacant(entry) =
                self.sessions.entry(record.session_id)
            {
                entry.insert(Arc::new(Mutex::new(session)));
                loaded += 1;
            }
        }

        if loaded > 0 {
            info!(loaded, "restored persisted sessions");
            self.hub.notify_admins();
        }
        Ok(loaded)
    }

    // --- Internals ---

    async fn open(
        &self,
        client_id: &str,
        handle: ObserverHandle,
        observer: Option<Arc<dyn Observer>>,
    ) -> Result<ChatSession, ChatError> {
        if client_id.trim().is_empty() {
            return Err(ChatError::InvalidClientId);
        }

        let open_lock = self.open_lock(client_id);
        let _guard = open_lock.lock().await;

        let session = self.open_locked(client_id, handle).await?;
        if let Some(observer) = observer {
            self.hub.register_guest_observer(&session.session_id, observer);
        }
        Ok(session)
    }

    /// Resolve and attach the session. Caller holds the client's open lock.
    async fn open_locked(
        &self,
        client_id: &str,
        handle: ObserverHandle,
    ) -> Result<ChatSession, ChatError> {
        // New sessions are keyed by their client id.
        if let Some(slot) = self.slot(client_id) {
            debug!(%client_id, "resuming in-memory session");
            return self.resume(slot, handle).await;
        }

        let store = &self.store;
        let existing = self
            .policy
            .run("find_session_by_client_id", move || {
                store.find_session_by_client_id(client_id)
            })
            .await
            .inspect_err(|e| warn!(%client_id, error = %e, "session lookup failed"))?;

        match existing {
            Some(record) => self.restore(record, handle).await,
            None => self.create(client_id, handle).await,
        }
    }

    fn open_lock(&self, client_id: &str) -> Arc<Mutex<()>> {
        self.open_locks
            .entry(client_id.to_string())
            .or_default()
            .clone()
    }

    fn slot(&self, session_id: &str) -> Option<Slot> {
        self.sessions.get(session_id).map(|r| r.value().clone())
    }

    /// Insert `session` unless another path got there first; returns the live slot.
    fn install(&self, session: ChatSession) -> Slot {
        self.sessions
            .entry(session.session_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(session)))
            .clone()
    }

    /// Attach `handle`, writing the welcome message first if the session has
    /// none yet (new, or a previous welcome never reached the store).
    async fn resume(&self, slot: Slot, handle: ObserverHandle) -> Result<ChatSession, ChatError> {
        let (session_id, welcome) = {
            let mut session = slot.lock().await;
            session.is_online = true;
            session.guest_observer = Some(handle);
            let welcome = session.messages.is_empty().then(|| self.welcome_message());
            (session.session_id.clone(), welcome)
        };

        if let Some(welcome) = welcome {
            if let Err(err) = self.persist_message(&session_id, &welcome).await {
                {
                    let mut session = slot.lock().await;
                    if session.guest_observer == Some(handle) {
                        session.is_online = false;
                        session.guest_observer = None;
                    }
                }
                let _ = self.persist_online(&session_id, false).await;
                self.hub.notify_admins();
                return Err(err);
            }

            let mut session = slot.lock().await;
            let at = session
                .messages
                .partition_point(|m| m.timestamp <= welcome.timestamp);
            session.messages.insert(at, welcome);
        }

        // Best effort: the online flag is advisory in the store.
        let _ = self.persist_online(&session_id, true).await;
        self.hub.notify_admins();
        let snapshot = slot.lock().await.clone();
        Ok(snapshot)
    }

    async fn restore(
        &self,
        record: SessionRecord,
        handle: ObserverHandle,
    ) -> Result<ChatSession, ChatError> {
        let history = self.load_history(&record.session_id).await?;
        info!(
            session_id = %record.session_id,
            messages = history.len(),
            "restoring session from store"
        );

        let slot = self.install(ChatSession {
            session_id: record.session_id,
            display_name: record.display_name,
            messages: history,
            is_online: false,
            unread_count: 0,
            guest_observer: None,
        });
        self.resume(slot, handle).await
    }

    async fn create(
        &self,
        client_id: &str,
        handle: ObserverHandle,
    ) -> Result<ChatSession, ChatError> {
        let now = Utc::now();
        let record = SessionRecord {
            session_id: client_id.to_string(),
            client_id: client_id.to_string(),
            display_name: self.config.display_name_for(client_id),
            is_online: true,
            created_at: now,
            updated_at: now,
        };

        let store = &self.store;
        let pending = &record;
        let inserted = self
            .policy
            .run("insert_session", move || store.insert_session(pending))
            .await;

        match inserted {
            Ok(()) => {}
            Err(RepositoryError::Conflict(reason)) => {
                // Another process won the race; adopt its record.
                warn!(%client_id, %reason, "session already persisted, restoring winner");
                let winner = self
                    .policy
                    .run("find_session_by_client_id", move || {
                        store.find_session_by_client_id(client_id)
                    })
                    .await?
                    .ok_or(RepositoryError::NotFound)?;
                return self.restore(winner, handle).await;
            }
            Err(err) => {
                warn!(%client_id, error = %err, "failed to persist new session");
                return Err(err.into());
            }
        }

        info!(session_id = %record.session_id, "created guest session");
        // Empty, so `resume` writes the welcome message.
        let slot = self.install(ChatSession {
            session_id: record.session_id,
            display_name: record.display_name,
            messages: Vec::new(),
            is_online: false,
            unread_count: 0,
            guest_observer: None,
        });
        self.resume(slot, handle).await
    }

    fn welcome_message(&self) -> ChatMessage {
        ChatMessage::new(
            self.config.support_sender.clone(),
            self.config.welcome_message.clone(),
        )
    }

    async fn load_history(&self, session_id: &str) -> Result<Vec<ChatMessage>, ChatError> {
        let store = &self.store;
        let records: Vec<MessageRecord> = self
            .policy
            .run("list_messages", move || store.list_messages(session_id))
            .await
            .inspect_err(|e| warn!(%session_id, error = %e, "failed to load history"))?;
        Ok(records.into_iter().map(ChatMessage::from).collect())
    }

    async fn persist_message(
        &self,
        session_id: &str,
        message: &ChatMessage,
    ) -> Result<MessageRecord, ChatError> {
        let store = &self.store;
        self.policy
            .run("insert_message", move || {
                store.insert_message(
                    session_id,
                    &message.sender,
                    &message.content,
                    message.timestamp,
                )
            })
            .await
            .map_err(|e| {
                warn!(%session_id, error = %e, "message kept in memory but not persisted");
                ChatError::from(e)
            })
    }

    async fn persist_online(&self, session_id: &str, online: bool) -> Result<(), ChatError> {
        let store = &self.store;
        self.policy
            .run("update_session_online_status", move || {
                store.update_session_online_status(session_id, online)
            })
            .await
            .map_err(|e| {
                warn!(%session_id, online, error = %e, "failed to persist online status");
                ChatError::from(e)
            })
    }
}

impl<S: ChatStore> std::fmt::Debug for SessionRegistry<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.sessions.len())
            .field("hub", &self.hub)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::testing::FakeStore;
    use crate::notify::observer::FnObserver;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use supportdesk_types::chat::ChatNotice;
    use supportdesk_types::error::ObserverError;

    fn test_policy() -> StorePolicy {
        StorePolicy {
            attempts: 1,
            timeout: Duration::from_secs(2),
            backoff: Duration::from_millis(1),
        }
    }

    fn registry() -> SessionRegistry<FakeStore> {
        SessionRegistry::new(
            FakeStore::new(),
            Arc::new(NotificationHub::new()),
            ChatConfig::default(),
            test_policy(),
        )
    }

    fn counting_observer() -> (Arc<AtomicUsize>, Arc<dyn Observer>) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let observer = FnObserver(move |_: &ChatNotice| -> Result<(), ObserverError> {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        (count, Arc::new(observer))
    }

    fn record(client_id: &str) -> SessionRecord {
        SessionRecord {
            session_id: client_id.to_string(),
            client_id: client_id.to_string(),
            display_name: format!("Guest {client_id}"),
            is_online: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    async fn tick() {
        tokio::time::sleep(Duration::from_millis(3)).await;
    }

    #[tokio::test]
    async fn test_guest_and_admin_exchange() {
        let registry = registry();
        let handle = ObserverHandle::new();

        let session = registry.open_guest_session("C1", handle).await.unwrap();
        assert_eq!(session.session_id, "C1");
        assert_eq!(session.messages.len(), 1);
        assert_eq!(session.messages[0].sender, "support");
        assert_eq!(session.messages[0].content, registry.config().welcome_message);
        assert!(session.is_online);
        assert_eq!(session.guest_observer, Some(handle));

        let (guest_calls, guest_observer) = counting_observer();
        registry.hub().register_guest_observer("C1", guest_observer);

        registry.append_guest_message("C1", "hello").await.unwrap();
        let session = registry.get_session("C1").await.unwrap();
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.unread_count, 1);
        assert_eq!(session.messages[1].sender, "Guest C1");

        registry.append_admin_message("C1", "hi there").await.unwrap();
        let session = registry.get_session("C1").await.unwrap();
        assert_eq!(session.messages.len(), 3);
        assert_eq!(session.unread_count, 0);
        assert_eq!(session.messages[2].sender, "support");
        assert_eq!(guest_calls.load(Ordering::SeqCst), 1);

        // Welcome, guest message and reply all reached the store.
        let persisted = registry.store().messages_for("C1");
        let contents: Vec<&str> = persisted.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents[1..], ["hello", "hi there"]);
    }

    #[tokio::test]
    async fn test_unread_counts_guest_messages_since_last_ack() {
        let registry = registry();
        registry.open_guest_session("C1", ObserverHandle::new()).await.unwrap();
        registry.open_guest_session("C2", ObserverHandle::new()).await.unwrap();

        for i in 0..3 {
            registry.append_guest_message("C1", &format!("m{i}")).await.unwrap();
        }
        registry.append_guest_message("C2", "other").await.unwrap();
        assert_eq!(registry.get_session("C1").await.unwrap().unread_count, 3);

        assert!(registry.clear_unread("C1").await);
        registry.append_guest_message("C1", "again").await.unwrap();
        assert_eq!(registry.get_session("C1").await.unwrap().unread_count, 1);

        registry.append_admin_message("C1", "on it").await.unwrap();
        assert_eq!(registry.get_session("C1").await.unwrap().unread_count, 0);
        assert_eq!(registry.get_session("C2").await.unwrap().unread_count, 1);

        let contents: Vec<String> = registry
            .get_session("C1")
            .await
            .unwrap()
            .messages
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents[1..], ["m0", "m1", "m2", "again", "on it"]);
    }

    #[tokio::test]
    async fn test_reopen_keeps_history_prefix() {
        let registry = registry();
        let first = registry.open_guest_session("C1", ObserverHandle::new()).await.unwrap();
        registry.append_guest_message("C1", "hello").await.unwrap();
        let seen = registry.get_session("C1").await.unwrap();

        registry.set_guest_online("C1", false).await.unwrap();
        let reopened = registry.open_guest_session("C1", ObserverHandle::new()).await.unwrap();

        assert_eq!(reopened.session_id, first.session_id);
        assert!(reopened.is_online);
        assert!(reopened.messages.starts_with(&seen.messages));
        assert_eq!(registry.store().session_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_opens_create_one_session() {
        let registry = Arc::new(registry());
        *registry.store().lookup_delay.lock().unwrap() = Some(Duration::from_millis(5));

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                registry
                    .open_guest_session("RACE", ObserverHandle::new())
                    .await
                    .unwrap()
                    .session_id
            }));
        }

        for task in tasks {
            assert_eq!(task.await.unwrap(), "RACE");
        }
        assert_eq!(registry.store().session_count(), 1);
        assert_eq!(registry.store().messages_for("RACE").len(), 1);
        assert_eq!(registry.get_session("RACE").await.unwrap().messages.len(), 1);
    }

    #[tokio::test]
    async fn test_open_restores_persisted_history() {
        let registry = registry();
        registry.store().seed(
            record("C9"),
            &[("support", "welcome"), ("Guest C9", "where is my order?")],
        );

        let session = registry.open_guest_session("C9", ObserverHandle::new()).await.unwrap();
        assert_eq!(session.display_name, "Guest C9");
        assert!(session.is_online);
        let contents: Vec<&str> = session.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["welcome", "where is my order?"]);
        assert_eq!(registry.store().online_flag("C9"), Some(true));
        // No new record and no second welcome.
        assert_eq!(registry.store().session_inserts.load(Ordering::SeqCst), 0);
        assert_eq!(registry.store().message_inserts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_insert_conflict_falls_back_to_winner() {
        let registry = registry();
        registry.store().seed(record("C7"), &[("support", "welcome")]);
        registry.store().stale_lookups.store(1, Ordering::SeqCst);

        let session = registry.open_guest_session("C7", ObserverHandle::new()).await.unwrap();
        assert_eq!(session.session_id, "C7");
        assert_eq!(session.messages.len(), 1);
        assert_eq!(registry.store().session_count(), 1);
    }

    #[tokio::test]
    async fn test_detached_guest_is_not_notified() {
        let registry = registry();
        registry.open_guest_session("C1", ObserverHandle::new()).await.unwrap();
        let (guest_calls, guest_observer) = counting_observer();
        registry.hub().register_guest_observer("C1", guest_observer);

        registry.set_guest_online("C1", false).await.unwrap();
        let reply = registry.append_admin_message("C1", "still there?").await.unwrap();

        assert!(reply.is_some());
        let session = registry.get_session("C1").await.unwrap();
        assert_eq!(session.messages.len(), 2);
        assert!(!session.is_online);
        assert!(session.guest_observer.is_none());
        assert_eq!(guest_calls.load(Ordering::SeqCst), 0);
        assert_eq!(registry.store().online_flag("C1"), Some(false));
    }

    #[tokio::test]
    async fn test_stale_disconnect_is_ignored() {
        let registry = registry();
        let old = ObserverHandle::new();
        let new = ObserverHandle::new();
        registry.open_guest_session("C1", old).await.unwrap();
        registry.open_guest_session("C1", new).await.unwrap();

        assert!(!registry.disconnect_guest("C1", old).await.unwrap());
        assert!(registry.get_session("C1").await.unwrap().is_online);

        assert!(registry.disconnect_guest("C1", new).await.unwrap());
        let session = registry.get_session("C1").await.unwrap();
        assert!(!session.is_online);
        assert!(session.guest_observer.is_none());
    }

    #[tokio::test]
    async fn test_unknown_session_operations_are_noops() {
        let registry = registry();
        let (admin_calls, admin) = counting_observer();
        registry.attach_admin(ObserverHandle::new(), admin).await.unwrap();

        assert!(registry.append_guest_message("ghost", "hi").await.unwrap().is_none());
        assert!(registry.append_admin_message("ghost", "hi").await.unwrap().is_none());
        registry.set_guest_online("ghost", false).await.unwrap();
        assert!(!registry.disconnect_guest("ghost", ObserverHandle::new()).await.unwrap());
        assert!(!registry.clear_unread("ghost").await);
        assert!(registry.get_session("ghost").await.is_none());

        assert_eq!(admin_calls.load(Ordering::SeqCst), 0);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_empty_client_id_is_rejected() {
        let registry = registry();
        let err = registry.open_guest_session("  ", ObserverHandle::new()).await.unwrap_err();
        assert!(matches!(err, ChatError::InvalidClientId));
    }

    #[tokio::test]
    async fn test_list_sessions_orders_by_latest_message() {
        let registry = registry();
        registry.store().seed(record("QUIET"), &[]);
        let (_, admin) = counting_observer();
        assert_eq!(registry.attach_admin(ObserverHandle::new(), admin).await.unwrap(), 1);

        registry.open_guest_session("A", ObserverHandle::new()).await.unwrap();
        tick().await;
        registry.open_guest_session("B", ObserverHandle::new()).await.unwrap();
        tick().await;
        let order: Vec<String> = registry
            .list_sessions()
            .await
            .into_iter()
            .map(|s| s.session_id)
            .collect();
        assert_eq!(order, ["B", "A", "QUIET"]);

        registry.append_guest_message("A", "ping").await.unwrap();
        let order: Vec<String> = registry
            .list_sessions()
            .await
            .into_iter()
            .map(|s| s.session_id)
            .collect();
        assert_eq!(order, ["A", "B", "QUIET"]);
    }

    #[tokio::test]
    async fn test_first_admin_bulk_loads_sessions_offline() {
        let registry = registry();
        registry.store().seed(record("OLD1"), &[("support", "welcome"), ("Guest OLD1", "hi")]);
        registry.store().seed(record("OLD2"), &[("support", "welcome")]);

        let (_, first) = counting_observer();
        assert_eq!(registry.attach_admin(ObserverHandle::new(), first).await.unwrap(), 2);

        let old1 = registry.get_session("OLD1").await.unwrap();
        assert!(!old1.is_online);
        assert_eq!(old1.messages.len(), 2);
        assert_eq!(old1.unread_count, 0);

        let (_, second) = counting_observer();
        assert_eq!(registry.attach_admin(ObserverHandle::new(), second).await.unwrap(), 0);
        assert_eq!(registry.hub().admin_count(), 2);
    }

    #[tokio::test]
    async fn test_admins_notified_on_every_change() {
        let registry = registry();
        let admin_handle = ObserverHandle::new();
        let (admin_calls, admin) = counting_observer();
        registry.attach_admin(admin_handle, admin).await.unwrap();

        registry.open_guest_session("C1", ObserverHandle::new()).await.unwrap();
        registry.append_guest_message("C1", "hello").await.unwrap();
        registry.clear_unread("C1").await;
        registry.append_admin_message("C1", "hi").await.unwrap();
        registry.set_guest_online("C1", false).await.unwrap();
        assert_eq!(admin_calls.load(Ordering::SeqCst), 5);

        assert!(registry.detach_admin(&admin_handle));
        assert!(!registry.detach_admin(&admin_handle));
        registry.append_guest_message("C1", "anyone?").await.unwrap();
        assert_eq!(admin_calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_store_failure_keeps_message_in_memory() {
        let registry = registry();
        registry.open_guest_session("C1", ObserverHandle::new()).await.unwrap();
        let (admin_calls, admin) = counting_observer();
        registry.attach_admin(ObserverHandle::new(), admin).await.unwrap();
        registry.store().failing_message_inserts.store(1, Ordering::SeqCst);

        let err = registry.append_guest_message("C1", "lost?").await.unwrap_err();
        assert!(err.is_retryable());

        let session = registry.get_session("C1").await.unwrap();
        assert_eq!(session.messages.last().unwrap().content, "lost?");
        assert_eq!(session.unread_count, 1);
        assert_eq!(admin_calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.store().messages_for("C1").len(), 1);
    }

    #[tokio::test]
    async fn test_transient_store_failure_is_retried() {
        let registry = SessionRegistry::new(
            FakeStore::new(),
            Arc::new(NotificationHub::new()),
            ChatConfig::default(),
            StorePolicy {
                attempts: 3,
                ..test_policy()
            },
        );
        registry.open_guest_session("C1", ObserverHandle::new()).await.unwrap();
        registry.store().failing_message_inserts.store(2, Ordering::SeqCst);

        registry.append_guest_message("C1", "eventually").await.unwrap();
        assert_eq!(registry.store().messages_for("C1").len(), 2);
    }

    #[tokio::test]
    async fn test_failed_session_insert_is_retryable() {
        let registry = registry();
        registry.store().failing_session_inserts.store(1, Ordering::SeqCst);

        let err = registry.open_guest_session("C1", ObserverHandle::new()).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(registry.get_session("C1").await.is_none());

        let session = registry.open_guest_session("C1", ObserverHandle::new()).await.unwrap();
        assert_eq!(session.messages.len(), 1);
        assert_eq!(registry.store().session_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_welcome_is_written_on_next_open() {
        let registry = registry();
        let first = ObserverHandle::new();
        registry.store().failing_message_inserts.store(1, Ordering::SeqCst);

        let err = registry.open_guest_session("C1", first).await.unwrap_err();
        assert!(err.is_retryable());
        let session = registry.get_session("C1").await.unwrap();
        assert!(!session.is_online);
        assert!(session.guest_observer.is_none());
        assert!(session.messages.is_empty());
        assert!(!registry.disconnect_guest("C1", first).await.unwrap());

        let session = registry.open_guest_session("C1", ObserverHandle::new()).await.unwrap();
        assert!(session.is_online);
        assert_eq!(session.messages.len(), 1);
        assert_eq!(registry.store().messages_for("C1").len(), 1);
        assert_eq!(registry.store().session_count(), 1);
    }

    #[tokio::test]
    async fn test_restored_session_without_messages_gets_welcome() {
        let registry = registry();
        registry.store().seed(record("C3"), &[]);

        let session = registry.open_guest_session("C3", ObserverHandle::new()).await.unwrap();
        assert_eq!(session.messages.len(), 1);
        assert_eq!(session.messages[0].content, registry.config().welcome_message);
        assert_eq!(registry.store().messages_for("C3").len(), 1);
    }

    #[tokio::test]
    async fn test_reconnect_keeps_newest_guest_observer() {
        let registry = registry();
        let old = ObserverHandle::new();
        let new = ObserverHandle::new();
        let (old_calls, old_observer) = counting_observer();
        let (new_calls, new_observer) = counting_observer();

        registry.connect_guest("C1", old, old_observer).await.unwrap();
        registry.connect_guest("C1", new, new_observer).await.unwrap();
        // The superseded connection closing must not drop the new observer.
        assert!(!registry.disconnect_guest("C1", old).await.unwrap());
        assert!(registry.hub().has_guest_observer("C1"));

        registry.append_admin_message("C1", "hello again").await.unwrap();
        assert_eq!(old_calls.load(Ordering::SeqCst), 0);
        assert_eq!(new_calls.load(Ordering::SeqCst), 1);

        assert!(registry.disconnect_guest("C1", new).await.unwrap());
        assert!(!registry.hub().has_guest_observer("C1"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reconnects_leave_attached_observer_registered() {
        let registry = Arc::new(registry());
        registry.open_guest_session("C1", ObserverHandle::new()).await.unwrap();

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let handle = ObserverHandle::new();
                let (calls, observer) = counting_observer();
                registry.connect_guest("C1", handle, observer).await.unwrap();
                (handle, calls)
            }));
        }
        let mut connections = Vec::new();
        for task in tasks {
            connections.push(task.await.unwrap());
        }

        registry.append_admin_message("C1", "who is here?").await.unwrap();
        let attached = registry.get_session("C1").await.unwrap().guest_observer.unwrap();
        for (handle, calls) in &connections {
            let expected = usize::from(*handle == attached);
            assert_eq!(calls.load(Ordering::SeqCst), expected);
        }
    }

    #[tokio::test]
    async fn test_bulk_load_skips_unreadable_history() {
        let registry = registry();
        registry.store().seed(record("BAD"), &[("support", "welcome")]);
        registry.store().seed(record("GOOD"), &[("support", "welcome")]);
        *registry.store().unreadable_history.lock().unwrap() = Some("BAD".to_string());

        let (_, admin) = counting_observer();
        assert_eq!(registry.attach_admin(ObserverHandle::new(), admin).await.unwrap(), 1);
        assert!(registry.get_session("GOOD").await.is_some());
        assert!(registry.get_session("BAD").await.is_none());
    }

    #[tokio::test]
    async fn test_display_name_and_welcome_are_configurable() {
        let config = ChatConfig {
            support_sender: "客服".to_string(),
            welcome_message: "您好！".to_string(),
            display_name_prefix: "游客 ".to_string(),
            display_name_suffix_len: 4,
            ..ChatConfig::default()
        };
        let registry = SessionRegistry::new(
            FakeStore::new(),
            Arc::new(NotificationHub::new()),
            config,
            test_policy(),
        );

        let session = registry
            .open_guest_session("GUEST-1700000000-abc123", ObserverHandle::new())
            .await
            .unwrap();
        assert_eq!(session.display_name, "游客 c123");
        assert_eq!(session.messages[0].sender, "客服");
        assert_eq!(session.messages[0].content, "您好！");
    }

    #[tokio::test]
    async fn test_broadcast_reaches_attached_admins() {
        let registry = registry();
        let (tx, mut rx) = tokio::sync::mpsc::channel(4);
        registry.attach_admin(ObserverHandle::new(), Arc::new(tx)).await.unwrap();

        assert_eq!(registry.broadcast("closing at 6pm"), 1);
        assert_eq!(
            rx.recv().await,
            Some(ChatNotice::Broadcast {
                text: "closing at 6pm".to_string()
            })
        );
    }
}
