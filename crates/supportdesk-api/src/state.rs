//! Application state shared by the CLI and the HTTP/WebSocket transport.
//!
//! The registry is generic over its store; `AppState` defaults to the SQLite
//! store and can be pinned to the in-memory one for ephemeral runs and tests.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use supportdesk_core::chat::policy::StorePolicy;
use supportdesk_core::chat::registry::SessionRegistry;
use supportdesk_core::chat::store::ChatStore;
use supportdesk_core::notify::hub::NotificationHub;
use supportdesk_infra::memory::InMemoryChatStore;
use supportdesk_infra::sqlite::chat::SqliteChatStore;
use supportdesk_infra::sqlite::pool::DatabasePool;
use supportdesk_types::config::AppConfig;

/// Shared application state.
pub struct AppState<S: ChatStore = SqliteChatStore> {
    pub registry: Arc<SessionRegistry<S>>,
    pub config: Arc<AppConfig>,
    pub data_dir: PathBuf,
}

impl<S: ChatStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            config: self.config.clone(),
            data_dir: self.data_dir.clone(),
        }
    }
}

impl<S: ChatStore> AppState<S> {
    /// Wire a registry around `store` using the chat and retry settings from `config`.
    pub fn with_store(store: S, config: AppConfig, data_dir: PathBuf) -> Self {
        let registry = SessionRegistry::new(
            store,
            Arc::new(NotificationHub::new()),
            config.chat.clone(),
            StorePolicy::from(&config.store),
        );
        Self {
            registry: Arc::new(registry),
            config: Arc::new(config),
            data_dir,
        }
    }
}

impl AppState<SqliteChatStore> {
    /// Open (and migrate) `{data_dir}/supportdesk.db` and wire the registry.
    pub async fn init(data_dir: &Path, config: AppConfig) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(data_dir).await?;

        let db_url = format!(
            "sqlite://{}?mode=rwc",
            data_dir.join("supportdesk.db").display()
        );
        let db_pool = DatabasePool::new(&db_url).await?;

        Ok(Self::with_store(
            SqliteChatStore::new(db_pool),
            config,
            data_dir.to_path_buf(),
        ))
    }
}

impl AppState<InMemoryChatStore> {
    /// State whose sessions vanish with the process.
    pub fn ephemeral(data_dir: &Path, config: AppConfig) -> Self {
        Self::with_store(InMemoryChatStore::new(), config, data_dir.to_path_buf())
    }
}
