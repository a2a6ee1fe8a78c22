//! Configuration types for supportdesk.
//!
//! `AppConfig` represents the top-level `supportdesk.toml`: presentation
//! defaults for chat sessions, the store retry policy, and server settings.
//! Every field has a default so an empty or partial file is valid.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub chat: ChatConfig,

    #[serde(default)]
    pub store: StorePolicyConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

/// Presentation defaults applied when sessions are created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Sender name used for support-authored messages.
    #[serde(default = "default_support_sender")]
    pub support_sender: String,

    /// First message of every new session.
    #[serde(default = "default_welcome_message")]
    pub welcome_message: String,

    /// Prefix of the derived guest display name.
    #[serde(default = "default_display_name_prefix")]
    pub display_name_prefix: String,

    /// How many trailing characters of the client id go into the display name.
    #[serde(default = "default_display_name_suffix_len")]
    pub display_name_suffix_len: usize,

    /// Capacity of each connection's notice queue.
    #[serde(default = "default_observer_buffer")]
    pub observer_buffer: usize,
}

fn default_support_sender() -> String {
    "support".to_string()
}

fn default_welcome_message() -> String {
    "Hello! Welcome to support. How can we help you today?".to_string()
}

fn default_display_name_prefix() -> String {
    "Guest ".to_string()
}

fn default_display_name_suffix_len() -> usize {
    8
}

fn default_observer_buffer() -> usize {
    64
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            support_sender: default_support_sender(),
            welcome_message: default_welcome_message(),
            display_name_prefix: default_display_name_prefix(),
            display_name_suffix_len: default_display_name_suffix_len(),
            observer_buffer: default_observer_buffer(),
        }
    }
}

impl ChatConfig {
    /// Derive the guest display name from a client id.
    ///
    /// Takes the last `display_name_suffix_len` characters (not bytes), so
    /// multi-byte ids never split a code point.
    pub fn display_name_for(&self, client_id: &str) -> String {
        let total = client_id.chars().count();
        let skip = total.saturating_sub(self.display_name_suffix_len);
        let suffix: String = client_id.chars().skip(skip).collect();
        format!("{}{}", self.display_name_prefix, suffix)
    }
}

/// Bounded retry/timeout policy for store calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorePolicyConfig {
    /// Total attempts per call, including the first.
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    /// Per-attempt timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Delay before the second attempt; grows linearly with each retry.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_attempts() -> u32 {
    3
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_backoff_ms() -> u64 {
    100
}

impl Default for StorePolicyConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            timeout_ms: default_timeout_ms(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl StorePolicyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory of static UI assets to serve, if any.
    #[serde(default)]
    pub web_dir: Option<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            web_dir: None,
        }
    }
}
