//! Configuration loader for supportdesk.
//!
//! Reads `supportdesk.toml` from the data directory (`~/.supportdesk/` in
//! production) and deserializes it into [`AppConfig`]. Falls back to defaults
//! when the file is missing or malformed.

use std::path::{Path, PathBuf};

use supportdesk_types::config::AppConfig;

/// File name looked up inside the data directory.
pub const CONFIG_FILE: &str = "supportdesk.toml";

/// Data directory from `SUPPORTDESK_DATA_DIR`, falling back to `~/.supportdesk`.
pub fn default_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("SUPPORTDESK_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".supportdesk");
    }

    PathBuf::from(".supportdesk")
}

/// Load configuration from `{data_dir}/supportdesk.toml`.
///
/// - Missing file: [`AppConfig::default()`].
/// - Unreadable or unparsable file: logs a warning and returns the default.
pub async fn load_config(data_dir: &Path) -> AppConfig {
    let config_path = data_dir.join(CONFIG_FILE);

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No {CONFIG_FILE} found at {}, using defaults", config_path.display());
            return AppConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return AppConfig::default();
        }
    };

    match toml::from_str::<AppConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            AppConfig::default()
        }
    }
}
