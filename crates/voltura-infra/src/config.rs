//! Configuration loader for Voltura Service Hub.
//!
//! Reads `config.toml` from the data directory (`~/.voltura/` by default)
//! and deserializes it into [`AppConfig`]. Falls back to defaults when the
//! file is missing or malformed.

use std::path::{Path, PathBuf};

use voltura_types::config::AppConfig;

pub const DATA_DIR_ENV: &str = "VOLTURA_DATA_DIR";
pub const DATABASE_URL_ENV: &str = "VOLTURA_DATABASE_URL";

/// Resolve the data directory: `VOLTURA_DATA_DIR`, else `~/.voltura`.
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".voltura")
}

/// Load configuration from `{data_dir}/config.toml`.
///
/// - Missing file: [`AppConfig::default()`].
/// - Unreadable or unparsable file: logs a warning and returns the default.
pub async fn load_config(data_dir: &Path) -> AppConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
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

/// Resolve the database URL.
///
/// Priority: `VOLTURA_DATABASE_URL`, then `database_url` in `config.toml`,
/// then `sqlite://{data_dir}/voltura.db?mode=rwc`.
pub fn database_url(config: &AppConfig, data_dir: &Path) -> String {
    resolve_database_url(std::env::var(DATABASE_URL_ENV).ok(), config, data_dir)
}

fn resolve_database_url(env: Option<String>, config: &AppConfig, data_dir: &Path) -> String {
    env.filter(|url| !url.is_empty())
        .or_else(|| config.database_url.clone())
        .unwrap_or_else(|| {
            format!("sqlite://{}?mode=rwc", data_dir.join("voltura.db").display())
        })
}

/// Directory holding per-session credential files.
pub fn credentials_dir(config: &AppConfig, data_dir: &Path) -> PathBuf {
    config
        .session
        .credentials_dir
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| data_dir.join("sessions"))
}
