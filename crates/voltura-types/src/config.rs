//! Application configuration types for Voltura Service Hub.
//!
//! `AppConfig` represents `{data_dir}/config.toml`. Every field has a default,
//! so an empty or partial file is valid.

use serde::{Deserialize, Serialize};

use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Session used when a task payload carries no session id.
    #[serde(default = "default_session_id")]
    pub default_session_id: String,

    /// Overrides the `sqlite://{data_dir}/voltura.db` default.
    #[serde(default)]
    pub database_url: Option<String>,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub bridge: BridgeConfig,

    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_session_id() -> String {
    "primary".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_session_id: default_session_id(),
            database_url: None,
            server: ServerConfig::default(),
            session: SessionConfig::default(),
            bridge: BridgeConfig::default(),
            dispatcher: DispatcherConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    4000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Session registry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Window in which a connection attempt must pair or open.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Directory holding per-session credential files. Defaults to `{data_dir}/sessions`.
    #[serde(default)]
    pub credentials_dir: Option<String>,
}

fn default_connect_timeout_secs() -> u64 {
    30
}

impl SessionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            credentials_dir: None,
        }
    }
}

/// Chat-transport bridge (protocol sidecar) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_bridge_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_bridge_url() -> String {
    "http://127.0.0.1:3100".to_string()
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            base_url: default_bridge_url(),
            api_key: None,
        }
    }
}

/// Workflow dispatcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// How often an idle queue worker polls for newly eligible tasks.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Claim lease; a running task whose lease expires is re-queued.
    #[serde(default = "default_lease_secs")]
    pub lease_secs: u64,

    #[serde(default)]
    pub queues: QueuesConfig,
}

fn default_poll_interval_ms() -> u64 {
    500
}

const MIN_LEASE_SECS: u64 = 1;

fn default_lease_secs() -> u64 {
    300
}

impl DispatcherConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Claim lease, never shorter than one second.
    pub fn lease(&self) -> Duration {
        Duration::from_secs(self.lease_secs.max(MIN_LEASE_SECS))
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            lease_secs: default_lease_secs(),
            queues: QueuesConfig::default(),
        }
    }
}

/// Per-queue policies for the three business queues.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuesConfig {
    #[serde(default = "default_concierge_policy")]
    pub concierge: QueuePolicy,
    #[serde(default = "default_quotation_policy")]
    pub quotation: QueuePolicy,
    #[serde(default = "default_notification_policy")]
    pub notifications: QueuePolicy,
}

fn default_concierge_policy() -> QueuePolicy {
    QueuePolicy {
        concurrency: 5,
        ..QueuePolicy::default()
    }
}

fn default_quotation_policy() -> QueuePolicy {
    QueuePolicy::default()
}

fn default_notification_policy() -> QueuePolicy {
    QueuePolicy {
        concurrency: 10,
        ..QueuePolicy::default()
    }
}

impl Default for QueuesConfig {
    fn default() -> Self {
        Self {
            concierge: default_concierge_policy(),
            quotation: default_quotation_policy(),
            notifications: default_notification_policy(),
        }
    }
}

/// Concurrency and retry policy of one named queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuePolicy {
    /// Maximum tasks of this queue executing at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Total attempts (first try included) before a task fails permanently.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub backoff: Backoff,
}

fn default_concurrency() -> usize {
    1
}

fn default_max_attempts() -> u32 {
    3
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_attempts: default_max_attempts(),
            backoff: Backoff::default(),
        }
    }
}

/// Delay before a failed task becomes eligible again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    Fixed { delay_ms: u64 },
    Exponential { base_ms: u64, max_ms: u64 },
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Exponential {
            base_ms: 1_000,
            max_ms: 60_000,
        }
    }
}

impl Backoff {
    /// Delay after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            Backoff::Fixed { delay_ms } => Duration::from_millis(*delay_ms),
            Backoff::Exponential { base_ms, max_ms } => {
                let exp = attempt.saturating_sub(1).min(32);
                let delay = base_ms.saturating_mul(1u64 << exp);
                Duration::from_millis(delay.min(*max_ms))
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
    /// Export spans through OpenTelemetry (stdout exporter).
    #[serde(default)]
    pub otel: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            otel: false,
        }
    }
}
