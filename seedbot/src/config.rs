use std::collections::HashMap;
use std::env::var;
use std::path::Path;
use std::time::Duration;

use dotenvy::dotenv;
use serde::Deserialize;
use thiserror::Error;

use crate::presence::StatusTemplate;

/// Process configuration with environment variable overrides
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP status server port
    /// Env: PORT (default: 3000)
    pub port: u16,

    /// Registry database file path
    /// Env: DATABASE_PATH (default: "seedbot.db")
    pub database_path: String,

    /// Discord API Token
    /// Env: DISCORD_TOKEN (required at startup)
    pub discord_token: Option<String>,

    /// Monitor settings file (servers, thresholds, channels)
    /// Env: MONITOR_CONFIG (default: "config.json")
    pub monitor_config: String,

    /// HTTP request timeout in seconds
    /// Env: REQUEST_TIMEOUT_SECS (default: 30)
    pub request_timeout: Duration,

    /// Undelivered notifications held before producers block
    /// Env: QUEUE_CAPACITY (default: 10)
    pub queue_capacity: usize,

    /// Minimum spacing between two notification deliveries
    /// Env: SEND_INTERVAL_MS (default: 1000)
    pub send_interval: Duration,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let _ = dotenv();
        Self {
            port: env_or_default("PORT", 3000),
            database_path: env_or_default_string("DATABASE_PATH", "seedbot.db"),
            discord_token: var("DISCORD_TOKEN").ok().filter(|t| !t.is_empty()),
            monitor_config: env_or_default_string("MONITOR_CONFIG", "config.json"),
            request_timeout: Duration::from_secs(env_or_default("REQUEST_TIMEOUT_SECS", 30)),
            queue_capacity: env_or_default("QUEUE_CAPACITY", 10),
            send_interval: Duration::from_millis(env_or_default("SEND_INTERVAL_MS", 1000)),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            database_path: "seedbot.db".to_string(),
            discord_token: None,
            monitor_config: "config.json".to_string(),
            request_timeout: Duration::from_secs(30),
            queue_capacity: 10,
            send_interval: Duration::from_secs(1),
        }
    }
}

/// Parse environment variable or return default value
fn env_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    var(key)
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(default)
}

/// Parse environment variable string or return default value
fn env_or_default_string(key: &str, default: &str) -> String {
    var(key).unwrap_or_else(|_| default.to_string())
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("error parsing monitor config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid monitor config: {0}")]
    Invalid(String),
}

/// Monitor settings, loaded from a JSON file. Durations are in seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Default notification channel
    pub channel_id: u64,
    pub query_interval: u64,
    /// Consecutive failed cycles tolerated before a server is reported down
    #[serde(default = "default_failure_limit")]
    pub failure_limit: u32,
    #[serde(default = "default_query_timeout")]
    pub query_timeout: u64,
    pub seeding: SeedingConfig,
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedingConfig {
    pub seeding: usize,
    pub almost_full: usize,
    /// Seconds before a downward occupancy change is committed
    pub cooldown: u64,
    /// Role to mention per state key: `seeding`, `almost_full`, `full`
    #[serde(default)]
    pub ping_roles: HashMap<String, u64>,
    #[serde(default)]
    pub notify_empty: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub name: String,
    /// `host:port` of the query endpoint
    pub address: String,
    pub player_slots: usize,
    #[serde(default)]
    pub spec_slots: usize,
    /// Identity feed URL; the roster loop is disabled without it
    #[serde(default)]
    pub id_url: Option<String>,
    #[serde(default)]
    pub query_id_interval: Option<u64>,
    #[serde(default = "default_announce_delay")]
    pub announce_delay: u64,
    #[serde(default = "default_regular_timeout")]
    pub regular_timeout: u64,
    #[serde(default)]
    pub regular_channel_id: Option<u64>,
    #[serde(default)]
    pub down_notify_ids: Vec<u64>,
    #[serde(default)]
    pub up_notify_ids: Vec<u64>,
    /// Presence line for this server, e.g. `{{.ServerName}}: {{.Players}}/{{.TotalSlots}}`
    #[serde(default)]
    pub status_template: Option<String>,
}

fn default_failure_limit() -> u32 {
    3
}

fn default_query_timeout() -> u64 {
    3
}

fn default_announce_delay() -> u64 {
    300
}

fn default_regular_timeout() -> u64 {
    3600
}

impl MonitorConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.query_interval < 1 {
            return Err(ConfigError::Invalid(format!(
                "invalid query interval: {}",
                self.query_interval
            )));
        }
        if self.channel_id == 0 {
            return Err(ConfigError::Invalid("specify channel_id".to_string()));
        }
        if self.seeding.seeding > self.seeding.almost_full {
            return Err(ConfigError::Invalid(format!(
                "seeding threshold {} is above almost_full {}",
                self.seeding.seeding, self.seeding.almost_full
            )));
        }
        for server in &self.servers {
            if server.name.is_empty() || server.address.is_empty() {
                return Err(ConfigError::Invalid(
                    "every server needs a name and an address".to_string(),
                ));
            }
        }
        self.status_templates()?;
        Ok(())
    }

    /// Parsed presence templates, keyed by server name. Servers without one
    /// are left out.
    pub fn status_templates(&self) -> Result<HashMap<String, StatusTemplate>, ConfigError> {
        self.servers
            .iter()
            .filter_map(|server| {
                let raw = server.status_template.as_deref().filter(|t| !t.is_empty())?;
                Some(
                    StatusTemplate::parse(raw)
                        .map(|template| (server.name.clone(), template))
                        .map_err(|e| {
                            ConfigError::Invalid(format!(
                                "status template of {}: {}",
                                server.name, e
                            ))
                        }),
                )
            })
            .collect()
    }

    pub fn query_interval(&self) -> Duration {
        Duration::from_secs(self.query_interval)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout.max(1))
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.seeding.cooldown)
    }
}

impl ServerConfig {
    /// Roster poll interval, falling back to the status poll interval.
    pub fn query_id_interval(&self, fallback: Duration) -> Duration {
        match self.query_id_interval {
            Some(secs) if secs >= 1 => Duration::from_secs(secs),
            _ => fallback,
        }
    }

    pub fn announce_delay(&self) -> Duration {
        Duration::from_secs(self.announce_delay.max(1))
    }

    pub fn regular_timeout(&self) -> Duration {
        Duration::from_secs(self.regular_timeout.max(1))
    }
}
