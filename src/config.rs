//! Bridge configuration
//!
//! The bridge needs three values: a broker address, the topic(s) to bridge and
//! the prefix to apply. They come from one of three sources:
//!
//! - `local` mode: fixed development defaults ([`BridgeConfig::local`])
//! - a TOML file ([`BridgeConfig::load_from_file`])
//! - the `BROKER`, `TOPIC` and `PREFIX` environment variables ([`BridgeConfig::from_env`])
//!
//! Configuration is read once at startup and never changes afterwards.

use crate::transport::mqtt::{
    parse_broker_address, HealthMonitor, ReconnectConfig, SHARED_SUBSCRIPTION_PREFIX,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Environment variable holding the broker address
pub const BROKER_ENV: &str = "BROKER";
/// Environment variable holding the topic filter(s), comma separated
pub const TOPIC_ENV: &str = "TOPIC";
/// Environment variable holding the name prefix
pub const PREFIX_ENV: &str = "PREFIX";
/// Default environment variable read for the broker username
pub const USERNAME_ENV: &str = "MQTT_USERNAME";
/// Default environment variable read for the broker password
pub const PASSWORD_ENV: &str = "MQTT_PASSWORD";

pub const LOCAL_BROKER: &str = "127.0.0.1";
pub const LOCAL_TOPIC: &str = "timeseries_data";
pub const LOCAL_PREFIX: &str = "prefix";

/// Complete bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeConfig {
    pub broker: BrokerSection,
    pub bridge: BridgeSection,
    #[serde(default)]
    pub reconnect: ReconnectSection,
}

/// Broker connection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerSection {
    /// Broker host, `host:port`, or URL (`mqtt://`, `tcp://`, `mqtts://`)
    pub address: String,
    /// Environment variable containing username
    pub username_env: Option<String>,
    /// Environment variable containing password
    pub password_env: Option<String>,
    /// Keep-alive interval in seconds (default: 60)
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    /// Fixed MQTT client id; a random one is generated when absent
    pub client_id: Option<String>,
}

fn default_keep_alive() -> u64 {
    60
}

/// What to bridge and how to rewrite it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeSection {
    /// Topic filters to subscribe to; messages are republished to the topic they arrived on
    pub topics: Vec<String>,
    /// Prefix prepended to every item name, separated by a period
    pub prefix: String,
}

/// Reconnection policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconnectSection {
    /// Maximum consecutive failed attempts before giving up (absent = retry forever)
    pub max_attempts: Option<u32>,
    /// Backoff delays in milliseconds for the first attempts
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: Vec<u64>,
    /// Delay used once `backoff_ms` is exhausted
    #[serde(default = "default_sustained_delay_ms")]
    pub sustained_delay_ms: u64,
}

fn default_backoff_ms() -> Vec<u64> {
    vec![250, 500, 1000, 2000, 5000]
}

fn default_sustained_delay_ms() -> u64 {
    5000
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            max_attempts: None,
            backoff_ms: default_backoff_ms(),
            sustained_delay_ms: default_sustained_delay_ms(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl BridgeConfig {
    /// Development defaults used by `tagmodifier local`
    pub fn local() -> Self {
        Self {
            broker: BrokerSection {
                address: LOCAL_BROKER.to_string(),
                username_env: None,
                password_env: None,
                keep_alive_secs: default_keep_alive(),
                client_id: None,
            },
            bridge: BridgeSection {
                topics: vec![LOCAL_TOPIC.to_string()],
                prefix: LOCAL_PREFIX.to_string(),
            },
            reconnect: ReconnectSection::default(),
        }
    }

    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: BridgeConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    ///
    /// `BROKER`, `TOPIC` and `PREFIX` are required. Credentials are read at
    /// connect time from `MQTT_USERNAME` / `MQTT_PASSWORD` when those are set.
    pub fn from_env_with<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name).ok_or_else(|| ConfigError::EnvVarNotFound(name.to_string()))
        };

        let address = required(BROKER_ENV)?;
        let topics = parse_topic_list(&required(TOPIC_ENV)?);
        let prefix = required(PREFIX_ENV)?;

        let config = Self {
            broker: BrokerSection {
                address,
                username_env: Some(USERNAME_ENV.to_string()),
                password_env: Some(PASSWORD_ENV.to_string()),
                keep_alive_secs: default_keep_alive(),
                client_id: None,
            },
            bridge: BridgeSection { topics, prefix },
            reconnect: ReconnectSection::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check values that parse fine but cannot work.
    ///
    /// Everything the MQTT client would reject at startup is rejected here.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broker.address.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "Broker address must not be empty".to_string(),
            ));
        }
        parse_broker_address(&self.broker.address)
            .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;
        if self.broker.keep_alive_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "keep_alive_secs must be greater than 0".to_string(),
            ));
        }
        if self.bridge.topics.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "At least one topic is required".to_string(),
            ));
        }
        for topic in &self.bridge.topics {
            validate_topic_filter(topic)?;
        }
        HealthMonitor::validate_connection_config(&ReconnectConfig::from(
            self.reconnect.clone(),
        ))
        .map_err(ConfigError::InvalidConfig)?;
        Ok(())
    }
}

impl BrokerSection {
    /// Get broker username from its environment variable
    pub fn get_username(&self) -> Option<String> {
        get_env_var_optional(self.username_env.as_ref())
    }

    /// Get broker password from its environment variable
    pub fn get_password(&self) -> Option<String> {
        get_env_var_optional(self.password_env.as_ref())
    }
}

fn get_env_var_optional(env_var_name: Option<&String>) -> Option<String> {
    env_var_name.and_then(|name| std::env::var(name).ok())
}

/// Split a `TOPIC` value into individual topic filters
pub fn parse_topic_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|topic| !topic.is_empty())
        .map(str::to_string)
        .collect()
}

/// Validate an MQTT topic filter: non-empty, `#` only as the last level,
/// `+` and `#` only as whole levels. `$share/<group>/<filter>` needs a
/// wildcard-free group and a valid inner filter.
fn validate_topic_filter(filter: &str) -> Result<(), ConfigError> {
    if filter.is_empty() {
        return Err(ConfigError::InvalidConfig(
            "Topic must not be empty".to_string(),
        ));
    }

    if let Some(rest) = filter.strip_prefix(SHARED_SUBSCRIPTION_PREFIX) {
        return match rest.split_once('/') {
            Some((group, inner))
                if !group.is_empty() && !group.contains(['+', '#']) && !inner.is_empty() =>
            {
                validate_topic_filter(inner)
            }
            _ => Err(ConfigError::InvalidConfig(format!(
                "Invalid shared subscription '{filter}', expected $share/<group>/<filter>"
            ))),
        };
    }

    let levels: Vec<&str> = filter.split('/').collect();
    for (index, level) in levels.iter().enumerate() {
        let is_last = index == levels.len() - 1;
        let wildcard_misused = (level.contains('#') && (*level != "#" || !is_last))
            || (level.contains('+') && *level != "+");
        if wildcard_misused {
            return Err(ConfigError::InvalidConfig(format!(
                "Invalid topic filter '{filter}'"
            )));
        }
    }
    Ok(())
}
