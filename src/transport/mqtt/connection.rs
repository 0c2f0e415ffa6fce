//! Pure connection state management for MQTT client
//!
//! This module contains pure functions for connection state management,
//! broker address parsing, option building and subscription filters.

use crate::config::{BrokerSection, ReconnectSection};
use rumqttc::v5::mqttbytes::v5::Filter;
use rumqttc::v5::{mqttbytes::QoS, MqttOptions};
use rumqttc::Transport as RumqttcTransport;
use std::time::Duration;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

/// Default port for plain MQTT
pub const DEFAULT_MQTT_PORT: u16 = 1883;
/// Default port for MQTT over TLS
pub const DEFAULT_MQTTS_PORT: u16 = 8883;
/// Largest packet accepted from or sent to the broker
pub const MAX_PACKET_SIZE: u32 = 256 * 1024;

/// Connection state for MQTT client
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// Initial state - attempting to connect
    Connecting,
    /// Connection acknowledged by the broker
    Connected,
    /// Disconnected with reason
    Disconnected(String),
    /// Waiting to reconnect (attempt count)
    Reconnecting(u32),
    /// Permanently disconnected - max reconnection attempts exceeded
    PermanentlyDisconnected(String),
}

/// Reconnection configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Maximum number of reconnection attempts (None = unlimited)
    pub max_attempts: Option<u32>,
    /// Backoff pattern in milliseconds
    pub backoff_pattern: Vec<u64>,
    /// Delay to use after pattern is exhausted (for unlimited retries)
    pub sustained_delay: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        ReconnectSection::default().into()
    }
}

impl From<ReconnectSection> for ReconnectConfig {
    fn from(section: ReconnectSection) -> Self {
        Self {
            max_attempts: section.max_attempts,
            backoff_pattern: section.backoff_ms,
            sustained_delay: section.sustained_delay_ms,
        }
    }
}

impl ReconnectConfig {
    /// Calculate backoff delay for given attempt (1-based) using the pattern,
    /// then sustain at `sustained_delay`
    pub fn calculate_backoff_delay(&self, attempt: u32) -> u64 {
        let index = (attempt.saturating_sub(1)) as usize;
        self.backoff_pattern
            .get(index)
            .copied()
            .unwrap_or(self.sustained_delay)
    }
}

/// MQTT transport errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Connection failed")]
    ConnectionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Publishing failed")]
    PublishFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Subscription failed: {0}")]
    SubscriptionFailed(String),
    #[error("Invalid broker address: {0}")]
    InvalidBrokerUrl(String),
    #[error("Invalid reconnect configuration: {0}")]
    InvalidReconnectConfig(String),
    #[error("Gave up after {attempts} reconnection attempts: {reason}")]
    ReconnectLimitExceeded { attempts: u32, reason: String },
}

/// Where the broker lives
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

/// Parse a broker address into host, port and TLS flag.
///
/// Accepts a bare host (`10.0.0.5`), `host:port`, or a URL with scheme
/// `mqtt`, `tcp`, `mqtts` or `ssl`. Ports default to 1883, or 8883 with TLS.
pub fn parse_broker_address(address: &str) -> Result<BrokerEndpoint, MqttError> {
    let address = address.trim();
    let invalid = || MqttError::InvalidBrokerUrl(address.to_string());

    let url = if address.contains("://") {
        Url::parse(address)
    } else {
        Url::parse(&format!("mqtt://{address}"))
    }
    .map_err(|_| invalid())?;

    let tls = match url.scheme() {
        "mqtt" | "tcp" => false,
        "mqtts" | "ssl" => true,
        _ => return Err(invalid()),
    };

    let host = url
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(invalid)?;
    let port = url.port().unwrap_or(if tls {
        DEFAULT_MQTTS_PORT
    } else {
        DEFAULT_MQTT_PORT
    });

    Ok(BrokerEndpoint {
        host: host.to_string(),
        port,
        tls,
    })
}

/// Client id used when none is configured
pub fn generate_client_id() -> String {
    format!("tagmodifier-{}", Uuid::new_v4().simple())
}

/// Pure function to configure MQTT options from the broker section
pub fn configure_mqtt_options(config: &BrokerSection) -> Result<MqttOptions, MqttError> {
    let endpoint = parse_broker_address(&config.address)?;

    let client_id = config.client_id.clone().unwrap_or_else(generate_client_id);
    let mut mqtt_options = MqttOptions::new(client_id, endpoint.host, endpoint.port);

    if endpoint.tls {
        mqtt_options.set_transport(RumqttcTransport::tls_with_default_config());
    }

    if let Some(username) = config.get_username() {
        let password = config.get_password().unwrap_or_default();
        mqtt_options.set_credentials(username, password);
    }

    mqtt_options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
    mqtt_options.set_max_packet_size(Some(MAX_PACKET_SIZE));

    Ok(mqtt_options)
}

/// Build subscription filters for the configured topics.
///
/// Subscriptions are QoS 0 with the no-local option set, so the broker never
/// delivers the bridge's own republished messages back to it.
pub fn build_subscription_filters(topics: &[String]) -> Vec<Filter> {
    topics
        .iter()
        .map(|topic| {
            let mut filter = Filter::new(topic.clone(), QoS::AtMostOnce);
            filter.nolocal = true;
            filter
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_broker_section(address: &str) -> BrokerSection {
        BrokerSection {
            address: address.to_string(),
            username_env: None,
            password_env: None,
            keep_alive_secs: 60,
            client_id: None,
        }
    }

    #[test]
    fn test_reconnect_config_default() {
        let config = ReconnectConfig::default();
        assert_eq!(config.max_attempts, None); // Unlimited by default
        assert_eq!(config.backoff_pattern, vec![250, 500, 1000, 2000, 5000]);
        assert_eq!(config.sustained_delay, 5000);
    }

    #[test]
    fn test_calculate_backoff_delay() {
        let config = ReconnectConfig::default();

        assert_eq!(config.calculate_backoff_delay(1), 250);
        assert_eq!(config.calculate_backoff_delay(2), 500);
        assert_eq!(config.calculate_backoff_delay(5), 5000);

        // Sustained delay after pattern exhausted
        assert_eq!(config.calculate_backoff_delay(6), 5000);
        assert_eq!(config.calculate_backoff_delay(100), 5000);
    }

    #[test]
    fn test_empty_pattern_uses_sustained_delay() {
        let config = ReconnectConfig {
            max_attempts: None,
            backoff_pattern: vec![],
            sustained_delay: 42,
        };
        assert_eq!(config.calculate_backoff_delay(1), 42);
    }

    #[test]
    fn test_parse_bare_host() {
        let endpoint = parse_broker_address("edge-broker").unwrap();
        assert_eq!(
            endpoint,
            BrokerEndpoint {
                host: "edge-broker".to_string(),
                port: 1883,
                tls: false
            }
        );

        let endpoint = parse_broker_address("127.0.0.1").unwrap();
        assert_eq!(endpoint.host, "127.0.0.1");
        assert_eq!(endpoint.port, 1883);
    }

    #[test]
    fn test_parse_host_and_port() {
        let endpoint = parse_broker_address("10.0.0.5:1884").unwrap();
        assert_eq!(endpoint.host, "10.0.0.5");
        assert_eq!(endpoint.port, 1884);
        assert!(!endpoint.tls);
    }

    #[test]
    fn test_parse_urls() {
        let endpoint = parse_broker_address("mqtt://localhost:1883").unwrap();
        assert_eq!(endpoint.host, "localhost");
        assert_eq!(endpoint.port, 1883);

        let endpoint = parse_broker_address("tcp://broker").unwrap();
        assert_eq!(endpoint.port, 1883);
        assert!(!endpoint.tls);

        let endpoint = parse_broker_address("mqtts://secure-broker").unwrap();
        assert_eq!(endpoint.port, 8883);
        assert!(endpoint.tls);
    }

    #[test]
    fn test_parse_invalid_addresses() {
        for address in ["", "mqtt://", "http://broker", "broker:notaport", "a b"] {
            assert!(
                matches!(
                    parse_broker_address(address),
                    Err(MqttError::InvalidBrokerUrl(_))
                ),
                "Expected {address:?} to be rejected"
            );
        }
    }

    #[test]
    fn test_configure_mqtt_options() {
        let options = configure_mqtt_options(&test_broker_section("mqtt://localhost:1883"));
        assert!(options.is_ok());
        let options = options.unwrap();
        assert_eq!(options.broker_address(), ("localhost".to_string(), 1883));
        assert!(options.client_id().starts_with("tagmodifier-"));
        assert_eq!(options.keep_alive(), Duration::from_secs(60));
    }

    #[test]
    fn test_configure_mqtt_options_fixed_client_id() {
        let mut section = test_broker_section("localhost");
        section.client_id = Some("edge-bridge".to_string());

        let options = configure_mqtt_options(&section).unwrap();
        assert_eq!(options.client_id(), "edge-bridge");
    }

    #[test]
    fn test_configure_mqtt_options_invalid_address() {
        let result = configure_mqtt_options(&test_broker_section("http://nope"));
        assert!(matches!(result, Err(MqttError::InvalidBrokerUrl(_))));
    }

    #[test]
    fn test_generated_client_ids_are_unique() {
        assert_ne!(generate_client_id(), generate_client_id());
    }

    #[test]
    fn test_build_subscription_filters() {
        let topics = vec!["timeseries_data".to_string(), "site/+/data".to_string()];
        let filters = build_subscription_filters(&topics);

        assert_eq!(filters.len(), 2);
        assert_eq!(filters[0].path, "timeseries_data");
        assert_eq!(filters[1].path, "site/+/data");
        for filter in &filters {
            assert_eq!(filter.qos, QoS::AtMostOnce);
            assert!(filter.nolocal);
        }
    }

    #[test]
    fn test_connection_state_equality() {
        assert_eq!(ConnectionState::Connected, ConnectionState::Connected);
        assert_ne!(
            ConnectionState::Connected,
            ConnectionState::Disconnected("test".to_string())
        );
    }

    #[test]
    fn test_mqtt_error_display() {
        let errors = vec![
            MqttError::ConnectionFailed("test".to_string().into()),
            MqttError::PublishFailed("test".to_string().into()),
            MqttError::SubscriptionFailed("test".to_string()),
            MqttError::InvalidBrokerUrl("test".to_string()),
            MqttError::InvalidReconnectConfig("test".to_string()),
            MqttError::ReconnectLimitExceeded {
                attempts: 3,
                reason: "refused".to_string(),
            },
        ];

        for error in errors {
            assert!(!error.to_string().is_empty());
        }
    }
}
