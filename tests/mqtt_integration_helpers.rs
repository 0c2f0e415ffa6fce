//! MQTT Integration Test Helpers
//!
//! Provides helper utilities for integration tests with an MQTT broker.
//! Assumes a broker is running at localhost:1883; tests using it are `#[ignore]`d.

use rumqttc::v5::{AsyncClient, EventLoop, MqttOptions};
use std::time::Duration;
use tagmodifier::config::{BridgeConfig, BridgeSection, BrokerSection, ReconnectSection};
use uuid::Uuid;

/// MQTT broker address
pub const MQTT_BROKER_ADDRESS: &str = "mqtt://localhost:1883";
#[allow(dead_code)]
pub const MQTT_BROKER_PORT: u16 = 1883;

/// Topic unique to one test run so parallel tests never see each other's traffic
pub fn unique_topic() -> String {
    format!("tagmodifier-test/{}", Uuid::new_v4().simple())
}

/// Bridge config pointing to the localhost broker
pub fn bridge_config(topic: &str, prefix: &str) -> BridgeConfig {
    BridgeConfig {
        broker: BrokerSection {
            address: MQTT_BROKER_ADDRESS.to_string(),
            username_env: None,
            password_env: None,
            keep_alive_secs: 30,
            client_id: None,
        },
        bridge: BridgeSection {
            topics: vec![topic.to_string()],
            prefix: prefix.to_string(),
        },
        reconnect: ReconnectSection {
            max_attempts: Some(3),
            ..Default::default()
        },
    }
}

/// Plain client used to inject input and watch output
pub fn observer_client() -> (AsyncClient, EventLoop) {
    let mut options = MqttOptions::new(
        format!("tagmodifier-observer-{}", Uuid::new_v4().simple()),
        "localhost",
        MQTT_BROKER_PORT,
    );
    options.set_keep_alive(Duration::from_secs(30));
    AsyncClient::new(options, 10)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_config_is_valid() {
        let config = bridge_config(&unique_topic(), "p");
        assert!(config.validate().is_ok());
        assert_eq!(config.broker.address, "mqtt://localhost:1883");
    }

    #[test]
    fn test_unique_topics_differ() {
        assert_ne!(unique_topic(), unique_topic());
    }
}
