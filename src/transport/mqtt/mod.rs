//! MQTT client implementation for the bridge
//!
//! This module separates pure functions from I/O operations for testability.
//!
//! # Architecture
//!
//! - [`connection`] - Pure connection state, broker address parsing and option building
//! - [`message_handler`] - Pure event routing and topic filter matching
//! - [`health_monitor`] - Pure reconnection decisions and state transitions
//! - [`client`] - Impure I/O operations: event loop, subscribe, publish
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tagmodifier::config::BridgeConfig;
//! use tagmodifier::observability::MetricsCollector;
//! use tagmodifier::transport::mqtt::MqttClient;
//! use tagmodifier::transport::MessageSource;
//!
//! # tokio_test::block_on(async {
//! let config = BridgeConfig::local();
//! let mut client = MqttClient::new(&config, Arc::new(MetricsCollector::new()))?;
//! while let Some(message) = client.next_message().await? {
//!     println!("{} bytes on {}", message.payload.len(), message.topic);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod health_monitor;
pub mod message_handler;

// Re-export public types for convenience
pub use client::{MqttClient, MqttPublisher};
pub use connection::{
    parse_broker_address, BrokerEndpoint, ConnectionState, MqttError, ReconnectConfig,
};
pub use health_monitor::{ConnectionEvent, HealthMonitor, ReconnectionDecision};
pub use message_handler::{
    effective_filter, topic_matches_filter, EventRoute, InboundMessage, MessageHandler,
    SHARED_SUBSCRIPTION_PREFIX,
};
