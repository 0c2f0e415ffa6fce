//! tagmodifier - MQTT tag-prefixing bridge
//!
//! Subscribes to time-series topics on an MQTT broker, prefixes the `name` of
//! every item in each payload, and republishes the result to the topic the
//! message arrived on.
//!
//! # Overview
//!
//! - [`transform`] - pure payload rewrite
//! - [`transport`] - MQTT connection, subscription and reconnection
//! - [`bridge`] - receive, transform, publish loop
//! - [`config`] - environment, TOML and local-development configuration
//! - [`observability`] - structured logging and metrics
//!
//! # Quick Start
//!
//! ```rust
//! use tagmodifier::transform::transform_payload;
//!
//! let input = br#"{"body":[{"name":"temp","value":42},{"name":"pressure","value":7}]}"#;
//! let output = transform_payload(input, "site1").unwrap();
//!
//! assert_eq!(
//!     String::from_utf8(output).unwrap(),
//!     r#"{"body":[{"name":"site1.temp","value":42},{"name":"site1.pressure","value":7}]}"#
//! );
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod observability;
pub mod testing;
pub mod transform;
pub mod transport;

pub use bridge::{Bridge, StopReason};
pub use config::{BridgeConfig, ConfigError};
pub use error::{BridgeError, BridgeResult, ErrorKind};
pub use transform::{transform_payload, TransformError};
pub use transport::mqtt::MqttClient;
