//! Error types for the bridge
//!
//! Every failure is classified into an [`ErrorKind`] that decides how the
//! process reacts: configuration and connection failures stop it, while
//! per-message failures are logged and the message is skipped.

use crate::config::ConfigError;
use crate::transform::TransformError;
use crate::transport::mqtt::MqttError;
use thiserror::Error;

/// Main error type for bridge operations
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Connection error: {0}")]
    Connection(#[from] MqttError),

    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    #[error("Publish to {topic} failed: {source}")]
    Publish {
        topic: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// How a failure is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Required startup value missing or invalid
    Configuration,
    /// Broker unreachable or connection lost beyond the retry policy
    Connection,
    /// Payload decoded but `body`/`name` structure is wrong
    Schema,
    /// Payload is not UTF-8 or not JSON
    Encoding,
    /// Transformed payload could not be queued for publishing
    Publish,
}

impl ErrorKind {
    /// Whether the process should stop
    pub fn is_fatal(self) -> bool {
        matches!(self, ErrorKind::Configuration | ErrorKind::Connection)
    }
}

impl BridgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::Config(_) => ErrorKind::Configuration,
            BridgeError::Connection(MqttError::InvalidBrokerUrl(_))
            | BridgeError::Connection(MqttError::InvalidReconnectConfig(_)) => {
                ErrorKind::Configuration
            }
            BridgeError::Connection(_) => ErrorKind::Connection,
            BridgeError::Transform(e) if e.is_encoding_error() => ErrorKind::Encoding,
            BridgeError::Transform(_) => ErrorKind::Schema,
            BridgeError::Publish { .. } => ErrorKind::Publish,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind().is_fatal()
    }

    /// Create a publish error for `topic`
    pub fn publish<E>(topic: &str, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Publish {
            topic: topic.to_string(),
            source: Box::new(source),
        }
    }
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;
