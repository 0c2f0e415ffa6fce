//! Transport layer for the bridge
//!
//! Two seams separate the bridge loop from the broker: a [`MessageSource`]
//! yields inbound messages and a [`Transport`] publishes outbound ones. The
//! MQTT implementation provides both; tests substitute in-memory mocks.

pub mod mqtt;

pub use mqtt::InboundMessage;

/// Outbound side of the bridge
///
/// This trait provides an abstraction over the publishing mechanism
/// (primarily MQTT) to enable dependency injection and testing.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Publish `payload` to `topic`
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), Self::Error>;
}

/// Inbound side of the bridge
#[async_trait::async_trait]
pub trait MessageSource: Send {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Wait for the next message.
    ///
    /// `Ok(None)` means the source is closed. An error means the source cannot
    /// deliver any more messages.
    async fn next_message(&mut self) -> Result<Option<InboundMessage>, Self::Error>;
}
