//! Mock implementations for testing
//!
//! Provides a recording [`Transport`] and a scripted [`MessageSource`].

use crate::transport::mqtt::MqttError;
use crate::transport::{InboundMessage, MessageSource, Transport};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub type PublishedMessage = (String, Vec<u8>);

/// Mock transport for testing
#[derive(Debug, Default, Clone)]
pub struct MockTransport {
    pub published_messages: Arc<Mutex<Vec<PublishedMessage>>>,
    pub should_fail: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport whose every publish fails
    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    pub fn get_published_messages(&self) -> Vec<PublishedMessage> {
        self.published_messages
            .lock()
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }

    pub fn clear_history(&self) {
        if let Ok(mut messages) = self.published_messages.lock() {
            messages.clear();
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Error = MqttError;

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), Self::Error> {
        if self.should_fail {
            return Err(MqttError::PublishFailed("Mock publish failure".into()));
        }

        if let Ok(mut messages) = self.published_messages.lock() {
            messages.push((topic.to_string(), payload));
        }
        Ok(())
    }
}

/// Mock message source replaying a fixed list of messages
#[derive(Debug, Default)]
pub struct MockSource {
    messages: VecDeque<InboundMessage>,
    fail_when_empty: bool,
    pending_when_empty: bool,
}

impl MockSource {
    /// Source that yields `messages` in order, then reports itself closed
    pub fn new(messages: Vec<InboundMessage>) -> Self {
        Self {
            messages: messages.into(),
            ..Default::default()
        }
    }

    /// Source that never yields a message
    pub fn pending() -> Self {
        Self {
            pending_when_empty: true,
            ..Default::default()
        }
    }

    /// Fail with a connection error once the scripted messages are used up
    pub fn with_failure_after_messages(mut self) -> Self {
        self.fail_when_empty = true;
        self
    }

    pub fn remaining(&self) -> usize {
        self.messages.len()
    }
}

#[async_trait]
impl MessageSource for MockSource {
    type Error = MqttError;

    async fn next_message(&mut self) -> Result<Option<InboundMessage>, Self::Error> {
        if let Some(message) = self.messages.pop_front() {
            return Ok(Some(message));
        }

        if self.fail_when_empty {
            Err(MqttError::ReconnectLimitExceeded {
                attempts: 1,
                reason: "Mock connection failure".to_string(),
            })
        } else if self.pending_when_empty {
            std::future::pending().await
        } else {
            Ok(None)
        }
    }
}
