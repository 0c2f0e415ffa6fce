//! Bridge loop
//!
//! Takes messages from a [`MessageSource`] one at a time, rewrites their item
//! names and publishes the result back to the topic each message arrived on.
//! A message is fully handled, publish included, before the next one is taken.

use crate::error::{BridgeError, BridgeResult};
use crate::message_span;
use crate::observability::MetricsCollector;
use crate::transform::transform_payload;
use crate::transport::{InboundMessage, MessageSource, Transport};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, error, info, warn, Instrument};

/// Why [`Bridge::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Shutdown was requested
    Shutdown,
    /// The source has no more messages
    SourceClosed,
}

/// Republishes every inbound message with prefixed item names
pub struct Bridge<T: Transport> {
    transport: T,
    prefix: String,
    metrics: Arc<MetricsCollector>,
}

impl<T: Transport> Bridge<T> {
    pub fn new(transport: T, prefix: impl Into<String>, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            transport,
            prefix: prefix.into(),
            metrics,
        }
    }

    /// Get reference to the transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Transform one message and publish it to the topic it arrived on
    pub async fn handle_message(&self, message: &InboundMessage) -> BridgeResult<()> {
        let started = Instant::now();
        let payload = transform_payload(&message.payload, &self.prefix)?;
        self.metrics.transform_completed(started.elapsed());

        let bytes = payload.len();
        self.transport
            .publish(&message.topic, payload)
            .await
            .map_err(|e| BridgeError::publish(&message.topic, e))?;

        self.metrics.message_published();
        debug!(topic = %message.topic, bytes = bytes, "Queued transformed message");
        Ok(())
    }

    /// Handle one message, logging and counting a failure instead of returning it
    async fn dispatch(&self, message: InboundMessage) {
        let span = message_span!(topic = %message.topic, retain = message.retain);

        async {
            debug!(bytes = message.payload.len(), "Handling message");
            if let Err(e) = self.handle_message(&message).await {
                if matches!(e, BridgeError::Publish { .. }) {
                    self.metrics.publish_failed();
                    error!(error = %e, kind = ?e.kind(), "Dropping message");
                } else {
                    self.metrics.message_dropped();
                    warn!(error = %e, kind = ?e.kind(), "Dropping message");
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Run until shutdown is requested, the source closes, or the source fails.
    ///
    /// Per-message errors are logged and the message is skipped. A source
    /// error is returned to the caller.
    pub async fn run<S>(
        &self,
        source: &mut S,
        mut shutdown: watch::Receiver<bool>,
    ) -> BridgeResult<StopReason>
    where
        S: MessageSource,
        BridgeError: From<S::Error>,
    {
        info!(prefix = %self.prefix, "Bridge running, waiting for messages");

        loop {
            if *shutdown.borrow() {
                info!("Shutdown requested, stopping bridge");
                return Ok(StopReason::Shutdown);
            }

            let next = tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    // A dropped sender also ends the loop
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Shutdown requested, stopping bridge");
                        return Ok(StopReason::Shutdown);
                    }
                    continue;
                }
                next = source.next_message() => next,
            };

            match next {
                Ok(Some(message)) => self.dispatch(message).await,
                Ok(None) => {
                    info!("Message source closed, stopping bridge");
                    return Ok(StopReason::SourceClosed);
                }
                Err(e) => {
                    let e = BridgeError::from(e);
                    error!(error = %e, kind = ?e.kind(), "Message source failed");
                    return Err(e);
                }
            }
        }
    }
}
