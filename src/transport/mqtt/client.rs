//! Impure I/O operations for MQTT client
//!
//! This module drives the rumqttc event loop: it subscribes on every ConnAck,
//! hands matching publishes to the caller and paces reconnection attempts.

use super::connection::{
    build_subscription_filters, configure_mqtt_options, ConnectionState, MqttError,
    ReconnectConfig,
};
use super::health_monitor::{ConnectionEvent, HealthMonitor, ReconnectionDecision};
use super::message_handler::{EventRoute, InboundMessage, MessageHandler};
use crate::config::BridgeConfig;
use crate::mqtt_span;
use crate::observability::MetricsCollector;
use crate::transport::{MessageSource, Transport};
use async_trait::async_trait;
use rumqttc::v5::mqttbytes::v5::Filter;
use rumqttc::v5::{mqttbytes::QoS, AsyncClient, EventLoop};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Capacity of the request queue between the client handles and the event loop
const REQUEST_CHANNEL_CAPACITY: usize = 100;
/// How long `disconnect` keeps driving the event loop so DISCONNECT reaches the broker
const DISCONNECT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// MQTT connection that yields inbound messages and keeps itself connected
pub struct MqttClient {
    client: AsyncClient,
    event_loop: EventLoop,
    topics: Vec<String>,
    filters: Vec<Filter>,
    reconnect_config: ReconnectConfig,
    state: ConnectionState,
    reconnect_attempts: u32,
    closed: bool,
    metrics: Arc<MetricsCollector>,
}

impl MqttClient {
    /// Build the client from configuration. No network I/O happens until the
    /// first call to [`MessageSource::next_message`].
    pub fn new(config: &BridgeConfig, metrics: Arc<MetricsCollector>) -> Result<Self, MqttError> {
        let mqtt_options = configure_mqtt_options(&config.broker)?;
        let reconnect_config = ReconnectConfig::from(config.reconnect.clone());
        HealthMonitor::validate_connection_config(&reconnect_config)
            .map_err(MqttError::InvalidReconnectConfig)?;

        let (client, event_loop) = AsyncClient::new(mqtt_options, REQUEST_CHANNEL_CAPACITY);

        Ok(Self {
            client,
            event_loop,
            topics: config.bridge.topics.clone(),
            filters: build_subscription_filters(&config.bridge.topics),
            reconnect_config,
            state: ConnectionState::Connecting,
            reconnect_attempts: 0,
            closed: false,
            metrics,
        })
    }

    /// Handle used to publish on this connection
    pub fn publisher(&self) -> MqttPublisher {
        MqttPublisher {
            client: self.client.clone(),
        }
    }

    /// Get current connection state
    pub fn connection_state(&self) -> &ConnectionState {
        &self.state
    }

    /// Disconnect from the broker.
    ///
    /// Queues a DISCONNECT and drives the event loop briefly so it is flushed.
    /// After this call `next_message` returns `Ok(None)`.
    pub async fn disconnect(&mut self) -> Result<(), MqttError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if HealthMonitor::can_publish(&self.state) {
            self.client
                .try_disconnect()
                .map_err(|e| MqttError::ConnectionFailed(Box::new(e)))?;

            let event_loop = &mut self.event_loop;
            let drained = tokio::time::timeout(DISCONNECT_DRAIN_TIMEOUT, async {
                // poll returns an error once the connection is closed
                while event_loop.poll().await.is_ok() {}
            })
            .await;
            if drained.is_err() {
                warn!("Timed out flushing DISCONNECT to broker");
            }
        }

        self.transition(ConnectionState::Disconnected(
            "Client disconnected".to_string(),
        ));
        self.metrics.connection_lost();
        info!("MQTT client disconnected");
        Ok(())
    }

    fn transition(&mut self, next: ConnectionState) {
        if next != self.state {
            HealthMonitor::log_state_transition(&self.state, &next);
            self.state = next;
        }
    }

    /// Request subscriptions for every configured filter
    fn subscribe_to_topics(&self) -> Result<(), MqttError> {
        let _span = mqtt_span!(operation = "subscribe").entered();
        self.client
            .try_subscribe_many(self.filters.clone())
            .map_err(|e| {
                MqttError::SubscriptionFailed(format!(
                    "Failed to subscribe to {:?}: {e}",
                    self.topics
                ))
            })?;
        info!(topics = ?self.topics, "Subscribing to topics");
        Ok(())
    }

    /// Process one routed event. Returns a message when one should be handed
    /// to the caller.
    fn process_event_route(
        &mut self,
        route: EventRoute,
    ) -> Result<Option<InboundMessage>, MqttError> {
        match route {
            EventRoute::ConnectionAcknowledged {
                code,
                session_present,
            } => {
                info!(
                    session_present = session_present,
                    "Connected with result code {:?}", code
                );
                self.transition(HealthMonitor::determine_next_state(
                    ConnectionEvent::ConnAckReceived,
                ));
                self.reconnect_attempts = 0;
                self.metrics.connection_established();
                self.subscribe_to_topics()?;
                Ok(None)
            }
            EventRoute::SubscriptionConfirmed {
                packet_id,
                accepted,
            } => {
                MessageHandler::validate_subscription_success(&accepted)
                    .map_err(MqttError::SubscriptionFailed)?;
                info!(packet_id = packet_id, topics = ?self.topics, "Subscription confirmed");
                Ok(None)
            }
            EventRoute::MessageReceived(message) => {
                if MessageHandler::should_process_message(&message.topic, &self.topics) {
                    info!(
                        topic = %message.topic,
                        bytes = message.payload.len(),
                        retain = message.retain,
                        "Received MQTT message"
                    );
                    Ok(Some(message))
                } else {
                    Ok(None)
                }
            }
            EventRoute::Disconnected => {
                self.transition(HealthMonitor::determine_next_state(
                    ConnectionEvent::DisconnectedByBroker,
                ));
                self.metrics.connection_lost();
                Ok(None)
            }
            EventRoute::InfrastructureEvent(event) => {
                debug!(target: "mqtt_transport", "MQTT event: {}", event);
                Ok(None)
            }
            EventRoute::PublishSent { packet_id } => {
                info!(packet_id = packet_id, "Published message to broker");
                Ok(None)
            }
            EventRoute::OutgoingEvent => Ok(None),
        }
    }

    /// Decide whether to retry after a connection error, sleeping for the backoff delay
    async fn handle_event_loop_error(
        &mut self,
        error: rumqttc::v5::ConnectionError,
    ) -> Result<(), MqttError> {
        let reason = error.to_string();
        error!(error = %reason, "MQTT event loop error");
        self.metrics.connection_failed();
        self.transition(HealthMonitor::determine_next_state(
            ConnectionEvent::NetworkError(reason.clone()),
        ));

        match HealthMonitor::should_attempt_reconnection(
            self.reconnect_attempts,
            &self.reconnect_config,
        ) {
            ReconnectionDecision::Proceed { attempt, delay_ms } => {
                self.reconnect_attempts = attempt;
                self.metrics.reconnect_attempted();
                let max_display = self
                    .reconnect_config
                    .max_attempts
                    .map_or("∞".to_string(), |max| max.to_string());
                info!(
                    "Attempting reconnection {}/{} after {}ms delay",
                    attempt, max_display, delay_ms
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                self.transition(HealthMonitor::determine_next_state(
                    ConnectionEvent::ReconnectionStarted(attempt),
                ));
                Ok(())
            }
            ReconnectionDecision::AbortMaxAttemptsExceeded => {
                let attempts = self.reconnect_attempts;
                self.transition(HealthMonitor::determine_next_state(
                    ConnectionEvent::PermanentFailure(format!(
                        "Max reconnection attempts ({attempts}) exceeded"
                    )),
                ));
                Err(MqttError::ReconnectLimitExceeded { attempts, reason })
            }
        }
    }
}

#[async_trait]
impl MessageSource for MqttClient {
    type Error = MqttError;

    async fn next_message(&mut self) -> Result<Option<InboundMessage>, Self::Error> {
        loop {
            if self.closed {
                return Ok(None);
            }

            match self.event_loop.poll().await {
                Ok(event) => {
                    let route = MessageHandler::route_mqtt_event(&event);
                    if let Some(message) = self.process_event_route(route)? {
                        self.metrics.message_received();
                        return Ok(Some(message));
                    }
                }
                Err(e) => self.handle_event_loop_error(e).await?,
            }
        }
    }
}

/// Publishing handle sharing the connection of an [`MqttClient`]
#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
}

#[async_trait]
impl Transport for MqttPublisher {
    type Error = MqttError;

    /// Queue a QoS 0, non-retained publish. Never waits on the event loop, so
    /// it is safe to call from the task that drives it.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), Self::Error> {
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload)
            .map_err(|e| MqttError::PublishFailed(Box::new(e)))
    }
}
