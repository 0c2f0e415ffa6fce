//! Pure message routing logic for MQTT events
//!
//! This module contains pure functions for classifying MQTT events,
//! matching topics against the subscribed filters and checking SubAcks.

use rumqttc::v5::mqttbytes::v5::{ConnectReturnCode, Packet, SubscribeReasonCode};
use rumqttc::v5::Event;
use rumqttc::Outgoing;
use tracing::debug;

/// A message delivered by the broker on one of the subscribed filters
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Concrete topic the message arrived on
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            retain: false,
        }
    }
}

/// Pure message routing decisions based on MQTT events
pub struct MessageHandler;

impl MessageHandler {
    /// Route MQTT event to appropriate handler (pure routing decision)
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(connack) => EventRoute::ConnectionAcknowledged {
                    code: connack.code,
                    session_present: connack.session_present,
                },
                Packet::Publish(publish) => EventRoute::MessageReceived(InboundMessage {
                    topic: String::from_utf8_lossy(&publish.topic).to_string(),
                    payload: publish.payload.to_vec(),
                    retain: publish.retain,
                }),
                Packet::Disconnect(_) => EventRoute::Disconnected,
                Packet::SubAck(suback) => EventRoute::SubscriptionConfirmed {
                    packet_id: suback.pkid,
                    accepted: suback
                        .return_codes
                        .iter()
                        .map(|code| matches!(code, SubscribeReasonCode::Success(_)))
                        .collect(),
                },
                other => EventRoute::InfrastructureEvent(format!("{other:?}")),
            },
            Event::Outgoing(Outgoing::Publish(packet_id)) => EventRoute::PublishSent {
                packet_id: *packet_id,
            },
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }

    /// Determine if a message on `topic` belongs to one of the subscribed filters (pure function)
    ///
    /// Retained messages are processed like any other.
    pub fn should_process_message(topic: &str, filters: &[String]) -> bool {
        if filters
            .iter()
            .any(|filter| topic_matches_filter(topic, filter))
        {
            true
        } else {
            debug!("Topic {} matches none of {:?}", topic, filters);
            false
        }
    }

    /// Validate subscription success from SubAck (pure function)
    pub fn validate_subscription_success(accepted: &[bool]) -> Result<(), String> {
        let rejected: Vec<usize> = accepted
            .iter()
            .enumerate()
            .filter(|(_, ok)| !**ok)
            .map(|(index, _)| index)
            .collect();

        if rejected.is_empty() {
            Ok(())
        } else {
            Err(format!(
                "Broker rejected subscription filter(s) at position {rejected:?}"
            ))
        }
    }
}

/// Prefix of an MQTT v5 shared subscription, `$share/<group>/<filter>`
pub const SHARED_SUBSCRIPTION_PREFIX: &str = "$share/";

/// The filter messages are matched against. For a shared subscription this is
/// the part after `$share/<group>/`, since the broker delivers on real topics.
pub fn effective_filter(filter: &str) -> &str {
    filter
        .strip_prefix(SHARED_SUBSCRIPTION_PREFIX)
        .and_then(|rest| rest.split_once('/'))
        .map_or(filter, |(_, inner)| inner)
}

/// MQTT topic filter matching with `+` and `#` wildcards.
///
/// Topics starting with `$` never match a filter whose first level is a wildcard.
/// Shared subscription filters match on their inner filter.
pub fn topic_matches_filter(topic: &str, filter: &str) -> bool {
    let filter = effective_filter(filter);
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }

    let mut topic_levels = topic.split('/');
    let mut filter_levels = filter.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Routing decisions for MQTT events
#[derive(Debug, Clone)]
pub enum EventRoute {
    /// Connection acknowledged by the broker
    ConnectionAcknowledged {
        code: ConnectReturnCode,
        session_present: bool,
    },
    /// Message received on a subscribed topic
    MessageReceived(InboundMessage),
    /// MQTT broker disconnected
    Disconnected,
    /// Subscription confirmed; one entry per requested filter
    SubscriptionConfirmed { packet_id: u16, accepted: Vec<bool> },
    /// Infrastructure event (PingResp, etc.)
    InfrastructureEvent(String),
    /// A queued publish was written to the network
    PublishSent { packet_id: u16 },
    /// Outgoing event (handled automatically)
    OutgoingEvent,
}
