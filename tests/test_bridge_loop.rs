//! Bridge loop tests against in-memory transport and source
//!
//! Exercises receive → transform → publish without a broker.

use std::sync::Arc;
use std::time::Duration;
use tagmodifier::bridge::{Bridge, StopReason};
use tagmodifier::error::ErrorKind;
use tagmodifier::observability::MetricsCollector;
use tagmodifier::testing::{MockSource, MockTransport};
use tagmodifier::transport::InboundMessage;
use tokio::sync::watch;

fn message(topic: &str, payload: &str) -> InboundMessage {
    InboundMessage::new(topic, payload.as_bytes().to_vec())
}

#[tokio::test]
async fn test_messages_return_to_their_arrival_topic() {
    let transport = MockTransport::new();
    let bridge = Bridge::new(
        transport.clone(),
        "plant",
        Arc::new(MetricsCollector::new()),
    );
    let mut source = MockSource::new(vec![
        message("site/north/data", r#"{"body":[{"name":"temp"}]}"#),
        message("site/south/data", r#"{"body":[{"name":"flow"}]}"#),
    ]);
    let (_tx, rx) = watch::channel(false);

    let reason = bridge.run(&mut source, rx).await.unwrap();
    assert_eq!(reason, StopReason::SourceClosed);

    // The clone shares the recorded history
    let published = transport.get_published_messages();
    assert_eq!(
        published,
        vec![
            (
                "site/north/data".to_string(),
                br#"{"body":[{"name":"plant.temp"}]}"#.to_vec()
            ),
            (
                "site/south/data".to_string(),
                br#"{"body":[{"name":"plant.flow"}]}"#.to_vec()
            ),
        ]
    );
}

#[tokio::test]
async fn test_empty_prefix_yields_leading_separator() {
    let transport = MockTransport::new();
    let bridge = Bridge::new(transport.clone(), "", Arc::new(MetricsCollector::new()));

    bridge
        .handle_message(&message("t", r#"{"body":[{"name":"temp"}]}"#))
        .await
        .unwrap();

    assert_eq!(
        transport.get_published_messages()[0].1,
        br#"{"body":[{"name":".temp"}]}"#.to_vec()
    );
}

#[tokio::test]
async fn test_partial_documents_are_never_published() {
    let transport = MockTransport::new();
    let metrics = Arc::new(MetricsCollector::new());
    let bridge = Bridge::new(transport.clone(), "p", metrics.clone());
    let mut source = MockSource::new(vec![message(
        "t",
        r#"{"body":[{"name":"a"},{"name":5},{"name":"c"}]}"#,
    )]);
    let (_tx, rx) = watch::channel(false);

    bridge.run(&mut source, rx).await.unwrap();

    assert!(transport.get_published_messages().is_empty());
    assert_eq!(metrics.get_metrics().messages.dropped, 1);
}

#[tokio::test]
async fn test_fatal_source_error_is_connection_kind() {
    let bridge = Bridge::new(
        MockTransport::new(),
        "p",
        Arc::new(MetricsCollector::new()),
    );
    let mut source = MockSource::new(vec![]).with_failure_after_messages();
    let (_tx, rx) = watch::channel(false);

    let error = bridge.run(&mut source, rx).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Connection);
    assert!(error.is_fatal());
}

#[tokio::test]
async fn test_shutdown_already_requested_stops_immediately() {
    let bridge = Bridge::new(
        MockTransport::new(),
        "p",
        Arc::new(MetricsCollector::new()),
    );
    let mut source = MockSource::new(vec![message("t", r#"{"body":[]}"#)]);
    let (_tx, rx) = watch::channel(true);

    let reason = bridge.run(&mut source, rx).await.unwrap();
    assert_eq!(reason, StopReason::Shutdown);
    assert_eq!(source.remaining(), 1);
}

#[tokio::test]
async fn test_dropped_shutdown_sender_stops_pending_loop() {
    let bridge = Bridge::new(
        MockTransport::new(),
        "p",
        Arc::new(MetricsCollector::new()),
    );
    let mut source = MockSource::pending();
    let (tx, rx) = watch::channel(false);
    drop(tx);

    let reason = tokio::time::timeout(Duration::from_secs(1), bridge.run(&mut source, rx))
        .await
        .expect("loop should stop")
        .unwrap();
    assert_eq!(reason, StopReason::Shutdown);
}
