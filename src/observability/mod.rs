//! Observability for the bridge
//!
//! Structured logging and in-process metrics. Every connect, receive and
//! publish event is logged; counters are summarized at shutdown.

pub mod logging;
pub mod metrics;

// Re-export for convenience
pub use logging::{apply_verbosity, init_default_logging, init_logging, parse_level, LogFormat};
pub use metrics::{MetricsCollector, MetricsSnapshot};

// Span macros for structured logging
pub use logging::{message_span, mqtt_span};
