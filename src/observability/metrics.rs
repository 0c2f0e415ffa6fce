//! Thread-safe metrics collection
//!
//! Atomic counters for the bridge's message and connection activity, plus a
//! bounded window of transform timings. A collector is created once at startup
//! and shared by `Arc` between the connection and the bridge loop.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Number of transform timings kept for percentile calculation
const MAX_TIMING_SAMPLES: usize = 1000;

/// Thread-safe metrics collector using atomics and a mutex-protected window
pub struct MetricsCollector {
    started_at: DateTime<Utc>,

    // Message metrics
    messages_received: AtomicU64,
    messages_published: AtomicU64,
    messages_dropped: AtomicU64,
    publish_failures: AtomicU64,

    // Connection metrics
    connected: AtomicBool,
    connections_established: AtomicU64,
    connection_failures: AtomicU64,
    reconnect_attempts: AtomicU64,

    transform_times: Mutex<Vec<u64>>, // in microseconds
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            messages_received: AtomicU64::new(0),
            messages_published: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
            connected: AtomicBool::new(false),
            connections_established: AtomicU64::new(0),
            connection_failures: AtomicU64::new(0),
            reconnect_attempts: AtomicU64::new(0),
            transform_times: Mutex::new(Vec::new()),
        }
    }

    // Message metrics
    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_published(&self) {
        self.messages_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn publish_failed(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn transform_completed(&self, duration: Duration) {
        if let Ok(mut times) = self.transform_times.lock() {
            times.push(duration.as_micros() as u64);

            if times.len() > MAX_TIMING_SAMPLES {
                times.remove(0);
            }
        }
    }

    // Connection metrics
    pub fn connection_established(&self) {
        self.connections_established.fetch_add(1, Ordering::Relaxed);
        self.connected.store(true, Ordering::Relaxed);
    }

    pub fn connection_failed(&self) {
        self.connection_failures.fetch_add(1, Ordering::Relaxed);
        self.connected.store(false, Ordering::Relaxed);
    }

    pub fn connection_lost(&self) {
        self.connected.store(false, Ordering::Relaxed);
    }

    pub fn reconnect_attempted(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Calculate transform time statistics as (avg, p50, p95, p99)
    fn calculate_transform_statistics(&self) -> (f64, f64, f64, f64) {
        let Ok(times) = self.transform_times.lock() else {
            return (0.0, 0.0, 0.0, 0.0);
        };
        if times.is_empty() {
            return (0.0, 0.0, 0.0, 0.0);
        }

        let mut sorted_times = times.clone();
        sorted_times.sort_unstable();

        let avg = sorted_times.iter().sum::<u64>() as f64 / sorted_times.len() as f64;
        (
            avg,
            percentile(&sorted_times, 50.0),
            percentile(&sorted_times, 95.0),
            percentile(&sorted_times, 99.0),
        )
    }

    /// Get complete metrics snapshot
    pub fn get_metrics(&self) -> MetricsSnapshot {
        let now = Utc::now();
        let (avg, p50, p95, p99) = self.calculate_transform_statistics();

        MetricsSnapshot {
            messages: MessageMetrics {
                received: self.messages_received.load(Ordering::Relaxed),
                published: self.messages_published.load(Ordering::Relaxed),
                dropped: self.messages_dropped.load(Ordering::Relaxed),
                publish_failures: self.publish_failures.load(Ordering::Relaxed),
                avg_transform_time_us: avg,
                transform_time_p50_us: p50,
                transform_time_p95_us: p95,
                transform_time_p99_us: p99,
            },
            connection: ConnectionMetrics {
                connected: self.connected.load(Ordering::Relaxed),
                connections_established: self.connections_established.load(Ordering::Relaxed),
                connection_failures: self.connection_failures.load(Ordering::Relaxed),
                reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
            },
            started_at: self.started_at,
            uptime_seconds: (now - self.started_at).num_seconds().max(0) as u64,
            timestamp: now,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub messages: MessageMetrics,
    pub connection: ConnectionMetrics,
    pub started_at: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct MessageMetrics {
    pub received: u64,
    pub published: u64,
    pub dropped: u64,
    pub publish_failures: u64,
    pub avg_transform_time_us: f64,
    pub transform_time_p50_us: f64,
    pub transform_time_p95_us: f64,
    pub transform_time_p99_us: f64,
}

#[derive(Debug, Serialize)]
pub struct ConnectionMetrics {
    pub connected: bool,
    pub connections_established: u64,
    pub connection_failures: u64,
    pub reconnect_attempts: u64,
}

fn percentile(sorted_data: &[u64], percentile: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }

    let len = sorted_data.len();
    let index = (percentile / 100.0) * (len - 1) as f64;

    if index.fract() == 0.0 {
        sorted_data[index as usize] as f64
    } else {
        let lower_index = index.floor() as usize;
        let upper_index = index.ceil() as usize;
        let lower_value = sorted_data[lower_index] as f64;
        let upper_value = sorted_data[upper_index] as f64;

        lower_value + (upper_value - lower_value) * index.fract()
    }
}
