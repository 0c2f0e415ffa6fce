//! Testing utilities and mock implementations
//!
//! This module provides in-memory implementations of the transport seams so
//! the bridge can be exercised without an MQTT broker.

pub mod mocks;

pub use mocks::*;
