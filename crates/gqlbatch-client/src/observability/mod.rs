//! Observability for the batched client.
//!
//! The engine emits `tracing` spans and events plus `metrics` counters;
//! this module only installs a subscriber for them.

mod logging;

pub use logging::{init_logging, json_subscriber, LoggingConfig};
