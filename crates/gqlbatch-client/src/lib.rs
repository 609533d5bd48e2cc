//! gqlbatch-client: Batched GraphQL client over HTTP
//!
//! This crate wires the batching engine from `gqlbatch-core` to the outside
//! world:
//! - HTTP transport (reqwest)
//! - Configuration loading (YAML + environment)
//! - Structured logging setup
//! - The [`BatchedClient`] facade
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              gqlbatch-client                 │
//! ├─────────────────────────────────────────────┤
//! │  client.rs      - BatchedClient facade      │
//! │  http.rs        - reqwest transport         │
//! │  config.rs      - Configuration management  │
//! │  observability/ - Logging setup             │
//! └─────────────────────────────────────────────┘
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod observability;

// Re-exports for convenience
pub use client::BatchedClient;
pub use config::{BatchingSettings, ClientConfig, ConfigLoadError, EndpointSettings};
pub use error::{BuildError, BuildResult};
pub use gqlbatch_core::{ClientError, FailureKind, FailurePolicy, FlushMode, GraphQLRequest};
pub use http::{EndpointOverride, HttpTransport};
