//! gqlbatch-core: Request coalescing engine for batched GraphQL transports
//!
//! This crate contains the transport-independent batching logic:
//! - Request keys and the combined batch payload
//! - The coalescer that groups concurrent submissions into batches
//! - The dispatcher that sends one batch upstream and interprets the
//!   combined response
//! - The error model shared by every caller of a batch
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               gqlbatch-core                  │
//! ├─────────────────────────────────────────────┤
//! │  key.rs        - Request keys & payloads    │
//! │  coalescer/    - Batch windows & settlement │
//! │  dispatcher/   - Upstream call & demux      │
//! │  response.rs   - Response shape classifier  │
//! │  transport.rs  - Transport seam             │
//! │  error.rs      - ClientError                │
//! └─────────────────────────────────────────────┘
//! ```

pub mod coalescer;
pub mod dispatcher;
pub mod error;
pub mod key;
pub mod response;
pub mod transport;

// Re-export commonly used types at the crate root
pub use coalescer::{BatchLoader, Coalescer, CoalescerConfig, FlushMode, PendingResult};
pub use dispatcher::{BatchDispatcher, FailurePolicy};
pub use error::{ClientError, ClientResult, FailureKind, GraphQLError, Outcome};
pub use key::{GraphQLRequest, RequestKey};
pub use response::ResponseShape;
pub use transport::{ContentKind, Transport, TransportError, TransportResponse};
