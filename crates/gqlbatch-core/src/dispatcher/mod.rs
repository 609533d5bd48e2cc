//! Dispatcher that sends a batch upstream and demultiplexes the response.
//!
//! This is the only place where the ambiguity of the combined response is
//! resolved. A response is classified once into a [`ResponseShape`] and
//! then interpreted:
//!
//! - Opaque text fails the whole batch with `Invalid response: <text>`.
//! - A JSON document that is not an array fails the whole batch, using the
//!   document itself as the error detail.
//! - A JSON array must have one entry per request. Every entry must carry
//!   `data`, no entry may carry `errors`, and the status must be 2xx for
//!   the batch to succeed.
//!
//! # Failure policy
//!
//! Under [`FailurePolicy::EscalateBatch`] (the default) a single failing
//! entry fails every request of the batch. A non-2xx status cannot be
//! attributed to one logical request, so the whole round-trip is treated
//! as suspect and sibling results are discarded. [`FailurePolicy::PerItem`]
//! instead fails only the offending entries.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::coalescer::BatchLoader;
use crate::error::{ClientError, FailureKind, Outcome};
use crate::key::{combined_payload, RequestKey};
use crate::response::ResponseShape;
use crate::transport::{Transport, TransportResponse};

/// How a failing entry in a combined response is attributed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Escalate the first failure to every request in the batch.
    #[default]
    EscalateBatch,
    /// Fail only the requests whose entries failed.
    PerItem,
}

/// Sends batches of [`RequestKey`]s through a [`Transport`].
pub struct BatchDispatcher<T: Transport> {
    transport: Arc<T>,
    policy: FailurePolicy,
}

impl<T: Transport> BatchDispatcher<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            policy: FailurePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Sends `keys` as one combined payload and interprets the response.
    ///
    /// Returns one outcome per key in key order, or a single error that
    /// applies to every key.
    #[instrument(skip_all, fields(size = keys.len()))]
    pub async fn dispatch(&self, keys: &[RequestKey]) -> Result<Vec<Outcome>, ClientError> {
        let payload = combined_payload(keys);
        let response = self.transport.send(payload).await?;
        debug!(status = response.status, "received combined response");
        self.interpret(keys, &response)
    }

    /// Interprets a combined response for the batch `keys`.
    pub fn interpret(
        &self,
        keys: &[RequestKey],
        response: &TransportResponse,
    ) -> Result<Vec<Outcome>, ClientError> {
        let status = response.status;
        let items = match ResponseShape::classify(response) {
            ResponseShape::OpaqueText(text) => {
                return Err(ClientError::invalid_response(&text, status));
            }
            ResponseShape::SingleError(detail) => {
                return Err(ClientError::from_detail(
                    FailureKind::Shape,
                    detail,
                    Some(status),
                ));
            }
            ResponseShape::Sequence(items) => items,
        };

        if items.len() != keys.len() {
            return Err(ClientError::new(
                FailureKind::Shape,
                format!(
                    "Invalid response: expected {} results, got {}",
                    keys.len(),
                    items.len()
                ),
            )
            .with_status(status));
        }

        let status_ok = response.is_success();
        match self.policy {
            FailurePolicy::EscalateBatch => escalate_batch(keys, items, status, status_ok),
            FailurePolicy::PerItem => Ok(per_item(keys, items, status, status_ok)),
        }
    }
}

#[async_trait]
impl<T: Transport + 'static> BatchLoader for BatchDispatcher<T> {
    type Key = RequestKey;
    type Value = Value;

    async fn load(&self, keys: &[RequestKey]) -> Result<Vec<Outcome>, ClientError> {
        self.dispatch(keys).await
    }
}

fn escalate_batch(
    keys: &[RequestKey],
    items: Vec<Value>,
    status: u16,
    status_ok: bool,
) -> Result<Vec<Outcome>, ClientError> {
    if status_ok && items.iter().all(is_success_item) {
        return Ok(items.into_iter().map(|item| Ok(take_data(item))).collect());
    }

    match representative_failure(&items) {
        Some(index) => Err(item_error(
            FailureKind::PartialBatch,
            &items[index],
            &keys[index],
            status,
        )),
        None => Err(ClientError::from_detail(
            FailureKind::PartialBatch,
            json!({}),
            Some(status),
        )),
    }
}

fn per_item(keys: &[RequestKey], items: Vec<Value>, status: u16, status_ok: bool) -> Vec<Outcome> {
    items
        .into_iter()
        .zip(keys)
        .map(|(item, key)| {
            if status_ok && is_success_item(&item) {
                Ok(take_data(item))
            } else {
                Err(item_error(FailureKind::Item, &item, key, status))
            }
        })
        .collect()
}

/// Picks the entry that represents a failed batch: the first entry with
/// `errors`, else the first entry without `data`, else the first entry.
fn representative_failure(items: &[Value]) -> Option<usize> {
    items
        .iter()
        .position(has_errors)
        .or_else(|| items.iter().position(|item| !has_data(item)))
        .or_else(|| (!items.is_empty()).then_some(0))
}

fn item_error(kind: FailureKind, item: &Value, key: &RequestKey, status: u16) -> ClientError {
    let detail = match item {
        Value::String(message) => json!({ "message": message }),
        other => other.clone(),
    };
    let err = ClientError::from_detail(kind, detail, Some(status));
    match key.request() {
        Ok(request) => err.with_request(request),
        Err(_) => err,
    }
}

fn has_data(item: &Value) -> bool {
    item.get("data").is_some_and(|data| !data.is_null())
}

fn has_errors(item: &Value) -> bool {
    item.get("errors").is_some_and(|errors| !errors.is_null())
}

fn is_success_item(item: &Value) -> bool {
    has_data(item) && !has_errors(item)
}

fn take_data(mut item: Value) -> Value {
    item.get_mut("data").map(Value::take).unwrap_or(Value::Null)
}
