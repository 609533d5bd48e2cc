//! Request keys and the combined batch payload.
//!
//! A [`RequestKey`] is the canonical JSON encoding of one GraphQL request.
//! Object keys are emitted in sorted order and absent fields are omitted,
//! so two requests with the same query, variables and operation name always
//! produce byte-identical keys. The key doubles as the deduplication token
//! when result caching is enabled.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single GraphQL request as sent inside a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQLRequest {
    /// The query document.
    pub query: String,
    /// Variables for the operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Value>,
    /// Operation to execute when the document defines several.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
}

impl GraphQLRequest {
    /// Creates a request for a query document without variables.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            variables: None,
            operation_name: None,
        }
    }

    pub fn with_variables(mut self, variables: Value) -> Self {
        self.variables = Some(variables);
        self
    }

    /// Sets the operation name. Empty names are treated as absent.
    pub fn with_operation_name(mut self, operation_name: impl Into<String>) -> Self {
        let operation_name = operation_name.into();
        self.operation_name = (!operation_name.is_empty()).then_some(operation_name);
        self
    }
}

/// Canonical, cheaply cloneable encoding of a [`GraphQLRequest`].
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestKey(Arc<str>);

impl RequestKey {
    /// Encodes a request into its canonical form.
    pub fn new(request: &GraphQLRequest) -> Self {
        let mut object = Map::new();
        if let Some(operation_name) = request
            .operation_name
            .as_deref()
            .filter(|name| !name.is_empty())
        {
            object.insert(
                "operationName".to_string(),
                Value::String(operation_name.to_string()),
            );
        }
        object.insert("query".to_string(), Value::String(request.query.clone()));
        if let Some(variables) = &request.variables {
            object.insert("variables".to_string(), canonicalize(variables));
        }
        Self(Value::Object(object).to_string().into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decodes the key back into the request it was built from.
    pub fn request(&self) -> Result<GraphQLRequest, serde_json::Error> {
        serde_json::from_str(&self.0)
    }
}

impl From<GraphQLRequest> for RequestKey {
    fn from(request: GraphQLRequest) -> Self {
        RequestKey::new(&request)
    }
}

impl From<&GraphQLRequest> for RequestKey {
    fn from(request: &GraphQLRequest) -> Self {
        RequestKey::new(request)
    }
}

impl fmt::Debug for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RequestKey").field(&self.as_str()).finish()
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builds the combined payload for a batch: a JSON array of the keys in
/// batch order.
pub fn combined_payload(keys: &[RequestKey]) -> Vec<u8> {
    let len = keys.iter().map(|key| key.as_str().len() + 1).sum::<usize>() + 1;
    let mut payload = Vec::with_capacity(len);
    payload.push(b'[');
    for (index, key) in keys.iter().enumerate() {
        if index > 0 {
            payload.push(b',');
        }
        payload.extend_from_slice(key.as_str().as_bytes());
    }
    payload.push(b']');
    payload
}

// Rebuilds objects with sorted keys so the encoding does not depend on
// whether serde_json preserves insertion order.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key.clone(), canonicalize(value)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
