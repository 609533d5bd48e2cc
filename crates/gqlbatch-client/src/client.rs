//! Batched GraphQL client.

use std::sync::Arc;

use gqlbatch_core::{
    BatchDispatcher, ClientError, ClientResult, Coalescer, CoalescerConfig, FailureKind,
    FailurePolicy, GraphQLRequest, PendingResult, RequestKey, Transport,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::{BatchingSettings, ClientConfig};
use crate::error::BuildResult;
use crate::http::{EndpointOverride, HttpTransport};

/// GraphQL client that coalesces concurrent requests into batches.
///
/// Requests issued before control returns to the scheduler are sent as one
/// JSON array to the endpoint, and each caller receives the entry at its
/// own index.
///
/// # Example
///
/// ```ignore
/// use gqlbatch_client::BatchedClient;
///
/// let client = BatchedClient::new("https://api.example.com/graphql")?;
/// let (a, b) = tokio::join!(
///     client.request::<serde_json::Value>("{ a }", None, None),
///     client.request::<serde_json::Value>("{ b }", None, None),
/// );
/// ```
pub struct BatchedClient<T: Transport + 'static = HttpTransport> {
    coalescer: Coalescer<BatchDispatcher<T>>,
}

impl<T: Transport + 'static> Clone for BatchedClient<T> {
    fn clone(&self) -> Self {
        Self {
            coalescer: self.coalescer.clone(),
        }
    }
}

impl BatchedClient<HttpTransport> {
    /// Creates a client for `url` with default batching settings.
    pub fn new(url: &str) -> BuildResult<Self> {
        let transport = HttpTransport::new(url)?;
        Ok(Self::with_transport(transport, &BatchingSettings::default()))
    }

    /// Creates a client from a validated configuration.
    pub fn from_config(config: &ClientConfig) -> BuildResult<Self> {
        config.validate()?;
        let transport = HttpTransport::from_settings(&config.endpoint)?;
        Ok(Self::with_transport(transport, &config.batching))
    }

    /// Derives a client that sends to an overridden endpoint or with extra
    /// headers, keeping the batching settings of this one.
    ///
    /// The derived client batches on its own: requests sent through it never
    /// share a round-trip with requests sent through `self`.
    pub fn with_override(&self, overrides: &EndpointOverride) -> BuildResult<Self> {
        let transport = self.transport().with_override(overrides)?;
        Ok(Self::from_parts(
            transport,
            self.coalescer.loader().policy(),
            self.coalescer.config().clone(),
        ))
    }
}

impl<T: Transport + 'static> BatchedClient<T> {
    /// Creates a client over any transport.
    pub fn with_transport(transport: T, settings: &BatchingSettings) -> Self {
        Self::from_parts(
            transport,
            settings.failure_policy,
            settings.coalescer_config(),
        )
    }

    fn from_parts(transport: T, policy: FailurePolicy, config: CoalescerConfig) -> Self {
        let dispatcher = BatchDispatcher::new(Arc::new(transport)).with_policy(policy);
        Self {
            coalescer: Coalescer::new(dispatcher, config),
        }
    }

    /// Sends a query and decodes its `data` into `R`.
    ///
    /// Fails with a [`ClientError`] when the batch holding this request
    /// resolves to a failure for it, or when `data` does not decode.
    pub async fn request<R: DeserializeOwned>(
        &self,
        query: &str,
        variables: Option<Value>,
        operation_name: Option<&str>,
    ) -> ClientResult<R> {
        let data = self.request_raw(query, variables, operation_name).await?;
        serde_json::from_value(data).map_err(|err| {
            ClientError::new(
                FailureKind::Decode,
                format!("failed to decode response data: {err}"),
            )
        })
    }

    /// Sends a query and returns its `data` as raw JSON.
    pub async fn request_raw(
        &self,
        query: &str,
        variables: Option<Value>,
        operation_name: Option<&str>,
    ) -> ClientResult<Value> {
        let mut request = GraphQLRequest::new(query);
        if let Some(variables) = variables {
            request = request.with_variables(variables);
        }
        if let Some(operation_name) = operation_name {
            request = request.with_operation_name(operation_name);
        }
        self.submit(&request).await
    }

    /// Queues a request without waiting for it.
    pub fn submit(&self, request: &GraphQLRequest) -> PendingResult<Value> {
        self.coalescer.submit(RequestKey::new(request))
    }

    /// Dispatches the open batch now.
    pub fn flush(&self) {
        self.coalescer.flush();
    }

    /// Forgets the cached result of `request`.
    pub fn clear_cache(&self, request: &GraphQLRequest) -> bool {
        self.coalescer.clear(&RequestKey::new(request))
    }

    pub fn clear_all_cache(&self) {
        self.coalescer.clear_all();
    }

    pub fn transport(&self) -> &Arc<T> {
        self.coalescer.loader().transport()
    }
}
