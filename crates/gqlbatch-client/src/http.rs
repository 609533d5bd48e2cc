//! HTTP transport backed by reqwest.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use gqlbatch_core::{ContentKind, Transport, TransportError, TransportResponse};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Url};
use tracing::trace;

use crate::config::EndpointSettings;
use crate::error::{BuildError, BuildResult};

/// Endpoint and headers layered over an existing transport.
///
/// The derived transport shares the connection pool and client options of
/// the one it was derived from.
#[derive(Debug, Clone, Default)]
pub struct EndpointOverride {
    /// Replaces the endpoint URL when set.
    pub url: Option<String>,
    /// Merged over the headers of the base transport.
    pub headers: BTreeMap<String, String>,
}

impl EndpointOverride {
    pub fn url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// POSTs combined payloads to a single GraphQL endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: Url,
    headers: HeaderMap,
}

impl HttpTransport {
    /// Creates a transport for `url` with only the default headers.
    pub fn new(url: &str) -> BuildResult<Self> {
        Self::from_settings(&EndpointSettings {
            url: url.to_string(),
            ..Default::default()
        })
    }

    /// Creates a transport from endpoint settings.
    ///
    /// Configured headers are merged over `Content-Type: application/json`.
    /// The timeout and user agent are applied to the underlying client.
    pub fn from_settings(settings: &EndpointSettings) -> BuildResult<Self> {
        let endpoint = parse_url(&settings.url)?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        merge_headers(&mut headers, &settings.headers)?;

        let mut builder = Client::builder();
        if let Some(timeout_ms) = settings.timeout_ms {
            builder = builder.timeout(Duration::from_millis(timeout_ms));
        }
        if let Some(user_agent) = &settings.user_agent {
            builder = builder.user_agent(user_agent.as_str());
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            endpoint,
            headers,
        })
    }

    /// Derives a transport with a different endpoint or extra headers.
    pub fn with_override(&self, overrides: &EndpointOverride) -> BuildResult<Self> {
        let endpoint = match &overrides.url {
            Some(url) => parse_url(url)?,
            None => self.endpoint.clone(),
        };
        let mut headers = self.headers.clone();
        merge_headers(&mut headers, &overrides.headers)?;

        Ok(Self {
            client: self.client.clone(),
            endpoint,
            headers,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

fn parse_url(url: &str) -> BuildResult<Url> {
    Url::parse(url).map_err(|err| BuildError::InvalidUrl {
        url: url.to_string(),
        message: err.to_string(),
    })
}

fn merge_headers(headers: &mut HeaderMap, extra: &BTreeMap<String, String>) -> BuildResult<()> {
    for (name, value) in extra {
        let invalid = |message: String| BuildError::InvalidHeader {
            name: name.clone(),
            message,
        };
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|err| invalid(err.to_string()))?;
        let header_value = HeaderValue::from_str(value).map_err(|err| invalid(err.to_string()))?;
        headers.insert(header_name, header_value);
    }
    Ok(())
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, payload: Vec<u8>) -> Result<TransportResponse, TransportError> {
        trace!(endpoint = %self.endpoint, bytes = payload.len(), "posting batch");

        let response = self
            .client
            .post(self.endpoint.clone())
            .headers(self.headers.clone())
            .body(payload)
            .send()
            .await
            .map_err(|err| TransportError::Request {
                message: err.to_string(),
            })?;

        let status = response.status().as_u16();
        let content_kind = ContentKind::from_content_type(
            response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok()),
        );
        let body = response
            .bytes()
            .await
            .map_err(|err| TransportError::Body {
                message: err.to_string(),
            })?;

        Ok(TransportResponse::new(status, content_kind, body.to_vec()))
    }
}
