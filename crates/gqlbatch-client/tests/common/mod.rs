//! Shared helpers for client integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use serde_json::{json, Value};

type Responder = Arc<dyn Fn(&[Value]) -> Response + Send + Sync>;

/// One batch received by the mock server.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub body: Vec<Value>,
    pub headers: HeaderMap,
}

#[derive(Clone)]
struct MockState {
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    responder: Responder,
}

/// In-process GraphQL endpoint that records batches and answers them with
/// a programmable responder.
pub struct MockGraphQLServer {
    pub url: String,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl MockGraphQLServer {
    pub async fn start<F>(responder: F) -> Self
    where
        F: Fn(&[Value]) -> Response + Send + Sync + 'static,
    {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let state = MockState {
            calls: calls.clone(),
            responder: Arc::new(responder),
        };
        let router = Router::new()
            .route("/graphql", post(handle_batch))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            url: format!("http://{addr}/graphql"),
            calls,
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

async fn handle_batch(State(state): State<MockState>, headers: HeaderMap, body: Bytes) -> Response {
    let requests: Vec<Value> = serde_json::from_slice(&body).unwrap_or_default();
    state.calls.lock().unwrap().push(RecordedCall {
        body: requests.clone(),
        headers,
    });
    (state.responder)(&requests)
}

pub fn json_response(status: StatusCode, body: Value) -> Response {
    (status, [(CONTENT_TYPE, "application/json")], body.to_string()).into_response()
}

pub fn text_response(status: StatusCode, body: &str) -> Response {
    (status, [(CONTENT_TYPE, "text/html")], body.to_string()).into_response()
}

/// Answers every request with its own query and variables as data.
pub fn echo(requests: &[Value]) -> Response {
    let results: Vec<Value> = requests
        .iter()
        .map(|request| {
            json!({
                "data": {
                    "query": request["query"],
                    "variables": request["variables"],
                }
            })
        })
        .collect();
    json_response(StatusCode::OK, Value::Array(results))
}
