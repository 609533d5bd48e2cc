//! End-to-end tests of the batched client against an in-process endpoint.

mod common;

use std::collections::BTreeMap;

use axum::http::StatusCode;
use common::{echo, json_response, text_response, MockGraphQLServer};
use gqlbatch_client::{
    BatchedClient, BatchingSettings, ClientConfig, EndpointOverride, EndpointSettings,
    FailureKind, GraphQLRequest, HttpTransport,
};
use serde::Deserialize;
use serde_json::{json, Value};

fn queries(call: &common::RecordedCall) -> Vec<String> {
    call.body
        .iter()
        .map(|request| request["query"].as_str().unwrap().to_string())
        .collect()
}

// ============================================================
// Section 1: Coalescing
// ============================================================

#[tokio::test]
async fn test_concurrent_requests_share_one_round_trip() {
    let server = MockGraphQLServer::start(echo).await;
    let client = BatchedClient::new(&server.url).unwrap();

    let (a, b, c) = tokio::join!(
        client.request_raw("{ a }", None, None),
        client.request_raw("{ b }", None, None),
        client.request_raw("{ c }", None, None),
    );

    assert_eq!(a.unwrap()["query"], "{ a }");
    assert_eq!(b.unwrap()["query"], "{ b }");
    assert_eq!(c.unwrap()["query"], "{ c }");

    let calls = server.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(queries(&calls[0]), vec!["{ a }", "{ b }", "{ c }"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_window_holds_on_multi_thread_runtime() {
    let server = MockGraphQLServer::start(echo).await;
    let client = BatchedClient::new(&server.url).unwrap();

    let pending: Vec<_> = (0..200)
        .map(|i| client.submit(&GraphQLRequest::new(format!("{{ f{i} }}"))))
        .collect();
    for (i, handle) in pending.into_iter().enumerate() {
        assert_eq!(handle.await.unwrap()["query"], format!("{{ f{i} }}"));
    }

    let calls = server.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].body.len(), 200);
}

#[tokio::test]
async fn test_variables_and_operation_name_are_forwarded() {
    let server = MockGraphQLServer::start(echo).await;
    let client = BatchedClient::new(&server.url).unwrap();

    let data = client
        .request_raw(
            "query Node($id: ID!) { node(id: $id) { id } }",
            Some(json!({ "id": "42" })),
            Some("Node"),
        )
        .await
        .unwrap();

    assert_eq!(data["variables"], json!({ "id": "42" }));
    let calls = server.calls();
    assert_eq!(calls[0].body[0]["operationName"], "Node");
}

#[tokio::test]
async fn test_max_batch_size_splits_round_trips() {
    let server = MockGraphQLServer::start(echo).await;
    let settings = BatchingSettings {
        max_batch_size: Some(2),
        ..Default::default()
    };
    let client =
        BatchedClient::with_transport(HttpTransport::new(&server.url).unwrap(), &settings);

    let (a, b, c) = tokio::join!(
        client.request_raw("{ a }", None, None),
        client.request_raw("{ b }", None, None),
        client.request_raw("{ c }", None, None),
    );
    assert!(a.is_ok() && b.is_ok() && c.is_ok());

    let calls = server.calls();
    assert_eq!(calls.len(), 2);
    let mut batches: Vec<Vec<String>> = calls.iter().map(queries).collect();
    batches.sort_by_key(|batch| std::cmp::Reverse(batch.len()));
    assert_eq!(batches[0], vec!["{ a }", "{ b }"]);
    assert_eq!(batches[1], vec!["{ c }"]);
}

// ============================================================
// Section 2: Result caching
// ============================================================

#[tokio::test]
async fn test_identical_requests_take_separate_slots_by_default() {
    let server = MockGraphQLServer::start(echo).await;
    let client = BatchedClient::new(&server.url).unwrap();

    let (first, second) = tokio::join!(
        client.request_raw("{ same }", None, None),
        client.request_raw("{ same }", None, None),
    );

    assert_eq!(first.unwrap(), second.unwrap());
    assert_eq!(server.calls()[0].body.len(), 2);
}

#[tokio::test]
async fn test_cache_results_shares_one_slot() {
    let server = MockGraphQLServer::start(echo).await;
    let settings = BatchingSettings {
        cache_results: true,
        ..Default::default()
    };
    let client =
        BatchedClient::with_transport(HttpTransport::new(&server.url).unwrap(), &settings);

    let (first, second) = tokio::join!(
        client.request_raw("{ same }", None, None),
        client.request_raw("{ same }", None, None),
    );

    assert_eq!(first.unwrap(), second.unwrap());
    let calls = server.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].body.len(), 1);
}

// ============================================================
// Section 3: Failure attribution
// ============================================================

#[tokio::test]
async fn test_html_response_fails_every_caller() {
    let server =
        MockGraphQLServer::start(|_| text_response(StatusCode::OK, "<html>foo!</html>")).await;
    let client = BatchedClient::new(&server.url).unwrap();

    let (a, b) = tokio::join!(
        client.request_raw("{ a }", None, None),
        client.request_raw("{ b }", None, None),
    );

    for result in [a, b] {
        let err = result.unwrap_err();
        assert_eq!(err.message(), "Invalid response: <html>foo!</html>");
        assert_eq!(err.kind(), FailureKind::Shape);
    }
}

#[tokio::test]
async fn test_item_errors_fail_every_caller() {
    let server = MockGraphQLServer::start(|_| {
        json_response(
            StatusCode::OK,
            json!([
                { "data": { "test": "test" } },
                { "errors": [{ "message": "it is on fire" }] },
            ]),
        )
    })
    .await;
    let client = BatchedClient::new(&server.url).unwrap();

    let (a, b) = tokio::join!(
        client.request_raw("{ a }", None, None),
        client.request_raw("{ b }", None, None),
    );

    for result in [a, b] {
        let err = result.unwrap_err();
        assert_eq!(err.message(), "it is on fire");
        assert_eq!(err.status(), Some(200));
        assert_eq!(err.request().unwrap().query, "{ b }");
    }
}

#[tokio::test]
async fn test_single_error_object_uses_first_error() {
    let server = MockGraphQLServer::start(|_| {
        json_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "message": "Something went wrong!", "errors": [{ "message": "it broke" }] }),
        )
    })
    .await;
    let client = BatchedClient::new(&server.url).unwrap();

    let err = client.request_raw("{ a }", None, None).await.unwrap_err();

    assert_eq!(err.message(), "it broke");
    assert_eq!(err.status(), Some(500));
    assert_eq!(err.errors()[0].message, "it broke");
}

#[tokio::test]
async fn test_unreachable_endpoint_is_transport_failure() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let client = BatchedClient::new(&format!("http://{addr}/graphql")).unwrap();

    let err = client.request_raw("{ a }", None, None).await.unwrap_err();

    assert_eq!(err.kind(), FailureKind::Transport);
    assert_eq!(err.status(), None);
}

// ============================================================
// Section 4: Typed results and configuration
// ============================================================

#[derive(Debug, Deserialize, PartialEq)]
struct Viewer {
    login: String,
}

#[tokio::test]
async fn test_typed_request_decodes_data() {
    let server = MockGraphQLServer::start(|_| {
        json_response(StatusCode::OK, json!([{ "data": { "login": "octocat" } }]))
    })
    .await;
    let client = BatchedClient::new(&server.url).unwrap();

    let viewer: Viewer = client.request("{ viewer { login } }", None, None).await.unwrap();
    assert_eq!(viewer, Viewer { login: "octocat".to_string() });

    let err = client
        .request::<Vec<u32>>("{ viewer { login } }", None, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::Decode);
}

#[tokio::test]
async fn test_client_from_config_sends_configured_headers() {
    let server = MockGraphQLServer::start(echo).await;
    let config = ClientConfig {
        endpoint: EndpointSettings {
            url: server.url.clone(),
            headers: BTreeMap::from([("authorization".to_string(), "Bearer abc".to_string())]),
            ..Default::default()
        },
        ..Default::default()
    };
    let client = BatchedClient::from_config(&config).unwrap();

    let data: Value = client.request("{ me }", None, None).await.unwrap();
    assert_eq!(data["query"], "{ me }");

    let calls = server.calls();
    assert_eq!(calls[0].headers["authorization"], "Bearer abc");
    assert_eq!(calls[0].headers["content-type"], "application/json");
}

#[tokio::test]
async fn test_transport_options_reach_the_wire() {
    let server = MockGraphQLServer::start(echo).await;
    let config = ClientConfig {
        endpoint: EndpointSettings {
            url: server.url.clone(),
            headers: BTreeMap::from([("x-tenant".to_string(), "acme".to_string())]),
            timeout_ms: Some(5_000),
            user_agent: Some("inventory-sync/2.0".to_string()),
        },
        ..Default::default()
    };
    let client = BatchedClient::from_config(&config).unwrap();

    client.request_raw("{ test }", None, None).await.unwrap();

    let calls = server.calls();
    assert_eq!(calls[0].headers["user-agent"], "inventory-sync/2.0");
    assert_eq!(calls[0].headers["x-tenant"], "acme");
}

#[tokio::test]
async fn test_endpoint_override_routes_to_other_endpoint() {
    let primary = MockGraphQLServer::start(echo).await;
    let secondary = MockGraphQLServer::start(echo).await;
    let config = ClientConfig {
        endpoint: EndpointSettings {
            url: primary.url.clone(),
            headers: BTreeMap::from([("x-tenant".to_string(), "acme".to_string())]),
            ..Default::default()
        },
        ..Default::default()
    };
    let client = BatchedClient::from_config(&config).unwrap();
    let reporting = client
        .with_override(&EndpointOverride::url(&secondary.url).with_header("x-source", "reports"))
        .unwrap();

    let (a, b) = tokio::join!(
        client.request_raw("{ a }", None, None),
        reporting.request_raw("{ b }", None, None),
    );
    assert_eq!(a.unwrap()["query"], "{ a }");
    assert_eq!(b.unwrap()["query"], "{ b }");

    let primary_calls = primary.calls();
    assert_eq!(primary_calls.len(), 1);
    assert_eq!(queries(&primary_calls[0]), vec!["{ a }"]);
    assert!(primary_calls[0].headers.get("x-source").is_none());

    let secondary_calls = secondary.calls();
    assert_eq!(secondary_calls.len(), 1);
    assert_eq!(queries(&secondary_calls[0]), vec!["{ b }"]);
    assert_eq!(secondary_calls[0].headers["x-tenant"], "acme");
    assert_eq!(secondary_calls[0].headers["x-source"], "reports");
}
