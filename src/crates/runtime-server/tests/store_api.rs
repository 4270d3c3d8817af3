//! HTTP-level store tests: the namespace round trip across both wire forms
//! and the search/list surface.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use runtime_server::api::routes::{create_router, AppState};
use runtime_server::registry::GraphRegistry;

async fn test_app() -> axum::Router {
    let state = AppState::for_tests(Arc::new(GraphRegistry::with_builtin_graphs())).await;
    create_router(state)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

#[tokio::test]
async fn namespace_round_trip_list_put_string_get() {
    let app = test_app().await;

    // PUT with the list form
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/store/items",
            json!({"namespace": ["preferences"], "key": "lang", "value": {"v": "de"}}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({}));

    // GET with the string form
    let response = app
        .clone()
        .oneshot(empty_request(
            "GET",
            "/store/items?namespace=preferences&key=lang",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let item = body_json(response).await;
    assert_eq!(item["value"], json!({"v": "de"}));
    assert_eq!(item["namespace"], json!(["preferences"]));

    // DELETE with the string form
    let response = app
        .clone()
        .oneshot(empty_request(
            "DELETE",
            "/store/items?namespace=preferences&key=lang",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Second GET misses
    let response = app
        .clone()
        .oneshot(empty_request(
            "GET",
            "/store/items?namespace=preferences&key=lang",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert!(body["detail"].is_string());

    // DELETE after delete is also a 404 (idempotent eventual state)
    let response = app
        .oneshot(empty_request(
            "DELETE",
            "/store/items?namespace=preferences&key=lang",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn put_twice_overwrites() {
    let app = test_app().await;
    for value in [json!(1), json!(2)] {
        let response = app
            .clone()
            .oneshot(json_request(
                "PUT",
                "/store/items",
                json!({"namespace": "counter", "key": "k", "value": value}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .oneshot(empty_request("GET", "/store/items?namespace=counter&key=k"))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["value"], json!(2));
}

#[tokio::test]
async fn search_uses_namespace_field_as_prefix() {
    let app = test_app().await;
    for (ns, key) in [
        (json!(["docs", "guides"]), "g1"),
        (json!(["docs", "api"]), "a1"),
        (json!(["other"]), "o1"),
    ] {
        app.clone()
            .oneshot(json_request(
                "PUT",
                "/store/items",
                json!({"namespace": ns, "key": key, "value": {"x": 1}}),
            ))
            .await
            .unwrap();
    }

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/store/items/search",
            json!({"namespace": ["docs"]}),
        ))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["items"].as_array().unwrap().len(), 2);

    // The empty namespace is a prefix of everything.
    let response = app
        .clone()
        .oneshot(json_request("POST", "/store/items/search", json!({"namespace": ""})))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["items"].as_array().unwrap().len(), 3);

    let response = app
        .oneshot(empty_request("GET", "/store/namespaces"))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["namespaces"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn invalid_namespace_is_a_validation_error() {
    let app = test_app().await;
    let response = app
        .oneshot(json_request(
            "PUT",
            "/store/items",
            json!({"namespace": 42, "key": "k", "value": 1}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}
