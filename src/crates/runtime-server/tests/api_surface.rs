//! Router-level tests: authentication, assistant CRUD laws (version
//! monotonicity, search/count agreement, do_nothing idempotence), and
//! thread history boundaries.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;
use serde_json::{json, Value};
use tower::ServiceExt;

use runtime_server::api::routes::{create_router, AppState};
use runtime_server::config::{IdentityConfig, RuntimeConfig};
use runtime_server::db::DatabaseConnection;
use runtime_server::registry::GraphRegistry;

const TEST_SECRET: &str = "test-secret-with-at-least-32-chars!!";

async fn dev_app() -> axum::Router {
    let state = AppState::for_tests(Arc::new(GraphRegistry::with_builtin_graphs())).await;
    create_router(state)
}

async fn authed_app() -> axum::Router {
    let db = DatabaseConnection::for_tests().await;
    let mut config = RuntimeConfig::for_tests();
    config.identity = Some(IdentityConfig {
        jwt_secret: TEST_SECRET.to_string(),
        issuer: None,
    });
    let state = AppState::new(
        db,
        Arc::new(config),
        Arc::new(GraphRegistry::with_builtin_graphs()),
    );
    create_router(state)
}

#[derive(Serialize)]
struct Claims {
    sub: String,
    exp: usize,
}

fn token_for(sub: &str) -> String {
    let claims = Claims {
        sub: sub.to_string(),
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn authed_json_request(method: &str, uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {}", token))
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

#[tokio::test]
async fn public_paths_skip_auth() {
    let app = authed_app().await;
    for path in ["/", "/health", "/ok", "/info", "/openapi.json", "/metrics", "/metrics/json"] {
        let response = app
            .clone()
            .oneshot(Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{path}");
    }
}

#[tokio::test]
async fn missing_authorization_header_is_401() {
    let app = authed_app().await;
    let response = app
        .oneshot(json_request("POST", "/assistants/search", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["detail"], "Authorization header missing");
}

#[tokio::test]
async fn malformed_and_invalid_tokens_are_401() {
    let app = authed_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::post("/assistants/search")
                .header("content-type", "application/json")
                .header("authorization", "Basic abc")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(
            Request::post("/assistants/search")
                .header("content-type", "application/json")
                .header("authorization", "Bearer not.a.token")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn owners_are_isolated_by_token_subject() {
    let app = authed_app().await;
    let alice = token_for("alice");
    let bob = token_for("bob");

    let response = app
        .clone()
        .oneshot(authed_json_request(
            "POST",
            "/assistants",
            &alice,
            json!({"graph_id": "agent", "name": "alice's"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let created = body_json(response).await;
    let assistant_id = created["assistant_id"].as_str().unwrap().to_string();

    // Bob cannot see Alice's assistant.
    let response = app
        .clone()
        .oneshot(authed_json_request(
            "GET",
            &format!("/assistants/{}", assistant_id),
            &bob,
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(authed_json_request(
            "GET",
            &format!("/assistants/{}", assistant_id),
            &alice,
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn assistant_version_and_count_laws() {
    let app = dev_app().await;

    // Create with a fixed id.
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/assistants",
            json!({"assistant_id": "a-1", "graph_id": "agent", "name": "one"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["version"], 1);

    // Same id with if_exists raise conflicts.
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/assistants",
            json!({"assistant_id": "a-1", "graph_id": "agent"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // do_nothing returns the same assistant without a version bump.
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/assistants",
            json!({"assistant_id": "a-1", "graph_id": "agent", "if_exists": "do_nothing"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["assistant_id"], "a-1");
    assert_eq!(body["version"], 1);

    // PATCH bumps the version by exactly one.
    let response = app
        .clone()
        .oneshot(json_request(
            "PATCH",
            "/assistants/a-1",
            json!({"name": "renamed"}),
        ))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["version"], 2);

    // A second assistant, then search/count agree.
    app.clone()
        .oneshot(json_request(
            "POST",
            "/assistants",
            json!({"assistant_id": "a-2", "graph_id": "agent", "metadata": {"team": "x"}}),
        ))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(json_request("POST", "/assistants/search", json!({})))
        .await
        .unwrap();
    let found = body_json(response).await.as_array().unwrap().len();

    let response = app
        .clone()
        .oneshot(json_request("POST", "/assistants/count", json!({})))
        .await
        .unwrap();
    let count = body_json(response).await.as_u64().unwrap() as usize;
    assert_eq!(count, found);

    // Filtered search/count agree too.
    let filter = json!({"metadata": {"team": "x"}});
    let response = app
        .clone()
        .oneshot(json_request("POST", "/assistants/search", filter.clone()))
        .await
        .unwrap();
    let found = body_json(response).await.as_array().unwrap().len();
    assert_eq!(found, 1);

    let response = app
        .clone()
        .oneshot(json_request("POST", "/assistants/count", filter))
        .await
        .unwrap();
    assert_eq!(body_json(response).await.as_u64().unwrap() as usize, found);

    // DELETE responds with the empty object.
    let response = app
        .oneshot(json_request("DELETE", "/assistants/a-2", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({}));
}

#[tokio::test]
async fn thread_lifecycle_and_history_boundaries() {
    let app = dev_app().await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/threads",
            json!({"thread_id": "t-1", "metadata": {"topic": "demo"}}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let thread = body_json(response).await;
    assert_eq!(thread["status"], "idle");

    // Fresh thread state: null values, empty next.
    let response = app
        .clone()
        .oneshot(
            Request::get("/threads/t-1/state")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let state = body_json(response).await;
    assert_eq!(state["next"], json!([]));

    // limit=0 is a validation error.
    let response = app
        .clone()
        .oneshot(
            Request::get("/threads/t-1/history?limit=0")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert!(body["fields"].is_array());

    // Oversized limits are clamped, not rejected.
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/threads/t-1/history",
            json!({"limit": 10000}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!([]));

    // Unknown thread is a 404 with the detail shape.
    let response = app
        .oneshot(
            Request::get("/threads/ghost/state")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["detail"], "Thread ghost not found");
}

#[tokio::test]
async fn cron_validation_and_crud() {
    let app = dev_app().await;
    app.clone()
        .oneshot(json_request(
            "POST",
            "/assistants",
            json!({"assistant_id": "a-1", "graph_id": "agent"}),
        ))
        .await
        .unwrap();

    // Invalid schedule is a 422.
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/runs/crons",
            json!({"assistant_id": "a-1", "schedule": "banana"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    // Valid cron round trip.
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/runs/crons",
            json!({"assistant_id": "a-1", "schedule": "0 0 3 * * *", "payload": {"messages": []}}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cron = body_json(response).await;
    let cron_id = cron["cron_id"].as_str().unwrap().to_string();
    assert!(cron["next_run_date"].is_string());

    let response = app
        .clone()
        .oneshot(json_request("POST", "/runs/crons/count", json!({})))
        .await
        .unwrap();
    assert_eq!(body_json(response).await, json!(1));

    let response = app
        .clone()
        .oneshot(json_request(
            "DELETE",
            &format!("/runs/crons/{}", cron_id),
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({}));

    let response = app
        .oneshot(json_request("POST", "/runs/crons/count", json!({})))
        .await
        .unwrap();
    assert_eq!(body_json(response).await, json!(0));
}
