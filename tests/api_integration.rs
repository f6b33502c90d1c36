//! End-to-end tests of the HTTP surface over in-memory shards.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use shardpool::config::Settings;
use shardpool::pool::PoolOptions;
use shardpool::server::{create_app, AppState};
use shardpool::shard::{ShardId, ShardSet};
use shardpool::testing::MemoryFactory;
use shardpool::users::ShardedUserStore;

struct TestApp {
    router: Router,
    store: Arc<ShardedUserStore<MemoryFactory>>,
    first: MemoryFactory,
    second: MemoryFactory,
}

async fn test_app_with(options: impl Fn(ShardId) -> PoolOptions) -> TestApp {
    let first = MemoryFactory::new();
    let second = MemoryFactory::new();
    let shards = ShardSet::connect(first.clone(), second.clone(), options)
        .await
        .unwrap();
    let store = Arc::new(ShardedUserStore::new(shards));
    store.bootstrap().await.unwrap();

    let settings = Settings::from_toml("").unwrap();
    let router = create_app(AppState::new(settings, store.clone()));

    TestApp {
        router,
        store,
        first,
        second,
    }
}

async fn test_app() -> TestApp {
    test_app_with(|shard| PoolOptions::new(2).name(format!("shard-{shard}"))).await
}

async fn send(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn signup(username: &str, password: &str) -> Value {
    json!({
        "username": username,
        "email": format!("{username}@example.com"),
        "password": password,
    })
}

#[tokio::test]
async fn test_create_user_routes_to_shard() {
    let app = test_app().await;

    let (status, body) = send(&app.router, Method::POST, "/users", Some(signup("alice", "pw"))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["shard"], "first");
    assert_eq!(body["username"], "alice");

    let (status, body) = send(&app.router, Method::POST, "/users", Some(signup("Trent", "pw"))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["shard"], "second");

    assert!(app.first.backend().contains("alice"));
    assert!(app.second.backend().contains("Trent"));
    assert!(!app.first.backend().contains("Trent"));
}

#[tokio::test]
async fn test_duplicate_user_conflicts() {
    let app = test_app().await;
    send(&app.router, Method::POST, "/users", Some(signup("bob", "pw"))).await;

    let (status, body) = send(&app.router, Method::POST, "/users", Some(signup("bob", "pw"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");
}

#[tokio::test]
async fn test_login_accepts_right_password_only() {
    let app = test_app().await;
    send(&app.router, Method::POST, "/users", Some(signup("nina", "secret"))).await;

    let (status, body) = send(
        &app.router,
        Method::POST,
        "/auth",
        Some(json!({"username": "nina", "password": "secret"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["shard"], "second");

    let (status, body) = send(
        &app.router,
        Method::POST,
        "/auth",
        Some(json!({"username": "nina", "password": "guess"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["message"], "invalid username or password");

    let (status, _) = send(
        &app.router,
        Method::POST,
        "/auth",
        Some(json!({"username": "nobody", "password": "secret"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_malformed_requests_are_bad_requests() {
    let app = test_app().await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/users")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app.router,
        Method::POST,
        "/users",
        Some(json!({"username": "carol"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, _) = send(&app.router, Method::POST, "/users", Some(signup("", "pw"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_exhausted_shard_pool_is_unavailable() {
    let app = test_app_with(|shard| {
        PoolOptions::new(1)
            .name(format!("shard-{shard}"))
            .acquire_timeout(Duration::from_millis(20))
    })
    .await;

    let _held = app.store.shards().shard(ShardId::First).acquire().await.unwrap();

    let (status, body) = send(
        &app.router,
        Method::POST,
        "/auth",
        Some(json!({"username": "alice", "password": "pw"})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "SERVICE_UNAVAILABLE");

    // The other shard is unaffected
    let (status, _) = send(
        &app.router,
        Method::POST,
        "/auth",
        Some(json!({"username": "zed", "password": "pw"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_health_and_stats_report_both_shards() {
    let app = test_app().await;

    let (status, body) = send(&app.router, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["shards"].as_array().unwrap().len(), 2);
    assert_eq!(body["shards"][0]["shard"], "first");
    assert_eq!(body["shards"][0]["capacity"], 2);

    let (status, body) = send(&app.router, Method::GET, "/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["shards"][1]["shard"], "second");
    assert_eq!(body["shards"][1]["name"], "shard-second");
    assert_eq!(body["shards"][1]["idle"], 2);
}

#[tokio::test]
async fn test_health_degrades_after_pools_close() {
    let app = test_app().await;
    shardpool::shutdown::close_store(app.store.as_ref(), Duration::from_secs(1)).await;

    let (_, body) = send(&app.router, Method::GET, "/health", None).await;
    assert_eq!(body["status"], "degraded");
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_pool_gauges() {
    let app = test_app().await;
    send(&app.router, Method::POST, "/users", Some(signup("dave", "pw"))).await;

    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("shardpool_pool_connections_idle"));
    assert!(text.contains("shardpool_user_requests_total"));
}
