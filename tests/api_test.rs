//! HTTP surface tests that need no database: the pipeline stores are
//! in memory and the Postgres pool is lazy and never touched.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use photo_storage::app_state::AppState;
use photo_storage::db::{InMemoryStore, NotificationStore};
use photo_storage::models::notification::Notification;
use photo_storage::pipeline::{Pipeline, PipelineConfig};
use photo_storage::routes;
use photo_storage::services::{
    auth::AuthService, inference::InferenceClient, queue::InMemoryQueue, uploads::UploadStore,
};
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

const SECRET: &str = "test-secret";

struct TestApp {
    router: Router,
    store: Arc<InMemoryStore>,
    auth: AuthService,
}

fn test_app() -> TestApp {
    let pool = PgPoolOptions::new()
        .connect_lazy("postgres://localhost/unused")
        .unwrap();
    let queue = Arc::new(InMemoryQueue::new());
    let store = Arc::new(InMemoryStore::new());
    let pipeline = Pipeline::new(
        queue.clone(),
        store.clone(),
        store.clone(),
        PipelineConfig::default(),
    );

    let state = AppState::new(
        pool,
        store.clone(),
        queue,
        pipeline.producer.clone(),
        InferenceClient::new("http://127.0.0.1:9").unwrap(),
        AuthService::new(SECRET),
        UploadStore::new(std::env::temp_dir().join("photo-storage-api-test")),
    );

    TestApp {
        router: routes::api_router(state),
        store,
        auth: AuthService::new(SECRET),
    }
}

fn bearer(app: &TestApp, user: Uuid) -> String {
    format!("Bearer {}", app.auth.issue_token(user).unwrap())
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_notifications_require_token() {
    let app = test_app();
    let response = app
        .router
        .oneshot(
            Request::get("/api/notifications")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "missing token");
}

#[tokio::test]
async fn test_garbage_token_rejected() {
    let app = test_app();
    let response = app
        .router
        .oneshot(
            Request::get("/api/notifications")
                .header(header::AUTHORIZATION, "Bearer not-a-jwt")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "invalid token");
}

#[tokio::test]
async fn test_list_notifications_returns_only_own() {
    let app = test_app();
    let owner = Uuid::new_v4();
    let other = Uuid::new_v4();
    let mine = Notification::pending(owner, Uuid::new_v4(), 4);
    app.store.create_notification(&mine).await.unwrap();
    app.store
        .create_notification(&Notification::pending(other, Uuid::new_v4(), 1))
        .await
        .unwrap();

    let response = app
        .router
        .clone()
        .oneshot(
            Request::get("/api/notifications")
                .header(header::AUTHORIZATION, bearer(&app, owner))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let list = body.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["id"], mine.id.to_string());
    assert_eq!(list[0]["status"], "pending");
    assert_eq!(list[0]["total"], 4);
}

#[tokio::test]
async fn test_mark_read_scoped_to_owner() {
    let app = test_app();
    let owner = Uuid::new_v4();
    let intruder = Uuid::new_v4();
    let record = Notification::pending(owner, Uuid::new_v4(), 1);
    app.store.create_notification(&record).await.unwrap();

    let request = |user: Uuid| {
        Request::post("/api/notifications")
            .header(header::AUTHORIZATION, bearer(&app, user))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({ "ids": [record.id] }).to_string()))
            .unwrap()
    };

    let response = app.router.clone().oneshot(request(intruder)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["updated"], 0);
    assert!(!app.store.notification(owner, record.batch_id).unwrap().read);

    let response = app.router.clone().oneshot(request(owner)).await.unwrap();
    assert_eq!(body_json(response).await["updated"], 1);
    assert!(app.store.notification(owner, record.batch_id).unwrap().read);
}

#[tokio::test]
async fn test_search_requires_query() {
    let app = test_app();
    let user = Uuid::new_v4();

    for uri in ["/api/search", "/api/search?q=", "/api/search?q=%20%20"] {
        let response = app
            .router
            .clone()
            .oneshot(
                Request::get(uri)
                    .header(header::AUTHORIZATION, bearer(&app, user))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(
            body_json(response).await["error"],
            "query param `q` is required"
        );
    }
}

#[tokio::test]
async fn test_register_rejects_invalid_input() {
    let app = test_app();
    let response = app
        .router
        .oneshot(
            Request::post("/api/register")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "name": "Ann", "email": "not-an-email", "password": "123" })
                        .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
