use std::path::PathBuf;

use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderValue, StatusCode};
use axum_test::TestServer;
use sea_orm::DatabaseConnection;
use serde_json::json;

use studymate::config::CloudinaryConfig;
use studymate::infra::mirror::MongoMirrorStore;
use studymate::infra::storage::CloudinaryClient;
use studymate::router::build_router;
use studymate::state::AppState;
use studymate_core::middleware::REQUEST_ID_HEADER;
use studymate_testing::auth::{MockAuth, TEST_JWT_SECRET};

/// Router over stores that are never reached: every request here is settled by
/// authentication, authorization or validation first.
async fn server() -> TestServer {
    let db = DatabaseConnection::Disconnected;
    // The driver connects lazily, so no server is needed.
    let mirror = MongoMirrorStore::connect("mongodb://localhost:27017", "studymate_test")
        .await
        .unwrap();
    let storage = CloudinaryClient::new(CloudinaryConfig {
        cloud_name: "test".to_owned(),
        api_key: "key".to_owned(),
        api_secret: "secret".to_owned(),
    })
    .unwrap();
    let state = AppState::new(
        db,
        mirror,
        storage,
        TEST_JWT_SECRET,
        PathBuf::from("/tmp/studymate-media"),
    );
    TestServer::new(build_router(state)).unwrap()
}

#[tokio::test]
async fn should_answer_liveness_check() {
    let server = server().await;

    let response = server.get("/healthz").await;

    assert_eq!(response.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn should_attach_request_id_to_responses() {
    let server = server().await;

    let response = server.get("/healthz").await;

    assert!(response.headers().contains_key(REQUEST_ID_HEADER));
}

#[tokio::test]
async fn should_require_token_for_profile_and_catalogue() {
    let server = server().await;

    let me = server.get("/api/users/me").await;
    let departments = server.get("/api/student/departments").await;

    assert_eq!(me.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(departments.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn should_reject_malformed_bearer_token() {
    let server = server().await;

    let response = server
        .get("/api/users/me")
        .add_header(AUTHORIZATION, HeaderValue::from_static("Bearer not-a-jwt"))
        .await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn should_forbid_students_on_admin_routes() {
    let server = server().await;
    let student = MockAuth::student();

    let create = server
        .post("/api/admin/departments")
        .add_header(AUTHORIZATION, student.bearer())
        .json(&json!({ "name": "Physics", "code": "PHY" }))
        .await;
    let list = server
        .get("/api/admin/students")
        .add_header(AUTHORIZATION, student.bearer())
        .await;
    let reconcile = server
        .post("/api/admin/sync/reconcile")
        .add_header(AUTHORIZATION, student.bearer())
        .await;
    let delete = server
        .delete(&format!("/api/admin/students/{}", uuid::Uuid::now_v7()))
        .add_header(AUTHORIZATION, student.bearer())
        .await;

    assert_eq!(create.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(list.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(reconcile.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(delete.status_code(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn should_reject_short_password_on_register() {
    let server = server().await;

    let response = server
        .post("/api/auth/register")
        .json(&json!({
            "username": "ada",
            "email": "ada@example.com",
            "password": "12345",
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["kind"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn should_reject_refresh_with_garbage_token() {
    let server = server().await;

    let response = server
        .post("/api/token/refresh")
        .json(&json!({ "refresh": "garbage" }))
        .await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}
