use super::*;
use crate::api::auth::USER_HEADER;
use crate::db::tests::Fixture;
use crate::error::ApiError;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::response::Response;
use std::time::Duration;
use tower::ServiceExt;

mod export;

/// Router over the fixture's database and directories
fn router(fx: &Fixture) -> Router {
    create_router(fx.db.clone(), Arc::new(fx.config.clone()))
}

/// Send a request as `user` (no header when `None`)
async fn send(app: Router, method: Method, uri: &str, user: Option<&str>) -> Response {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        request = request.header(USER_HEADER, user);
    }
    app.oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_text(response: Response) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}

async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

async fn error_code(response: Response) -> String {
    let api_error: ApiError = serde_json::from_slice(&body_bytes(response).await).unwrap();
    api_error.error.code
}

#[tokio::test]
async fn test_api_server_spawns() {
    let fx = Fixture::new().await;

    let mut config = fx.config.clone();
    config.api.bind_address = "127.0.0.1:0".parse().unwrap(); // Port 0 = OS assigns a free port
    let config = Arc::new(config);

    let api_handle = tokio::spawn({
        let db = fx.db.clone();
        async move { start_api_server(db, config).await }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!api_handle.is_finished());
    api_handle.abort();
}

#[tokio::test]
async fn test_api_server_rejects_invalid_config() {
    let fx = Fixture::new().await;

    let mut config = fx.config.clone();
    config.export.max_db_query_size = 0;

    let err = start_api_server(fx.db.clone(), Arc::new(config))
        .await
        .unwrap_err();
    assert!(matches!(err, crate::Error::Config { .. }));
}

#[tokio::test]
async fn test_health_endpoint() {
    let fx = Fixture::new().await;

    let response = send(router(&fx), Method::GET, "/health", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_missing_user_header_is_forbidden() {
    let fx = Fixture::new().await;
    let uri = format!("/results/data?studyId={}", fx.study_id);

    let response = send(router(&fx), Method::GET, &uri, None).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(error_code(response).await, "forbidden");
}

#[tokio::test]
async fn test_selector_without_key_is_bad_request() {
    let fx = Fixture::new().await;

    let response = send(
        router(&fx),
        Method::GET,
        "/results/metadata",
        Some(&fx.member.username),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(response).await, "bad_request");
}

#[tokio::test]
async fn test_malformed_id_list_is_bad_request() {
    let fx = Fixture::new().await;

    let response = send(
        router(&fx),
        Method::GET,
        "/results/data?studyResultIds=1,x",
        Some(&fx.member.username),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
