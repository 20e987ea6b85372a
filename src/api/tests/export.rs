use super::*;
use crate::api::AppState;
use crate::api::routes::stream_export;
use crate::streamer::{ExportReport, KEEP_ALIVE_FILLER, ResultSink};
use axum::http::header;
use std::io::{Cursor, Read};
use zip::ZipArchive;

#[tokio::test]
async fn test_data_endpoint_streams_text() {
    let fx = Fixture::new().await;
    let uri = format!("/results/data?studyId={}", fx.study_id);

    let response = send(router(&fx), Method::GET, &uri, Some(&fx.member.username)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/plain; charset=utf-8"
    );
    assert_eq!(body_text(response).await, "r1c1\nr1c2\nr2c1");
}

#[tokio::test]
async fn test_metadata_endpoint_nests_component_results() {
    let fx = Fixture::new().await;
    let uri = format!("/results/metadata?batchId={}", fx.batch_id);

    let response = send(router(&fx), Method::GET, &uri, Some(&fx.member.username)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    let json = body_json(response).await;
    let results = json.as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["componentResults"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_metadata_endpoint_lists_explicit_component_results_flat() {
    let fx = Fixture::new().await;
    let uri = format!(
        "/results/metadata?componentResultIds={},{}",
        fx.component_results[2], fx.component_results[0]
    );

    let response = send(router(&fx), Method::GET, &uri, Some(&fx.member.username)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let results = json.as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.get("studyResultId").is_some()));
    assert!(results.iter().all(|r| r.get("componentResults").is_none()));
}

#[tokio::test]
async fn test_unknown_explicit_id_is_not_found() {
    let fx = Fixture::new().await;

    let response = send(
        router(&fx),
        Method::GET,
        "/results/data?componentResultIds=9999",
        Some(&fx.member.username),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(error_code(response).await, "not_found");
}

#[tokio::test]
async fn test_stranger_gets_empty_export() {
    let fx = Fixture::new().await;
    let uri = format!("/results/metadata?studyId={}", fx.study_id);

    let response = send(router(&fx), Method::GET, &uri, Some(&fx.stranger.username)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "[]");
}

#[tokio::test]
async fn test_export_endpoint_returns_zip() {
    let fx = Fixture::new().await;
    let uri = format!("/results/export?studyId={}&type=DATA_ONLY", fx.study_id);

    let response = send(router(&fx), Method::GET, &uri, Some(&fx.member.username)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/zip");
    assert!(
        response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .starts_with("attachment")
    );

    let bytes = body_bytes(response).await;
    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    assert_eq!(archive.len(), 3);
    let mut first = String::new();
    archive.by_index(0).unwrap().read_to_string(&mut first).unwrap();
    assert_eq!(first, "r1c1");
}

#[tokio::test]
async fn test_export_endpoint_defaults_to_combined() {
    let fx = Fixture::new().await;
    let uri = format!("/results/export?studyResultIds={}", fx.study_results[1]);

    let response = send(router(&fx), Method::GET, &uri, Some(&fx.member.username)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = body_bytes(response).await;
    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    // one data.txt plus metadata.json
    assert_eq!(archive.len(), 2);
    assert_eq!(
        archive.by_index(1).unwrap().name(),
        crate::streamer::archive::METADATA_ENTRY
    );
}

#[tokio::test]
async fn test_export_endpoint_rejects_unknown_type() {
    let fx = Fixture::new().await;
    let uri = format!("/results/export?studyId={}&type=EVERYTHING", fx.study_id);

    let response = send(router(&fx), Method::GET, &uri, Some(&fx.member.username)).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_oversized_selector_is_bad_request() {
    let fx = Fixture::new().await;
    let uri = "/results/data?studyResultIds=0-9223372036854775806";

    let response = send(router(&fx), Method::GET, uri, Some(&fx.member.username)).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(response).await, "bad_request");
}

#[tokio::test]
async fn test_slow_export_sends_filler_before_first_chunk() {
    let fx = Fixture::new().await;
    let mut config = fx.config.clone();
    config.export.keep_alive_interval = Duration::from_millis(20);
    let state = AppState::new(fx.db.clone(), Arc::new(config));

    // Returned before the producer writes anything
    let response = stream_export(&state, "text/plain", |_streamer, mut sink| async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        sink.write("r1c1".to_string()).await?;
        Ok::<_, crate::Error>(ExportReport::default())
    });
    assert_eq!(response.status(), StatusCode::OK);

    let text = body_text(response).await;
    assert!(text.starts_with(KEEP_ALIVE_FILLER), "got {text:?}");
    assert_eq!(text.trim_start(), "r1c1");
}
