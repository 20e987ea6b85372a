use super::*;
use crate::db::tests::Fixture;
use crate::types::{ComponentResultId, StudyResultId, WorkerId, WorkerType};


/// Streamer over the fixture with the given page size
fn streamer(fx: &Fixture, page_size: usize) -> ResultStreamer {
    let mut config = fx.config.clone();
    config.export.max_db_query_size = page_size;
    ResultStreamer::new(fx.db.clone(), fx.uploads.clone(), Arc::new(config))
}

/// Store a worker type no row decoder accepts
async fn corrupt_worker(fx: &Fixture, worker_id: WorkerId) {
    sqlx::query("UPDATE workers SET worker_type = 'Bogus' WHERE id = ?")
        .bind(worker_id)
        .execute(fx.db.pool())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_study_results_json_nests_component_results() {
    let fx = Fixture::new().await;
    let mut out = String::new();

    let report = streamer(&fx, 100)
        .stream_study_results_json(&ResultScope::Study(fx.study_id), &fx.member, &mut out)
        .await
        .unwrap();

    let json: serde_json::Value = serde_json::from_str(&out).unwrap();
    let results = json.as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["id"], fx.study_results[0].get());
    assert_eq!(results[0]["studyId"], fx.study_id.get());
    assert_eq!(results[0]["workerType"], "PersonalSingle");
    assert_eq!(results[0]["componentResults"].as_array().unwrap().len(), 2);
    assert_eq!(results[0]["componentResults"][0]["componentTitle"], "Intro");
    assert_eq!(results[1]["componentResults"].as_array().unwrap().len(), 1);

    assert_eq!(report.total, 2);
    assert_eq!(report.written, 2);
    assert_eq!(report.pages, 1);
    assert!(report.skipped.is_empty());
    assert_eq!(report.studies.iter().copied().collect::<Vec<_>>(), vec![fx.study_id]);
}

#[tokio::test]
async fn test_component_scope_nests_only_matching_component_results() {
    let fx = Fixture::new().await;
    let mut out = String::new();

    streamer(&fx, 100)
        .stream_study_results_json(&ResultScope::Component(fx.components[1]), &fx.member, &mut out)
        .await
        .unwrap();

    let json: serde_json::Value = serde_json::from_str(&out).unwrap();
    let results = json.as_array().unwrap();
    assert_eq!(results.len(), 1);
    let nested = results[0]["componentResults"].as_array().unwrap();
    assert_eq!(nested.len(), 1);
    assert_eq!(nested[0]["id"], fx.component_results[1].get());
}

#[tokio::test]
async fn test_empty_scope_produces_empty_array() {
    let fx = Fixture::new().await;
    let mut out = String::new();

    let report = streamer(&fx, 100)
        .stream_component_results_json(&ResultScope::Worker(WorkerId(999)), &fx.member, &mut out)
        .await
        .unwrap();

    assert_eq!(out, "[]");
    assert_eq!(report.total, 0);
    assert_eq!(report.pages, 0);
}

#[tokio::test]
async fn test_data_text_joins_payloads_in_order() {
    let mut fx = Fixture::new().await;
    fx.add_run(WorkerType::GeneralSingle, &[None, Some("x")]).await;
    let mut out = String::new();

    let report = streamer(&fx, 100)
        .stream_data_text(&ResultScope::Study(fx.study_id), &fx.member, &mut out)
        .await
        .unwrap();

    assert_eq!(out, "r1c1\nr1c2\nr2c1\n\nx");
    assert_eq!(out.split('\n').count() as u64, report.written);
    assert_eq!(report.written, 5);
}

#[tokio::test]
async fn test_pagination_is_invisible_in_output() {
    let mut fx = Fixture::new().await;
    // 3 + 4 = 7 component results = 2 * 3 + 1
    for i in 0..4 {
        let payload = format!("extra{i}");
        fx.add_run(WorkerType::GeneralMultiple, &[Some(payload.as_str())])
            .await;
    }
    let scope = ResultScope::Study(fx.study_id);

    let mut paged = String::new();
    let paged_report = streamer(&fx, 3)
        .stream_data_text(&scope, &fx.member, &mut paged)
        .await
        .unwrap();

    let mut single = String::new();
    let single_report = streamer(&fx, 100)
        .stream_data_text(&scope, &fx.member, &mut single)
        .await
        .unwrap();

    assert_eq!(paged_report.pages, 3);
    assert_eq!(single_report.pages, 1);
    assert_eq!(paged, single);
    assert_eq!(paged.lines().count(), 7);

    let mut paged_json = String::new();
    let report = streamer(&fx, 3)
        .stream_component_results_json(&scope, &fx.member, &mut paged_json)
        .await
        .unwrap();
    assert_eq!(report.pages, 3);
    let json: serde_json::Value = serde_json::from_str(&paged_json).unwrap();
    assert_eq!(json.as_array().unwrap().len(), 7);
}

#[tokio::test]
async fn test_unauthorized_results_are_skipped_not_fatal() {
    let fx = Fixture::new().await;
    let foreign = fx.add_foreign_study().await;
    let scope = ResultScope::StudyResults(vec![fx.study_results[0], foreign]);
    let mut out = String::new();

    let report = streamer(&fx, 1)
        .stream_study_results_json(&scope, &fx.member, &mut out)
        .await
        .unwrap();

    let json: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(json.as_array().unwrap().len(), 1);
    assert_eq!(report.total, 2);
    assert_eq!(report.written, 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].result, ResultRef::StudyResult(foreign));
}

#[tokio::test]
async fn test_stranger_gets_a_valid_empty_export() {
    let fx = Fixture::new().await;
    let mut out = String::new();

    let report = streamer(&fx, 2)
        .stream_component_results_json(&ResultScope::Study(fx.study_id), &fx.stranger, &mut out)
        .await
        .unwrap();

    assert_eq!(out, "[]");
    assert_eq!(report.skipped.len(), 3);
    assert!(report.studies.is_empty());
}

#[tokio::test]
async fn test_missing_explicit_ids_are_not_found() {
    let fx = Fixture::new().await;
    let mut out = String::new();

    let scope = ResultScope::ComponentResults(vec![fx.component_results[0], ComponentResultId(999)]);
    let err = streamer(&fx, 100)
        .stream_data_text(&scope, &fx.member, &mut out)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(ref m) if m.contains("999")), "got {err:?}");

    let scope = ResultScope::StudyResults(vec![StudyResultId(998)]);
    let err = streamer(&fx, 100)
        .stream_study_results_json(&scope, &fx.member, &mut out)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    assert!(out.is_empty());
}

#[tokio::test]
async fn test_component_results_json_lists_uploaded_files() {
    let fx = Fixture::new().await;
    fx.uploads
        .save(fx.study_results[0], fx.component_results[0], "answers.csv", b"1,2")
        .await
        .unwrap();
    let mut out = String::new();

    streamer(&fx, 100)
        .stream_component_results_json(
            &ResultScope::ComponentResults(vec![fx.component_results[0]]),
            &fx.member,
            &mut out,
        )
        .await
        .unwrap();

    let json: serde_json::Value = serde_json::from_str(&out).unwrap();
    let record = &json[0];
    assert_eq!(record["studyResultId"], fx.study_results[0].get());
    assert_eq!(record["dataSize"], 4);
    assert_eq!(record["files"], serde_json::json!(["answers.csv"]));
}

#[tokio::test]
async fn test_closed_sink_ends_the_export() {
    let fx = Fixture::new().await;
    let (mut sink, rx) = ChannelSink::new(1);
    drop(rx);

    let err = streamer(&fx, 1)
        .stream_study_results_json(&ResultScope::Study(fx.study_id), &fx.member, &mut sink)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Io(_)), "got {err:?}");
}

#[tokio::test]
async fn test_unreadable_result_is_skipped_and_json_stays_valid() {
    let fx = Fixture::new().await;
    corrupt_worker(&fx, fx.workers[1]).await;
    let mut out = String::new();

    let report = streamer(&fx, 1)
        .stream_study_results_json(&ResultScope::Study(fx.study_id), &fx.member, &mut out)
        .await
        .unwrap();

    let json: serde_json::Value = serde_json::from_str(&out).unwrap();
    let results = json.as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["id"], fx.study_results[0].get());
    assert_eq!(report.total, 2);
    assert_eq!(report.written, 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].result, ResultRef::StudyResult(fx.study_results[1]));
    assert!(report.skipped[0].reason.contains("worker"), "{:?}", report.skipped[0]);
}

#[tokio::test]
async fn test_explicit_ids_beyond_bind_limit_are_not_found() {
    let fx = Fixture::new().await;
    let mut out = String::new();

    let mut ids = vec![fx.study_results[0]];
    ids.extend((100_000..140_000).map(StudyResultId));
    let err = streamer(&fx, 100)
        .stream_study_results_json(&ResultScope::StudyResults(ids), &fx.member, &mut out)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(ref m) if m.contains("100000")), "got {err:?}");
    assert!(out.is_empty());
}
