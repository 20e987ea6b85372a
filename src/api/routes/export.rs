//! Export handlers.
//!
//! Text and JSON exports run in a spawned task writing into a bounded
//! channel that feeds the response body. The response is returned at once
//! and a space is sent whenever the producer stays silent for a keep-alive
//! interval, which covers the count and first page queries. Selector and
//! explicit ID errors are raised before that and become a proper error
//! response; later failures only end the body early.

use super::ExportQuery;
use crate::api::AppState;
use crate::api::auth::ActingUser;
use crate::error::Result;
use crate::selector::ResultSelector;
use crate::streamer::{ChannelSink, ExportReport, ResultStreamer, keep_alive};
use crate::types::ResultScope;
use axum::{
    body::Body,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use std::convert::Infallible;
use std::future::Future;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";
const JSON_CONTENT_TYPE: &str = "application/json";

/// GET /results/data - Raw data of the selected component results, one per line
pub async fn export_data(
    State(state): State<AppState>,
    ActingUser(user): ActingUser,
    Query(selector): Query<ResultSelector>,
) -> Result<Response> {
    let scope = selector.to_scope(state.config.export.max_selector_ids)?;
    state.streamer.check_explicit_ids(&scope).await?;
    Ok(stream_export(&state, TEXT_CONTENT_TYPE, move |streamer, mut sink| async move {
        streamer.stream_data_text(&scope, &user, &mut sink).await
    }))
}

/// GET /results/metadata - JSON metadata of the selected results
///
/// Explicit component result IDs produce a flat array of component results;
/// every other selector produces study results with nested component results.
pub async fn export_metadata(
    State(state): State<AppState>,
    ActingUser(user): ActingUser,
    Query(selector): Query<ResultSelector>,
) -> Result<Response> {
    let scope = selector.to_scope(state.config.export.max_selector_ids)?;
    state.streamer.check_explicit_ids(&scope).await?;
    Ok(stream_export(&state, JSON_CONTENT_TYPE, move |streamer, mut sink| async move {
        if matches!(scope, ResultScope::ComponentResults(_)) {
            streamer
                .stream_component_results_json(&scope, &user, &mut sink)
                .await
        } else {
            streamer
                .stream_study_results_json(&scope, &user, &mut sink)
                .await
        }
    }))
}

/// GET /results/export?type=... - Zip archive of the selected results
pub async fn export_archive(
    State(state): State<AppState>,
    ActingUser(user): ActingUser,
    Query(selector): Query<ResultSelector>,
    Query(query): Query<ExportQuery>,
) -> Result<Response> {
    let scope = selector.to_scope(state.config.export.max_selector_ids)?;
    let export = state
        .streamer
        .export_archive(&scope, &user, query.results_type)
        .await?;

    let length = export.file.as_file().metadata()?.len();
    let file = tokio::fs::File::from_std(export.file.reopen()?);
    let temp_file = export.file;
    let body = ReaderStream::new(file).map(move |chunk| {
        // the archive is deleted once the body is dropped
        let _archive = &temp_file;
        chunk
    });

    let headers = [
        (header::CONTENT_TYPE, "application/zip".to_string()),
        (
            header::CONTENT_DISPOSITION,
            "attachment; filename=\"results.zip\"".to_string(),
        ),
        (header::CONTENT_LENGTH, length.to_string()),
    ];
    Ok((headers, Body::from_stream(body)).into_response())
}

/// Run an export in a task and stream its output as the response body
///
/// Returns without waiting for the export; its outcome is only logged.
pub(crate) fn stream_export<F, Fut>(
    state: &AppState,
    content_type: &'static str,
    export: F,
) -> Response
where
    F: FnOnce(ResultStreamer, ChannelSink) -> Fut,
    Fut: Future<Output = Result<ExportReport>> + Send + 'static,
{
    let (sink, rx) = ChannelSink::new(state.config.export.channel_capacity);
    let task = export(state.streamer.clone(), sink);
    tokio::spawn(async move {
        match task.await {
            Ok(report) => debug!(
                written = report.written,
                skipped = report.skipped.len(),
                pages = report.pages,
                "export streamed"
            ),
            Err(e) => warn!(error = %e, "export ended early"),
        }
    });

    let chunks = ReceiverStream::new(rx);
    let body = keep_alive(chunks, state.config.export.keep_alive_interval).map(Ok::<_, Infallible>);

    ([(header::CONTENT_TYPE, content_type)], Body::from_stream(body)).into_response()
}
