//! Paginated result export.
//!
//! Every export counts its scope once and then walks it page by page, one
//! transaction per page. Each entity is permission-checked and loaded on
//! its own: a failing check or load skips the entity and is recorded in the
//! [`ExportReport`], it never aborts the export. Only a failing sink or
//! page query ends it early. Output is written to a [`ResultSink`] after
//! the page's transaction is closed, so a slow consumer holds no database
//! resources. Output stays well-formed whatever gets skipped.
//!
//! ## Submodules
//! - [`sink`] - Sinks and the keep-alive adapter
//! - [`pager`] - Pull-based paging
//! - [`metadata`] - Metadata records and `metadata.json`
//! - [`archive`] - Zip archive export

use crate::checker;
use crate::config::Config;
use crate::db::{ComponentResult, Database, StudyResult};
use crate::error::{Error, Result};
use crate::types::{ComponentResultId, ResultScope, StudyId, StudyResultId, User};
use crate::uploads::UploadStore;
use serde::Serialize;
use sqlx::SqliteConnection;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub mod archive;
pub mod metadata;
pub mod pager;
pub mod sink;

pub use archive::ArchiveExport;
pub use metadata::{ComponentResultMeta, MetadataWriter, StudyResultMeta};
pub use pager::{Page, Pager};
pub use sink::{ChannelSink, KEEP_ALIVE_FILLER, ResultSink, keep_alive};

use metadata::{ComponentResultRecord, StudyResultRecord};
use pager::close_page;

/// A result entity named in a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "id")]
pub enum ResultRef {
    /// A study result
    StudyResult(StudyResultId),
    /// A component result
    ComponentResult(ComponentResultId),
}

impl fmt::Display for ResultRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultRef::StudyResult(id) => write!(f, "study result {id}"),
            ResultRef::ComponentResult(id) => write!(f, "component result {id}"),
        }
    }
}

/// An entity left out of an export
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Skipped {
    /// The entity
    pub result: ResultRef,
    /// Why it was left out
    pub reason: String,
}

/// Outcome of preparing one entity for an export
#[derive(Debug)]
pub enum Checked<T> {
    /// Ready to be written
    Ok(T),
    /// Failed a check or could not be loaded; the entity is skipped
    Skip(Skipped),
}

impl<T> Checked<T> {
    /// Classify the outcome of preparing one entity
    ///
    /// Every failure skips the entity: client errors (permissions, lock) at
    /// `warn`, anything else at `error`.
    fn from_outcome(outcome: Result<T>, result: ResultRef) -> Self {
        match outcome {
            Ok(value) => Checked::Ok(value),
            Err(e) => {
                if e.is_client_error() {
                    warn!(%result, error = %e, "skipping result in export");
                } else {
                    error!(%result, error = %e, "could not export result, skipping it");
                }
                Checked::Skip(Skipped {
                    result,
                    reason: e.to_string(),
                })
            }
        }
    }
}

/// Summary of one export
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportReport {
    /// Entities counted in the scope
    pub total: u64,
    /// Entities written
    pub written: u64,
    /// Pages fetched
    pub pages: usize,
    /// Entities left out
    pub skipped: Vec<Skipped>,
    /// Studies whose results were written
    pub studies: BTreeSet<StudyId>,
}

impl ExportReport {
    fn new(total: u64) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    fn record(&mut self, study_id: StudyId) {
        self.written += 1;
        self.studies.insert(study_id);
    }

    fn skip(&mut self, skipped: Skipped) {
        self.skipped.push(skipped);
    }

    /// Log one completion event per study written
    fn log_completion(&self, user: &User, kind: &str) {
        for study_id in &self.studies {
            info!(
                target: crate::AUDIT_TARGET,
                study_id = %study_id,
                user = %user.username,
                kind,
                "exported results"
            );
        }
    }
}

/// Streams results of a scope to sinks or archives
#[derive(Clone)]
pub struct ResultStreamer {
    db: Arc<Database>,
    uploads: UploadStore,
    config: Arc<Config>,
}

impl ResultStreamer {
    /// Create a streamer
    pub fn new(db: Arc<Database>, uploads: UploadStore, config: Arc<Config>) -> Self {
        Self {
            db,
            uploads,
            config,
        }
    }

    /// Stream study results as a JSON array, each with its component results
    ///
    /// For component-level scopes only the matching component results are nested.
    pub async fn stream_study_results_json(
        &self,
        scope: &ResultScope,
        user: &User,
        sink: &mut dyn ResultSink,
    ) -> Result<ExportReport> {
        self.check_explicit_ids(scope).await?;
        let mut pager = Pager::<StudyResult>::open(&self.db, scope, self.config.page_size()).await?;
        let mut report = ExportReport::new(pager.total());

        sink.write("[".to_string()).await?;
        while let Some(Page { mut tx, items }) = pager.next_page().await? {
            let mut chunk = String::new();
            for result in &items {
                let outcome = self.study_result_json(&mut tx, result, scope, user).await;
                match Checked::from_outcome(outcome, ResultRef::StudyResult(result.id)) {
                    Checked::Ok((study_id, json)) => {
                        if report.written > 0 {
                            chunk.push(',');
                        }
                        chunk.push_str(&json);
                        report.record(study_id);
                    }
                    Checked::Skip(skipped) => report.skip(skipped),
                }
            }
            close_page(tx).await?;

            if !chunk.is_empty() {
                sink.write(chunk).await?;
            }
        }
        sink.write("]".to_string()).await?;

        report.pages = pager.fetches();
        debug!(?scope, written = report.written, pages = report.pages, "streamed study results");
        Ok(report)
    }

    /// Stream component results as a JSON array of metadata objects
    pub async fn stream_component_results_json(
        &self,
        scope: &ResultScope,
        user: &User,
        sink: &mut dyn ResultSink,
    ) -> Result<ExportReport> {
        self.check_explicit_ids(scope).await?;
        let mut pager =
            Pager::<ComponentResult>::open(&self.db, scope, self.config.page_size()).await?;
        let mut report = ExportReport::new(pager.total());

        sink.write("[".to_string()).await?;
        while let Some(Page { mut tx, items }) = pager.next_page().await? {
            let mut chunk = String::new();
            for result in &items {
                let outcome = self.component_result_json(&mut tx, result, user).await;
                match Checked::from_outcome(outcome, ResultRef::ComponentResult(result.id)) {
                    Checked::Ok((study_id, json)) => {
                        if report.written > 0 {
                            chunk.push(',');
                        }
                        chunk.push_str(&json);
                        report.record(study_id);
                    }
                    Checked::Skip(skipped) => report.skip(skipped),
                }
            }
            close_page(tx).await?;

            if !chunk.is_empty() {
                sink.write(chunk).await?;
            }
        }
        sink.write("]".to_string()).await?;

        report.pages = pager.fetches();
        debug!(?scope, written = report.written, pages = report.pages, "streamed component results");
        Ok(report)
    }

    /// Stream the raw data of the component results, one per line
    ///
    /// Missing or empty data is written as an empty line.
    pub async fn stream_data_text(
        &self,
        scope: &ResultScope,
        user: &User,
        sink: &mut dyn ResultSink,
    ) -> Result<ExportReport> {
        self.check_explicit_ids(scope).await?;
        let mut pager =
            Pager::<ComponentResult>::open(&self.db, scope, self.config.page_size()).await?;
        let mut report = ExportReport::new(pager.total());

        while let Some(Page { mut tx, items }) = pager.next_page().await? {
            let mut chunk = String::new();
            for result in &items {
                let outcome = checker::check_component_result(&mut tx, result, user, false).await;
                let study =
                    match Checked::from_outcome(outcome, ResultRef::ComponentResult(result.id)) {
                        Checked::Ok(study) => study,
                        Checked::Skip(skipped) => {
                            report.skip(skipped);
                            continue;
                        }
                    };

                if report.written > 0 {
                    chunk.push('\n');
                }
                chunk.push_str(result.data.as_deref().unwrap_or_default());
                report.record(study.id);
            }
            close_page(tx).await?;

            if !chunk.is_empty() {
                sink.write(chunk).await?;
            }
        }

        report.pages = pager.fetches();
        report.log_completion(user, "data");
        Ok(report)
    }

    /// Fail with `NotFound` for the first explicitly named ID that doesn't exist
    ///
    /// Every export runs this first. Callers that must report the failure
    /// before output starts can run it up front.
    pub async fn check_explicit_ids(&self, scope: &ResultScope) -> Result<()> {
        let mut conn = self.db.acquire().await?;
        match scope {
            ResultScope::StudyResults(ids) => {
                let found: HashSet<_> = Database::find_study_result_ids(&mut conn, scope)
                    .await?
                    .into_iter()
                    .collect();
                if let Some(missing) = ids.iter().find(|id| !found.contains(id)) {
                    return Err(Error::NotFound(format!("study result {missing}")));
                }
            }
            ResultScope::ComponentResults(ids) => {
                let found: HashSet<_> = Database::find_component_result_ids(&mut conn, scope)
                    .await?
                    .into_iter()
                    .collect();
                if let Some(missing) = ids.iter().find(|id| !found.contains(id)) {
                    return Err(Error::NotFound(format!("component result {missing}")));
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Check a study result and render it as a JSON record
    async fn study_result_json(
        &self,
        conn: &mut SqliteConnection,
        result: &StudyResult,
        scope: &ResultScope,
        user: &User,
    ) -> Result<(StudyId, String)> {
        let study = checker::check_study_result(&mut *conn, result, user, false).await?;

        let (mut meta, _) = study_result_meta(&mut *conn, result, scope).await?;
        for component_result in &mut meta.component_results {
            component_result.files = self.file_names(result.id, component_result.id).await;
        }

        let record = StudyResultRecord {
            study_id: study.id,
            meta: &meta,
        };
        Ok((study.id, serde_json::to_string(&record)?))
    }

    /// Check a component result and render it as a JSON record
    async fn component_result_json(
        &self,
        conn: &mut SqliteConnection,
        result: &ComponentResult,
        user: &User,
    ) -> Result<(StudyId, String)> {
        let study = checker::check_component_result(&mut *conn, result, user, false).await?;

        let mut meta = component_result_meta(&mut *conn, result).await?;
        if let Some(study_result_id) = result.study_result_id {
            meta.files = self.file_names(study_result_id, result.id).await;
        }

        let record = ComponentResultRecord {
            study_id: study.id,
            study_result_id: result.study_result_id,
            meta: &meta,
        };
        Ok((study.id, serde_json::to_string(&record)?))
    }

    /// Names of a component result's uploaded files; unreadable means none
    async fn file_names(
        &self,
        study_result_id: StudyResultId,
        component_result_id: ComponentResultId,
    ) -> Vec<String> {
        let uploads = self.uploads.clone();
        let listing = tokio::task::spawn_blocking(move || {
            uploads.list_files(study_result_id, component_result_id)
        })
        .await;

        match listing {
            Ok(Ok(files)) => files.into_iter().map(|f| f.relative).collect(),
            Ok(Err(e)) => {
                warn!(
                    study_result_id = %study_result_id,
                    component_result_id = %component_result_id,
                    error = %e,
                    "could not list uploaded files"
                );
                Vec::new()
            }
            Err(e) => {
                warn!(error = %e, "file listing task failed");
                Vec::new()
            }
        }
    }
}

/// Metadata of a component result, with its component's title
async fn component_result_meta(
    conn: &mut SqliteConnection,
    result: &ComponentResult,
) -> Result<ComponentResultMeta> {
    let title = Database::get_component(&mut *conn, result.component_id)
        .await?
        .map(|c| c.title);
    Ok(ComponentResultMeta::new(result, title))
}

/// Metadata of a study result and of those of its component results the
/// scope covers, along with these component result rows
async fn study_result_meta(
    conn: &mut SqliteConnection,
    result: &StudyResult,
    scope: &ResultScope,
) -> Result<(StudyResultMeta, Vec<ComponentResult>)> {
    let worker_type = Database::get_worker(&mut *conn, result.worker_id)
        .await?
        .map(|w| w.worker_type);

    let mut rows = Database::find_component_results_of(&mut *conn, result.id).await?;
    rows.retain(|row| scope.covers_component_result(row.id, row.component_id));

    let mut component_results = Vec::with_capacity(rows.len());
    for row in &rows {
        component_results.push(component_result_meta(&mut *conn, row).await?);
    }

    Ok((
        StudyResultMeta::new(result, worker_type, component_results),
        rows,
    ))
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
