//! Zip archive export.
//!
//! Archive layout:
//! - `study_result_<id>/comp-result_<id>/data.txt` - data payload
//! - `study_result_<id>/comp-result_<id>/files/...` - uploaded files
//! - `metadata.json` - appended last, spooled to a temp file while paging
//!
//! Pages are read asynchronously; the zip writes of one page run on the
//! blocking pool, with the writer moved in and back out.

use super::metadata::{ComponentResultMeta, MetadataWriter, StudyResultMeta};
use super::pager::{Page, Pager, close_page};
use super::{Checked, ExportReport, ResultRef, ResultStreamer, Skipped, study_result_meta};
use crate::checker;
use crate::db::{Database, Study, StudyResult};
use crate::error::{Error, Result};
use crate::types::{ResultScope, ResultsType, StudyId, StudyResultId, User};
use crate::uploads::{UploadStore, data_entry_path, file_entry_path};
use sqlx::SqliteConnection;
use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use tempfile::NamedTempFile;
use tracing::{debug, error, warn};
use zip::ZipWriter;
use zip::write::FileOptions;

/// Name of the metadata document inside the archive
pub const METADATA_ENTRY: &str = "metadata.json";

/// A finished archive
///
/// The file lives in the configured temp directory and is deleted when
/// `file` is dropped.
pub struct ArchiveExport {
    /// The zip file
    pub file: NamedTempFile,
    /// Export summary
    pub report: ExportReport,
}

/// One study result ready to be written
struct ArchiveEntry {
    study: Study,
    meta: StudyResultMeta,
    /// Data payloads, aligned with `meta.component_results`
    data: Vec<Option<String>>,
}

/// Blocking side of an archive export
struct ArchiveWriter {
    zip: ZipWriter<File>,
    metadata: Option<MetadataWriter<BufWriter<File>>>,
    uploads: UploadStore,
    results_type: ResultsType,
}

impl ArchiveWriter {
    /// Write a page of entries; an entry whose zip writes fail is skipped
    ///
    /// Only a failing metadata spool ends the export, since `metadata.json`
    /// could not be completed after it.
    fn write_page(&mut self, entries: Vec<ArchiveEntry>) -> Result<Vec<Checked<StudyId>>> {
        let mut outcomes = Vec::with_capacity(entries.len());
        for entry in entries {
            let ArchiveEntry {
                study,
                mut meta,
                data,
            } = entry;

            let study_result_id = meta.id;
            let mut written = Ok(());
            for (component_result, data) in meta.component_results.iter_mut().zip(data) {
                written = self.write_component_result(study_result_id, component_result, data);
                if written.is_err() {
                    break;
                }
            }

            match Checked::from_outcome(written, ResultRef::StudyResult(study_result_id)) {
                Checked::Ok(()) => {
                    if let Some(metadata) = &mut self.metadata {
                        metadata.push(&study, &meta)?;
                    }
                    outcomes.push(Checked::Ok(study.id));
                }
                Checked::Skip(skipped) => outcomes.push(Checked::Skip(skipped)),
            }
        }
        Ok(outcomes)
    }

    fn write_component_result(
        &mut self,
        study_result_id: StudyResultId,
        meta: &mut ComponentResultMeta,
        data: Option<String>,
    ) -> Result<()> {
        if self.results_type.includes_data() {
            self.zip
                .start_file(data_entry_path(study_result_id, meta.id), FileOptions::default())?;
            self.zip.write_all(data.unwrap_or_default().as_bytes())?;
        }

        let files = match self.uploads.list_files(study_result_id, meta.id) {
            Ok(files) => files,
            Err(e) => {
                warn!(
                    study_result_id = %study_result_id,
                    component_result_id = %meta.id,
                    error = %e,
                    "could not list uploaded files"
                );
                Vec::new()
            }
        };

        if self.results_type.includes_files() {
            for file in &files {
                let mut source = match File::open(&file.path) {
                    Ok(source) => source,
                    Err(e) => {
                        warn!(path = ?file.path, error = %e, "skipping unreadable upload");
                        continue;
                    }
                };
                self.zip.start_file(
                    file_entry_path(study_result_id, meta.id, &file.relative),
                    FileOptions::default(),
                )?;
                io::copy(&mut source, &mut self.zip)?;
            }
        }

        meta.files = files.into_iter().map(|f| f.relative).collect();
        Ok(())
    }

    fn finish(mut self) -> Result<()> {
        if let Some(metadata) = self.metadata.take() {
            let mut spool = metadata
                .finish()?
                .into_inner()
                .map_err(|e| Error::Io(e.into_error()))?;
            spool.seek(SeekFrom::Start(0))?;
            self.zip.start_file(METADATA_ENTRY, FileOptions::default())?;
            io::copy(&mut spool, &mut self.zip)?;
        }
        self.zip.finish()?;
        Ok(())
    }
}

/// Run blocking archive work on the blocking pool
async fn blocking<T, F>(job: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| Error::Other(format!("archive task failed: {e}")))?
}

/// Check a study result and load what the archive needs of it
async fn archive_entry(
    conn: &mut SqliteConnection,
    result: &StudyResult,
    scope: &ResultScope,
    user: &User,
    results_type: ResultsType,
) -> Result<ArchiveEntry> {
    let study = checker::check_study_result(&mut *conn, result, user, false).await?;
    let (meta, rows) = study_result_meta(&mut *conn, result, scope).await?;
    let data = rows
        .into_iter()
        .map(|row| row.data.filter(|_| results_type.includes_data()))
        .collect();
    Ok(ArchiveEntry { study, meta, data })
}

impl ResultStreamer {
    /// Build a zip archive of the results in a scope
    ///
    /// Study results are paged; each contributes the component results the
    /// scope covers. An empty scope yields a valid archive (holding only an
    /// empty `metadata.json` when metadata is requested).
    pub async fn export_archive(
        &self,
        scope: &ResultScope,
        user: &User,
        results_type: ResultsType,
    ) -> Result<ArchiveExport> {
        self.check_explicit_ids(scope).await?;

        let temp_dir = self.config.storage.temp_dir.clone();
        tokio::fs::create_dir_all(&temp_dir).await?;

        let (file, mut writer) = blocking({
            let uploads = self.uploads.clone();
            move || {
                let file = tempfile::Builder::new()
                    .prefix("results_")
                    .suffix(".zip")
                    .tempfile_in(&temp_dir)?;
                let zip = ZipWriter::new(file.as_file().try_clone()?);
                let metadata = if results_type.includes_metadata() {
                    let spool = tempfile::tempfile_in(&temp_dir)?;
                    Some(MetadataWriter::new(BufWriter::new(spool))?)
                } else {
                    None
                };
                Ok((
                    file,
                    ArchiveWriter {
                        zip,
                        metadata,
                        uploads,
                        results_type,
                    },
                ))
            }
        })
        .await?;

        let mut pager = Pager::<StudyResult>::open(&self.db, scope, self.config.page_size()).await?;
        let mut report = ExportReport::new(pager.total());

        while let Some(Page { mut tx, items }) = pager.next_page().await? {
            let mut entries = Vec::with_capacity(items.len());
            for result in &items {
                let outcome = archive_entry(&mut tx, result, scope, user, results_type).await;
                match Checked::from_outcome(outcome, ResultRef::StudyResult(result.id)) {
                    Checked::Ok(entry) => entries.push(entry),
                    Checked::Skip(skipped) => report.skip(skipped),
                }
            }
            close_page(tx).await?;

            let (next, outcomes) = blocking(move || {
                let outcomes = writer.write_page(entries)?;
                Ok((writer, outcomes))
            })
            .await?;
            writer = next;

            for outcome in outcomes {
                match outcome {
                    Checked::Ok(study_id) => report.record(study_id),
                    Checked::Skip(skipped) => report.skip(skipped),
                }
            }
        }

        // Paging goes through study results, so these can't be part of the archive
        let orphans = {
            let mut conn = self.db.acquire().await?;
            Database::find_orphaned_component_result_ids(&mut conn, scope).await?
        };
        for id in orphans {
            error!(
                component_result_id = %id,
                "component result has no study result, leaving it out of the archive"
            );
            report.skip(Skipped {
                result: ResultRef::ComponentResult(id),
                reason: "component result has no study result".to_string(),
            });
        }

        blocking(move || writer.finish()).await?;

        report.pages = pager.fetches();
        debug!(
            ?scope,
            ?results_type,
            written = report.written,
            pages = report.pages,
            path = ?file.path(),
            "built result archive"
        );
        if results_type != ResultsType::MetadataOnly {
            report.log_completion(user, "archive");
        }

        Ok(ArchiveExport { file, report })
    }
}
