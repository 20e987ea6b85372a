//! Metadata records and the incremental `metadata.json` writer.

use crate::db::{ComponentResult, Study, StudyResult};
use crate::error::Result;
use crate::types::{
    BatchId, ComponentId, ComponentResultId, ComponentResultState, GroupResultId, StudyId,
    StudyResultId, StudyResultState, WorkerId, WorkerType,
};
use chrono::{DateTime, SecondsFormat};
use serde::Serialize;
use std::io::Write;

/// Format a unix timestamp as RFC 3339 (UTC, second precision)
pub fn format_timestamp(timestamp: i64) -> Option<String> {
    DateTime::from_timestamp(timestamp, 0).map(|d| d.to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// Metadata of one component result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentResultMeta {
    /// Component result ID
    pub id: ComponentResultId,
    /// Component that produced it
    pub component_id: ComponentId,
    /// Title of that component
    pub component_title: Option<String>,
    /// Run state
    pub state: ComponentResultState,
    /// Start, RFC 3339
    pub start_date: Option<String>,
    /// End, RFC 3339
    pub end_date: Option<String>,
    /// Size of the data payload in bytes
    pub data_size: usize,
    /// Uploaded files, relative to the component result's upload directory
    pub files: Vec<String>,
}

impl ComponentResultMeta {
    /// Build from a row; `files` starts empty
    pub fn new(result: &ComponentResult, component_title: Option<String>) -> Self {
        Self {
            id: result.id,
            component_id: result.component_id,
            component_title,
            state: result.state,
            start_date: format_timestamp(result.start_date),
            end_date: result.end_date.and_then(format_timestamp),
            data_size: result.data_size(),
            files: Vec::new(),
        }
    }
}

/// Metadata of one study result with its component results
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyResultMeta {
    /// Study result ID
    pub id: StudyResultId,
    /// Batch of the run
    pub batch_id: BatchId,
    /// Worker who ran it
    pub worker_id: WorkerId,
    /// Kind of that worker
    pub worker_type: Option<WorkerType>,
    /// Run state
    pub state: StudyResultState,
    /// Start, RFC 3339
    pub start_date: Option<String>,
    /// End, RFC 3339
    pub end_date: Option<String>,
    /// Group the run is in
    pub active_group_result_id: Option<GroupResultId>,
    /// Group the run was in
    pub history_group_result_id: Option<GroupResultId>,
    /// Component results, in creation order
    pub component_results: Vec<ComponentResultMeta>,
}

impl StudyResultMeta {
    /// Build from a row and its component result metadata
    pub fn new(
        result: &StudyResult,
        worker_type: Option<WorkerType>,
        component_results: Vec<ComponentResultMeta>,
    ) -> Self {
        Self {
            id: result.id,
            batch_id: result.batch_id,
            worker_id: result.worker_id,
            worker_type,
            state: result.state,
            start_date: format_timestamp(result.start_date),
            end_date: result.end_date.and_then(format_timestamp),
            active_group_result_id: result.active_group_result_id,
            history_group_result_id: result.history_group_result_id,
            component_results,
        }
    }
}

/// A study result as emitted by the JSON study result stream
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyResultRecord<'a> {
    /// Owning study
    pub study_id: StudyId,
    /// The metadata fields
    #[serde(flatten)]
    pub meta: &'a StudyResultMeta,
}

/// A component result as emitted by the JSON component result stream
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentResultRecord<'a> {
    /// Owning study
    pub study_id: StudyId,
    /// Parent study result
    pub study_result_id: Option<StudyResultId>,
    /// The metadata fields
    #[serde(flatten)]
    pub meta: &'a ComponentResultMeta,
}

/// Writes `metadata.json` one study result at a time
///
/// Layout: `[{"studyId":..,"studyTitle":..,"studyResults":[..]}, ..]`. A
/// study object is opened when its first study result arrives and closed
/// when a different study starts, so results must come grouped by study.
pub struct MetadataWriter<W: Write> {
    out: W,
    current_study: Option<StudyId>,
    studies: usize,
    results_in_study: usize,
}

impl<W: Write> MetadataWriter<W> {
    /// Start the document
    pub fn new(mut out: W) -> Result<Self> {
        out.write_all(b"[")?;
        Ok(Self {
            out,
            current_study: None,
            studies: 0,
            results_in_study: 0,
        })
    }

    /// Append a study result of `study`
    pub fn push(&mut self, study: &Study, result: &StudyResultMeta) -> Result<()> {
        if self.current_study != Some(study.id) {
            self.close_study()?;
            if self.studies > 0 {
                self.out.write_all(b",")?;
            }
            self.out.write_all(b"{\"studyId\":")?;
            serde_json::to_writer(&mut self.out, &study.id)?;
            self.out.write_all(b",\"studyTitle\":")?;
            serde_json::to_writer(&mut self.out, &study.title)?;
            self.out.write_all(b",\"studyResults\":[")?;

            self.current_study = Some(study.id);
            self.studies += 1;
            self.results_in_study = 0;
        }

        if self.results_in_study > 0 {
            self.out.write_all(b",")?;
        }
        serde_json::to_writer(&mut self.out, result)?;
        self.results_in_study += 1;
        Ok(())
    }

    /// Close the document and hand back the flushed writer
    pub fn finish(mut self) -> Result<W> {
        self.close_study()?;
        self.out.write_all(b"]")?;
        self.out.flush()?;
        Ok(self.out)
    }

    fn close_study(&mut self) -> Result<()> {
        if self.current_study.take().is_some() {
            self.out.write_all(b"]}")?;
        }
        Ok(())
    }
}
