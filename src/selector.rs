//! Turning selector input into result IDs.
//!
//! A selector string is a comma-separated list of IDs and inclusive
//! `min-max` ranges, e.g. `"1, 4-6,9"`. [`extract_ids`] expands it in
//! encounter order and keeps duplicates. [`ResultSelector`] adds the
//! higher-level keys (study, batch, group, ...) and resolves everything to
//! a deduplicated ID list.

use crate::db::Database;
use crate::error::{Error, Result};
use crate::types::{
    BatchId, ComponentId, ComponentResultId, GroupResultId, ResultScope, StudyId, StudyResultId,
    WorkerId, WorkerType,
};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use std::collections::HashSet;
use std::hash::Hash;

/// Parse a selector string into IDs
///
/// Whitespace and empty tokens are ignored. Ranges are expanded; duplicates
/// are kept. Fails with `BadRequest` when a token is neither a number nor a
/// valid range, when nothing is left, or when expansion would yield more
/// than `max_ids` IDs.
pub fn extract_ids(selector: &str, max_ids: usize) -> Result<Vec<i64>> {
    let mut ids = Vec::new();

    for token in selector.split(',') {
        let token: String = token.chars().filter(|c| !c.is_whitespace()).collect();
        if token.is_empty() {
            continue;
        }

        // A leading '-' would be a negative number, not a range
        let dash = token
            .char_indices()
            .skip(1)
            .find(|(_, c)| *c == '-')
            .map(|(i, _)| i);
        match dash {
            Some(dash) => {
                let (min, max) = (&token[..dash], &token[dash + 1..]);
                let min = parse_id(min, &token)?;
                let max = parse_id(max, &token)?;
                if min > max {
                    return Err(Error::BadRequest(format!(
                        "invalid range '{token}': start is greater than end"
                    )));
                }
                // min >= 0, so the width can't overflow
                let width = (max - min) as u64 + 1;
                if width > max_ids.saturating_sub(ids.len()) as u64 {
                    return Err(too_many_ids(max_ids));
                }
                ids.extend(min..=max);
            }
            None => {
                let id = parse_id(&token, &token)?;
                if ids.len() >= max_ids {
                    return Err(too_many_ids(max_ids));
                }
                ids.push(id);
            }
        }
    }

    if ids.is_empty() {
        return Err(Error::BadRequest(format!(
            "no result IDs in selector '{selector}'"
        )));
    }

    Ok(ids)
}

fn too_many_ids(max_ids: usize) -> Error {
    Error::BadRequest(format!("selector names more than {max_ids} result IDs"))
}

fn parse_id(value: &str, token: &str) -> Result<i64> {
    value
        .parse::<i64>()
        .ok()
        .filter(|id| *id >= 0)
        .ok_or_else(|| Error::BadRequest(format!("invalid result ID '{token}'")))
}

/// Remove duplicates, keeping the first occurrence
pub fn dedup_ids<T: Copy + Eq + Hash>(ids: impl IntoIterator<Item = T>) -> Vec<T> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

/// Which results a request targets
///
/// Deserialized from query parameters or JSON bodies. The first key present
/// wins, in field order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSelector {
    /// Explicit study result IDs (selector string)
    pub study_result_ids: Option<String>,
    /// Explicit component result IDs (selector string)
    pub component_result_ids: Option<String>,
    /// Every result of a study
    pub study_id: Option<StudyId>,
    /// Every result of a component
    pub component_id: Option<ComponentId>,
    /// Every result of a batch
    pub batch_id: Option<BatchId>,
    /// Narrows `batch_id` to one worker type
    pub worker_type: Option<WorkerType>,
    /// Every result of a group
    pub group_id: Option<GroupResultId>,
    /// Every result of a worker
    pub worker_id: Option<WorkerId>,
}

impl ResultSelector {
    /// Selector for explicit study result IDs
    pub fn study_results(ids: impl Into<String>) -> Self {
        Self {
            study_result_ids: Some(ids.into()),
            ..Self::default()
        }
    }

    /// Selector for explicit component result IDs
    pub fn component_results(ids: impl Into<String>) -> Self {
        Self {
            component_result_ids: Some(ids.into()),
            ..Self::default()
        }
    }

    /// Selector for a whole study
    pub fn study(study_id: StudyId) -> Self {
        Self {
            study_id: Some(study_id),
            ..Self::default()
        }
    }

    /// Convert to a scope; explicit ID lists are parsed and deduplicated
    ///
    /// `max_ids` caps the number of IDs an explicit list may expand to.
    pub fn to_scope(&self, max_ids: usize) -> Result<ResultScope> {
        if let Some(selector) = &self.study_result_ids {
            let ids = extract_ids(selector, max_ids)?.into_iter().map(StudyResultId);
            return Ok(ResultScope::StudyResults(dedup_ids(ids)));
        }
        if let Some(selector) = &self.component_result_ids {
            let ids = extract_ids(selector, max_ids)?
                .into_iter()
                .map(ComponentResultId);
            return Ok(ResultScope::ComponentResults(dedup_ids(ids)));
        }
        if let Some(study_id) = self.study_id {
            return Ok(ResultScope::Study(study_id));
        }
        if let Some(component_id) = self.component_id {
            return Ok(ResultScope::Component(component_id));
        }
        if let Some(batch_id) = self.batch_id {
            return Ok(ResultScope::Batch {
                batch_id,
                worker_type: self.worker_type,
            });
        }
        if let Some(group_id) = self.group_id {
            return Ok(ResultScope::Group(group_id));
        }
        if let Some(worker_id) = self.worker_id {
            return Ok(ResultScope::Worker(worker_id));
        }

        Err(Error::BadRequest(
            "no results selected: expected one of studyResultIds, componentResultIds, \
             studyId, componentId, batchId, groupId, workerId"
                .to_string(),
        ))
    }

    /// Resolve to study result IDs
    ///
    /// Explicit IDs are returned as given (deduplicated) without checking
    /// that they exist; higher-level keys go through the repository.
    pub async fn resolve_study_result_ids(
        &self,
        conn: &mut SqliteConnection,
        max_ids: usize,
    ) -> Result<Vec<StudyResultId>> {
        match self.to_scope(max_ids)? {
            ResultScope::StudyResults(ids) => Ok(ids),
            scope => Ok(dedup_ids(
                Database::find_study_result_ids(conn, &scope).await?,
            )),
        }
    }

    /// Resolve to component result IDs
    pub async fn resolve_component_result_ids(
        &self,
        conn: &mut SqliteConnection,
        max_ids: usize,
    ) -> Result<Vec<ComponentResultId>> {
        match self.to_scope(max_ids)? {
            ResultScope::ComponentResults(ids) => Ok(ids),
            scope => Ok(dedup_ids(
                Database::find_component_result_ids(conn, &scope).await?,
            )),
        }
    }
}
