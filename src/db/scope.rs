//! SQL filters for result scopes.
//!
//! Study result queries alias `study_results` as `sr`. Component result
//! queries alias `component_results` as `cr` and LEFT JOIN `sr`, so damaged
//! rows without a parent still show up for component-level scopes.

use crate::types::ResultScope;
use sqlx::{QueryBuilder, Sqlite};
use std::fmt;

/// Push `IN (...)` for a list of IDs; an empty list matches nothing
///
/// The list is bound once as a JSON array and unpacked with `json_each`, so
/// its length is not limited by SQLite's host parameter limit.
fn push_id_list<T: fmt::Display>(qb: &mut QueryBuilder<'_, Sqlite>, column: &str, ids: &[T]) {
    if ids.is_empty() {
        qb.push("1 = 0");
        return;
    }
    let list = ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(",");
    qb.push(column)
        .push(" IN (SELECT value FROM json_each(")
        .push_bind(format!("[{list}]"))
        .push("))");
}

/// Push a WHERE clause restricting `sr` to the scope
pub(super) fn push_study_result_filter(qb: &mut QueryBuilder<'_, Sqlite>, scope: &ResultScope) {
    qb.push(" WHERE ");
    match scope {
        ResultScope::Study(study_id) => {
            qb.push("sr.study_id = ").push_bind(*study_id);
        }
        ResultScope::Component(component_id) => {
            qb.push("sr.id IN (SELECT study_result_id FROM component_results WHERE component_id = ")
                .push_bind(*component_id)
                .push(")");
        }
        ResultScope::Batch {
            batch_id,
            worker_type,
        } => {
            qb.push("sr.batch_id = ").push_bind(*batch_id);
            if let Some(worker_type) = worker_type {
                qb.push(" AND sr.worker_id IN (SELECT id FROM workers WHERE worker_type = ")
                    .push_bind(worker_type.as_str())
                    .push(")");
            }
        }
        ResultScope::Group(group_id) => {
            qb.push("(sr.active_group_result_id = ")
                .push_bind(*group_id)
                .push(" OR sr.history_group_result_id = ")
                .push_bind(*group_id)
                .push(")");
        }
        ResultScope::Worker(worker_id) => {
            qb.push("sr.worker_id = ").push_bind(*worker_id);
        }
        ResultScope::StudyResults(ids) => {
            push_id_list(qb, "sr.id", ids);
        }
        ResultScope::ComponentResults(ids) => {
            qb.push("sr.id IN (SELECT study_result_id FROM component_results WHERE ");
            push_id_list(qb, "id", ids);
            qb.push(")");
        }
    }
}

/// Push a WHERE clause restricting `cr` (joined with `sr`) to the scope
pub(super) fn push_component_result_filter(
    qb: &mut QueryBuilder<'_, Sqlite>,
    scope: &ResultScope,
) {
    qb.push(" WHERE ");
    match scope {
        ResultScope::Study(study_id) => {
            qb.push("sr.study_id = ").push_bind(*study_id);
        }
        ResultScope::Component(component_id) => {
            qb.push("cr.component_id = ").push_bind(*component_id);
        }
        ResultScope::Batch {
            batch_id,
            worker_type,
        } => {
            qb.push("sr.batch_id = ").push_bind(*batch_id);
            if let Some(worker_type) = worker_type {
                qb.push(" AND sr.worker_id IN (SELECT id FROM workers WHERE worker_type = ")
                    .push_bind(worker_type.as_str())
                    .push(")");
            }
        }
        ResultScope::Group(group_id) => {
            qb.push("(sr.active_group_result_id = ")
                .push_bind(*group_id)
                .push(" OR sr.history_group_result_id = ")
                .push_bind(*group_id)
                .push(")");
        }
        ResultScope::Worker(worker_id) => {
            qb.push("sr.worker_id = ").push_bind(*worker_id);
        }
        ResultScope::StudyResults(ids) => {
            push_id_list(qb, "cr.study_result_id", ids);
        }
        ResultScope::ComponentResults(ids) => {
            push_id_list(qb, "cr.id", ids);
        }
    }
}
