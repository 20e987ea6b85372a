//! Removal handlers.
//!
//! Selectors are resolved to IDs first; the remover then loads, checks and
//! removes them in one transaction.

use super::RemoveComponentResultsQuery;
use crate::api::AppState;
use crate::api::auth::ActingUser;
use crate::error::Result;
use crate::remover::RemovalReport;
use crate::selector::ResultSelector;
use crate::types::WorkerId;
use axum::{
    Json,
    extract::{Path, Query, State},
};

/// DELETE /results/component-results - Remove the selected component results
pub async fn remove_component_results(
    State(state): State<AppState>,
    ActingUser(user): ActingUser,
    Query(selector): Query<ResultSelector>,
    Query(query): Query<RemoveComponentResultsQuery>,
) -> Result<Json<RemovalReport>> {
    let ids = {
        let mut conn = state.db.acquire().await?;
        selector
            .resolve_component_result_ids(&mut conn, state.config.export.max_selector_ids)
            .await?
    };

    let report = state
        .remover
        .remove_component_results(&ids, &user, query.remove_empty_parents)
        .await?;
    Ok(Json(report))
}

/// DELETE /results/study-results - Remove the selected study results
pub async fn remove_study_results(
    State(state): State<AppState>,
    ActingUser(user): ActingUser,
    Query(selector): Query<ResultSelector>,
) -> Result<Json<RemovalReport>> {
    let ids = {
        let mut conn = state.db.acquire().await?;
        selector
            .resolve_study_result_ids(&mut conn, state.config.export.max_selector_ids)
            .await?
    };

    let report = state.remover.remove_study_results(&ids, &user).await?;
    Ok(Json(report))
}

/// DELETE /workers/:id - Remove a worker with all of its study results
pub async fn remove_worker(
    State(state): State<AppState>,
    ActingUser(user): ActingUser,
    Path(worker_id): Path<WorkerId>,
) -> Result<Json<RemovalReport>> {
    let report = state.remover.remove_worker(worker_id, &user).await?;
    Ok(Json(report))
}
