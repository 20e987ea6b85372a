//! Route handlers for the REST API
//!
//! Handlers are organized by concern:
//! - [`export`] - Text, JSON and zip exports
//! - [`removal`] - Result removal
//! - [`system`] - Health
//!
//! Results are picked with a [`ResultSelector`](crate::selector::ResultSelector)
//! in the query string (`studyResultIds=1,3-5`, `studyId=2`, ...). Extra
//! parameters per route live in the small query types below; each is
//! extracted separately from the same query string.

use crate::types::ResultsType;
use serde::{Deserialize, Serialize};

mod export;
mod removal;
mod system;

pub use export::*;
pub use removal::*;
pub use system::*;

/// Query parameters for GET /results/export
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ExportQuery {
    /// Archive content; `COMBINED` when absent
    #[serde(rename = "type", default)]
    pub results_type: ResultsType,
}

/// Query parameters for DELETE /results/component-results
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveComponentResultsQuery {
    /// Also remove study results left without component results (default: false)
    #[serde(default)]
    pub remove_empty_parents: bool,
}
