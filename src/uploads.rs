//! On-disk storage of files uploaded during study runs.
//!
//! Layout: `<root>/study_result_<id>/comp-result_<id>/<file>`. The same
//! relative layout is reused for zip entries, with an extra `files/` level.

use crate::error::Result;
use crate::types::{ComponentResultId, StudyResultId};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One uploaded file of a component result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Absolute path on disk
    pub path: PathBuf,
    /// Path relative to the component result's upload directory, `/`-separated
    pub relative: String,
}

/// Access to the result upload directories
#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    /// Create a store rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Upload directory of a study result
    pub fn study_result_dir(&self, study_result_id: StudyResultId) -> PathBuf {
        self.root.join(study_result_dir_name(study_result_id))
    }

    /// Upload directory of a component result
    pub fn component_result_dir(
        &self,
        study_result_id: StudyResultId,
        component_result_id: ComponentResultId,
    ) -> PathBuf {
        self.study_result_dir(study_result_id)
            .join(component_result_dir_name(component_result_id))
    }

    /// Store an uploaded file for a component result
    pub async fn save(
        &self,
        study_result_id: StudyResultId,
        component_result_id: ComponentResultId,
        filename: &str,
        content: &[u8],
    ) -> Result<PathBuf> {
        let dir = self.component_result_dir(study_result_id, component_result_id);
        let path = dir.join(filename);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;
        Ok(path)
    }

    /// Delete a study result's upload directory; a missing directory is not an error
    pub async fn remove_study_result_dir(&self, study_result_id: StudyResultId) -> io::Result<()> {
        remove_dir_if_exists(&self.study_result_dir(study_result_id)).await
    }

    /// Delete a component result's upload directory; a missing directory is not an error
    pub async fn remove_component_result_dir(
        &self,
        study_result_id: StudyResultId,
        component_result_id: ComponentResultId,
    ) -> io::Result<()> {
        remove_dir_if_exists(&self.component_result_dir(study_result_id, component_result_id)).await
    }

    /// List a component result's uploaded files, sorted by relative path
    ///
    /// A missing directory yields an empty list. Blocking; call from a
    /// blocking context when used inside async code.
    pub fn list_files(
        &self,
        study_result_id: StudyResultId,
        component_result_id: ComponentResultId,
    ) -> io::Result<Vec<UploadedFile>> {
        let dir = self.component_result_dir(study_result_id, component_result_id);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in walkdir::WalkDir::new(&dir).sort_by_file_name() {
            let entry = entry.map_err(io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&dir)
                .map_err(io::Error::other)?
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            files.push(UploadedFile {
                path: entry.path().to_path_buf(),
                relative,
            });
        }
        Ok(files)
    }
}

async fn remove_dir_if_exists(dir: &Path) -> io::Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {
            debug!(?dir, "removed upload directory");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

fn study_result_dir_name(study_result_id: StudyResultId) -> String {
    format!("study_result_{study_result_id}")
}

fn component_result_dir_name(component_result_id: ComponentResultId) -> String {
    format!("comp-result_{component_result_id}")
}

/// Zip path prefix of a component result: `study_result_<id>/comp-result_<id>`
pub fn component_result_entry_prefix(
    study_result_id: StudyResultId,
    component_result_id: ComponentResultId,
) -> String {
    format!(
        "{}/{}",
        study_result_dir_name(study_result_id),
        component_result_dir_name(component_result_id)
    )
}

/// Zip path of a component result's data payload
pub fn data_entry_path(
    study_result_id: StudyResultId,
    component_result_id: ComponentResultId,
) -> String {
    format!(
        "{}/data.txt",
        component_result_entry_prefix(study_result_id, component_result_id)
    )
}

/// Zip path of one uploaded file
pub fn file_entry_path(
    study_result_id: StudyResultId,
    component_result_id: ComponentResultId,
    relative: &str,
) -> String {
    format!(
        "{}/files/{relative}",
        component_result_entry_prefix(study_result_id, component_result_id)
    )
}
