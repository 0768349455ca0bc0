//! Per-job scratch directories.
//!
//! Every job gets its own directory below the configured base directory. The
//! directory name starts with the job identifier, so it is unique even when
//! many jobs start within the same millisecond, and the directory is removed
//! when the job ends on every exit path.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::types::JobId;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("failed to create base directory `{path}`: {source}")]
    CreateBase {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to create job directory in `{path}`: {source}")]
    CreateJobDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("workspace task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// A directory owned by exactly one job.
///
/// Call [`Workspace::release`] when the job is done. If the value is dropped
/// instead (early return, panic, cancelled future) the directory is removed
/// all the same.
#[derive(Debug)]
pub struct Workspace {
    job_id: JobId,
    dir: Option<TempDir>,
    path: PathBuf,
    location: PathBuf,
}

impl Workspace {
    /// Ensure `base_dir` exists and create a fresh job directory inside it.
    pub fn acquire(base_dir: &Path, job_id: JobId) -> Result<Self, WorkspaceError> {
        // An existing base directory is success; concurrent jobs race on it.
        fs::create_dir_all(base_dir).map_err(|source| WorkspaceError::CreateBase {
            path: base_dir.to_path_buf(),
            source,
        })?;
        let canonical_base =
            fs::canonicalize(base_dir).map_err(|source| WorkspaceError::CreateBase {
                path: base_dir.to_path_buf(),
                source,
            })?;

        let dir = tempfile::Builder::new()
            .prefix(&format!("{job_id}-"))
            .tempdir_in(&canonical_base)
            .map_err(|source| WorkspaceError::CreateJobDir {
                path: canonical_base.clone(),
                source,
            })?;
        let path = dir.path().to_path_buf();
        let location = match path.file_name() {
            Some(name) => base_dir.join(name),
            None => path.clone(),
        };

        debug!(
            target = "application::compile::workspace",
            op = "workspace::acquire",
            job_id = %job_id,
            path = %path.display(),
            "Workspace acquired"
        );

        Ok(Self {
            job_id,
            dir: Some(dir),
            path,
            location,
        })
    }

    /// [`Workspace::acquire`] on the blocking thread pool.
    pub async fn prepare(base_dir: &Path, job_id: JobId) -> Result<Self, WorkspaceError> {
        let base_dir = base_dir.to_path_buf();
        tokio::task::spawn_blocking(move || Self::acquire(&base_dir, job_id)).await?
    }

    /// Canonical absolute path, handed to the compiler.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The same directory spelled below the base directory as configured.
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Recursively remove the workspace. Removal problems are logged, never returned.
    pub fn release(mut self) {
        self.remove();
    }

    /// [`Workspace::release`] on the blocking thread pool.
    pub async fn dispose(self) {
        let job_id = self.job_id;
        if let Err(err) = tokio::task::spawn_blocking(move || self.release()).await {
            warn!(
                target = "application::compile::workspace",
                op = "workspace::release",
                result = "error",
                job_id = %job_id,
                error = %err,
                "Workspace release task failed"
            );
        }
    }

    fn remove(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };

        match dir.close() {
            Ok(()) => debug!(
                target = "application::compile::workspace",
                op = "workspace::release",
                job_id = %self.job_id,
                path = %self.path.display(),
                "Workspace released"
            ),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(
                target = "application::compile::workspace",
                op = "workspace::release",
                result = "error",
                job_id = %self.job_id,
                path = %self.path.display(),
                error = %err,
                "Failed to remove workspace"
            ),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.remove();
    }
}
