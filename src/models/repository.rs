//! Repository models

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{OpsError, Result};

/// An open repository that operations run against.
///
/// Shared by the dispatcher and every operation it starts. Closing the
/// handle makes in-flight operations stop at their next progress checkpoint.
#[derive(Debug)]
pub struct RepositoryHandle {
    path: PathBuf,
    name: String,
    closed: AtomicBool,
}

impl RepositoryHandle {
    /// Open a handle on an existing repository
    pub fn open(path: &Path) -> Result<Arc<Self>> {
        let repo = git2::Repository::open(path)
            .map_err(|_| OpsError::RepositoryNotFound(path.display().to_string()))?;
        let root = repo.workdir().unwrap_or(repo.path()).to_path_buf();
        Ok(Arc::new(Self::new(root)))
    }

    /// Create a handle without checking the path
    pub fn new(path: PathBuf) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Self {
            path,
            name,
            closed: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Mark the repository as closed (e.g., its window went away)
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!("Repository closed: {}", self.path.display());
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
