//! Per-request scratch directories.
//!
//! Every request gets its own directory, named after a fresh UUID token, under
//! the configured scratch root. The upload, the extracted angle table, and all
//! rendered images live there until the response has been assembled, and then
//! the whole directory goes away.
//!
//! Cleanup is guaranteed three ways:
//! 1. the orchestrator calls [`Workspace::release`] on entry to `Done` or
//!    `Failed`;
//! 2. [`Drop`] calls it again, covering early returns, panics, and a
//!    cancelled request future;
//! 3. the directory is a [`TempDir`], so even a release that fails to remove
//!    a tracked file still attempts the recursive delete.
//!
//! Release never returns an error. A cleanup failure is logged and swallowed
//! so it can never replace the request's real result.

use crate::error::PipelineError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};
use uuid::Uuid;

/// Allocates workspaces under one scratch root.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a fresh, empty, uniquely named directory.
    pub fn acquire(&self) -> Result<Workspace, PipelineError> {
        std::fs::create_dir_all(&self.root).map_err(|e| PipelineError::Workspace {
            path: self.root.clone(),
            source: e,
        })?;

        let token = Uuid::new_v4();
        let dir = tempfile::Builder::new()
            .prefix(&format!("torsion-{}-", token.simple()))
            .tempdir_in(&self.root)
            .map_err(|e| PipelineError::Workspace {
                path: self.root.clone(),
                source: e,
            })?;

        debug!("Acquired workspace {}", dir.path().display());
        Ok(Workspace {
            token,
            path: dir.path().to_path_buf(),
            dir: Some(dir),
            tracked: Vec::new(),
        })
    }
}

/// One request's scratch directory and the artifacts registered in it.
#[derive(Debug)]
pub struct Workspace {
    token: Uuid,
    path: PathBuf,
    dir: Option<TempDir>,
    tracked: Vec<PathBuf>,
}

impl Workspace {
    /// The per-request token embedded in the directory name.
    pub fn token(&self) -> Uuid {
        self.token
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_released(&self) -> bool {
        self.dir.is_none()
    }

    /// Register a path for deletion on release.
    pub fn track(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.tracked.contains(&path) {
            self.tracked.push(path);
        }
    }

    pub fn tracked(&self) -> &[PathBuf] {
        &self.tracked
    }

    /// Path for a named artifact inside the workspace, tracked for cleanup.
    pub fn artifact_path(&mut self, file_name: &str) -> PathBuf {
        let path = self.path.join(file_name);
        self.track(path.clone());
        path
    }

    /// Write `bytes` into the workspace under `file_name` and track it.
    pub async fn write_artifact(
        &mut self,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, PipelineError> {
        let path = self.artifact_path(file_name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| PipelineError::Workspace {
                path: path.clone(),
                source: e,
            })?;
        Ok(path)
    }

    /// Delete every tracked artifact, then the directory itself.
    ///
    /// Idempotent. Never fails: problems are logged at `warn`.
    pub fn release(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };

        for path in self.tracked.drain(..) {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove artifact {}: {}", path.display(), e),
            }
        }

        if let Err(e) = dir.close() {
            warn!("Failed to remove workspace {}: {}", self.path.display(), e);
        } else {
            debug!("Released workspace {}", self.path.display());
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.release();
    }
}
