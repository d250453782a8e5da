//! Request-exclusive scratch directories for uploaded bytes.
//!
//! A [`ScratchLocation`] is released exactly once: explicitly via
//! [`ScratchLocation::release`] or implicitly when dropped. Flows that need
//! the files to outlive the current turn move the value somewhere that
//! outlives it (e.g. a session store); dropping it there releases it.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

const SCRATCH_PREFIX: &str = "zkyc-";

/// A scratch file or directory could not be removed.
///
/// Never escalated to callers of a request; reported only by
/// [`ScratchLocation::release`] and otherwise logged.
#[derive(Error, Debug)]
#[error("failed to remove {}: {source}", .path.display())]
pub struct CleanupError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Uniquely named directory owning the files written into it.
#[derive(Debug)]
pub struct ScratchLocation {
    dir: PathBuf,
    files: Vec<PathBuf>,
    released: bool,
}

impl ScratchLocation {
    /// Create a fresh `zkyc-<uuid>` directory under `root`.
    ///
    /// `create_dir` (not `create_dir_all`) on the leaf fails if the name
    /// already exists, so a location is never shared.
    pub async fn create(root: &Path) -> io::Result<Self> {
        tokio::fs::create_dir_all(root).await?;
        let dir = root.join(format!("{SCRATCH_PREFIX}{}", Uuid::new_v4()));
        tokio::fs::create_dir(&dir).await?;
        tracing::debug!(dir = %dir.display(), "scratch location created");
        Ok(Self {
            dir,
            files: Vec::new(),
            released: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Files written so far, in write order.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Write `bytes` verbatim to `name` inside the location.
    ///
    /// The file is tracked before the write so a partial write is still
    /// removed on release.
    pub async fn write(&mut self, name: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        let path = self.dir.join(name);
        self.files.push(path.clone());
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    /// Remove files, then the directory. Reports the first hard failure.
    pub fn release(mut self) -> Result<(), CleanupError> {
        self.released = true;
        remove_all(&self.dir, &self.files)
    }
}

impl Drop for ScratchLocation {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = remove_all(&self.dir, &self.files) {
            tracing::warn!(error = %e, "scratch cleanup failed");
        }
    }
}

/// Files first, directory last. Already-removed entries and a directory
/// left non-empty by someone else are not errors.
fn remove_all(dir: &Path, files: &[PathBuf]) -> Result<(), CleanupError> {
    let mut first_error = None;

    for file in files {
        match std::fs::remove_file(file) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %file.display(), "scratch file already removed");
            }
            Err(source) => {
                if first_error.is_none() {
                    first_error = Some(CleanupError {
                        path: file.clone(),
                        source,
                    });
                }
            }
        }
    }

    match std::fs::remove_dir(dir) {
        Ok(()) => {
            tracing::debug!(dir = %dir.display(), "scratch location removed");
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(dir = %dir.display(), "scratch location already removed");
        }
        Err(source) => {
            if dir_has_entries(dir) {
                tracing::debug!(dir = %dir.display(), "scratch location not empty; leaving it");
            } else if first_error.is_none() {
                first_error = Some(CleanupError {
                    path: dir.to_path_buf(),
                    source,
                });
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn dir_has_entries(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}
