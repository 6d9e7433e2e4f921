//! Minimal file-write/delete seam the skeleton and code judges persist
//! artifacts through (§4.6 point 1, §4.7 judge step 1). Kept as a trait so
//! engine tests exercise the judges without touching the real filesystem,
//! and so the pipeline binary can root every write under one repository's
//! output directory (§6's "two pipeline instances must not share one").

use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to remove {path}: {source}")]
    Remove {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Writes and removes files rooted at some base directory, keyed by the
/// project-relative path carried in a `SkeletonFile`/`CodeFile`.
pub trait Workspace: Send + Sync {
    fn write(&self, relative_path: &str, contents: &str) -> Result<(), FsError>;
    fn remove(&self, relative_path: &str) -> Result<(), FsError>;
    /// Absolute path a written file would live at, for collaborators (the
    /// test runner, the compile check) that need a real path rather than
    /// going through this trait.
    fn resolve(&self, relative_path: &str) -> PathBuf;
}

/// A `Workspace` rooted at a real directory on disk.
pub struct RealWorkspace {
    base: PathBuf,
}

impl RealWorkspace {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        RealWorkspace { base: base.into() }
    }
}

impl Workspace for RealWorkspace {
    fn write(&self, relative_path: &str, contents: &str) -> Result<(), FsError> {
        let path = self.resolve(relative_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| FsError::Write {
                path: relative_path.to_string(),
                source,
            })?;
        }
        fs::write(&path, contents).map_err(|source| FsError::Write {
            path: relative_path.to_string(),
            source,
        })
    }

    fn remove(&self, relative_path: &str) -> Result<(), FsError> {
        let path = self.resolve(relative_path);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(FsError::Remove {
                path: relative_path.to_string(),
                source,
            }),
        }
    }

    fn resolve(&self, relative_path: &str) -> PathBuf {
        self.base.join(Path::new(relative_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_then_removes_a_nested_file() {
        let dir = tempfile::tempdir().unwrap();
        let ws = RealWorkspace::new(dir.path());
        ws.write("src/a.rs", "fn a() {}").unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("src/a.rs")).unwrap(), "fn a() {}");
        ws.remove("src/a.rs").unwrap();
        assert!(!dir.path().join("src/a.rs").exists());
    }

    #[test]
    fn removing_a_missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let ws = RealWorkspace::new(dir.path());
        assert!(ws.remove("never/written.rs").is_ok());
    }
}
