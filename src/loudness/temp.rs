//! Scoped temporary files
//!
//! A `TempResourceScope` hands out uniquely named, empty files and deletes
//! every one of them when it goes out of scope, whatever path the caller took
//! to get there. Deletion is best effort: a file that is already gone, or
//! that cannot be removed, is logged and otherwise ignored.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tempfile::TempPath;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{RescueError, Result};

/// File name prefix for every temp resource this crate creates
pub const TEMP_PREFIX: &str = "podrescue-";

/// One ephemeral file owned by a scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempResource {
    path: PathBuf,
}

impl TempResource {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Owner of a set of temp resources
#[derive(Debug)]
pub struct TempResourceScope {
    dir: PathBuf,
    owned: Vec<TempPath>,
}

impl TempResourceScope {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            owned: Vec::new(),
        }
    }

    /// Create a new, empty file with the given suffix (e.g. ".wav")
    pub fn acquire(&mut self, suffix: &str) -> Result<TempResource> {
        let file = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(suffix)
            .tempfile_in(&self.dir)
            .map_err(|source| RescueError::TempResource {
                path: self.dir.clone(),
                source,
            })?;

        // Keep only the path; the handle is closed so external tools can write
        let temp_path = file.into_temp_path();
        let path = temp_path.to_path_buf();
        debug!(path = %path.display(), "acquired temp resource");
        self.owned.push(temp_path);
        Ok(TempResource { path })
    }

    /// Delete a resource now. Safe to call more than once.
    pub fn release(&mut self, resource: &TempResource) {
        if let Some(index) = self.owned.iter().position(|p| **p == *resource.path) {
            close_quietly(self.owned.swap_remove(index));
        }
    }

    /// Number of resources still owned
    pub fn len(&self) -> usize {
        self.owned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owned.is_empty()
    }
}

impl Drop for TempResourceScope {
    fn drop(&mut self) {
        for temp_path in self.owned.drain(..) {
            close_quietly(temp_path);
        }
    }
}

fn close_quietly(temp_path: TempPath) {
    let path = temp_path.to_path_buf();
    match temp_path.close() {
        Ok(()) => debug!(path = %path.display(), "released temp resource"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "could not delete temp resource"),
    }
}

/// Delete leftover temp resources older than `max_age` from a directory.
///
/// Only top-level files carrying our prefix are touched. Returns how many
/// files were removed.
pub fn sweep_orphans(dir: &Path, max_age: Duration) -> usize {
    let now = SystemTime::now();
    let mut removed = 0;

    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let is_ours = entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with(TEMP_PREFIX))
            .unwrap_or(false);
        if !is_ours {
            continue;
        }

        let age = entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or_default();

        if age >= max_age && fs::remove_file(entry.path()).is_ok() {
            removed += 1;
        }
    }

    if removed > 0 {
        debug!(removed, dir = %dir.display(), "swept orphaned temp resources");
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_acquire_creates_empty_file() {
        let dir = tempdir().unwrap();
        let mut scope = TempResourceScope::new(dir.path());
        let res = scope.acquire(".wav").unwrap();

        assert!(res.path().exists());
        assert_eq!(fs::metadata(res.path()).unwrap().len(), 0);
        assert!(res.path().to_string_lossy().ends_with(".wav"));
        assert_eq!(scope.len(), 1);
    }

    #[test]
    fn test_names_carry_prefix_and_suffix() {
        let dir = tempdir().unwrap();
        let mut scope = TempResourceScope::new(dir.path());
        let res = scope.acquire(".mp3").unwrap();
        let name = res.path().file_name().unwrap().to_string_lossy().into_owned();

        assert!(name.starts_with(TEMP_PREFIX));
        assert!(name.ends_with(".mp3"));
        assert_eq!(res.path().parent(), Some(dir.path()));
    }

    #[test]
    fn test_release_only_touches_own_resources() {
        let dir = tempdir().unwrap();
        let mut first = TempResourceScope::new(dir.path());
        let mut second = TempResourceScope::new(dir.path());
        let res = first.acquire(".wav").unwrap();

        second.release(&res);
        assert!(res.path().exists());
        first.release(&res);
        assert!(!res.path().exists());
    }

    #[test]
    fn test_paths_are_unique() {
        let dir = tempdir().unwrap();
        let mut scope = TempResourceScope::new(dir.path());
        let a = scope.acquire(".wav").unwrap();
        let b = scope.acquire(".wav").unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn test_release_is_idempotent() {
        let dir = tempdir().unwrap();
        let mut scope = TempResourceScope::new(dir.path());
        let res = scope.acquire(".wav").unwrap();

        scope.release(&res);
        assert!(!res.path().exists());
        scope.release(&res);
        assert!(scope.is_empty());
    }

    #[test]
    fn test_release_tolerates_externally_deleted_file() {
        let dir = tempdir().unwrap();
        let mut scope = TempResourceScope::new(dir.path());
        let res = scope.acquire(".wav").unwrap();
        fs::remove_file(res.path()).unwrap();
        scope.release(&res);
    }

    #[test]
    fn test_drop_releases_everything() {
        let dir = tempdir().unwrap();
        let paths: Vec<PathBuf> = {
            let mut scope = TempResourceScope::new(dir.path());
            vec![
                scope.acquire(".wav").unwrap().path().to_path_buf(),
                scope.acquire(".mp3").unwrap().path().to_path_buf(),
            ]
        };
        assert!(paths.iter().all(|p| !p.exists()));
    }

    #[test]
    fn test_drop_releases_on_error_path() {
        let dir = tempdir().unwrap();
        let mut leaked = None;
        let result: Result<()> = (|| {
            let mut scope = TempResourceScope::new(dir.path());
            leaked = Some(scope.acquire(".wav")?.path().to_path_buf());
            Err(RescueError::EmptyAudio)
        })();
        assert!(result.is_err());
        assert!(!leaked.unwrap().exists());
    }

    #[test]
    fn test_acquire_in_missing_dir_fails() {
        let dir = tempdir().unwrap();
        let mut scope = TempResourceScope::new(dir.path().join("missing"));
        assert!(matches!(
            scope.acquire(".wav"),
            Err(RescueError::TempResource { .. })
        ));
    }

    #[test]
    fn test_sweep_only_touches_prefixed_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(format!("{}stale.wav", TEMP_PREFIX)), b"x").unwrap();
        fs::write(dir.path().join("keep.wav"), b"x").unwrap();

        assert_eq!(sweep_orphans(dir.path(), Duration::ZERO), 1);
        assert!(dir.path().join("keep.wav").exists());
    }
}
