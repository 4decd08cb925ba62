//! Directory walker.
//!
//! [`walk`] checks that the traversal root can be opened and returns a lazy
//! iterator over the regular files below it. Flat mode lists only the
//! root's immediate children; recursive mode visits the whole subtree in
//! pre-order. An entry that cannot be read is yielded as an
//! [`FileError::EntryAccess`] and the walk continues with the next entry.
//!
//! Without `follow_symlinks`, a symlink to a regular file is still a
//! candidate, but symlinked directories are not descended into. A dangling
//! symlink is an entry error either way.
//!
//! Visit order is whatever the filesystem returns.

use std::path::{Path, PathBuf};

use catalog_harvest_core::result::FileError;
use chrono::{DateTime, Timelike, Utc};
use walkdir::WalkDir;

use crate::error::HarvestError;

/// A regular file discovered during traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    pub path: PathBuf,
    /// Last-modified time, truncated to whole seconds.
    pub modified: DateTime<Utc>,
    pub size: u64,
}

/// Lazy sequence of candidate files. Not restartable; call [`walk`] again
/// for a fresh traversal.
pub struct Walk {
    inner: walkdir::IntoIter,
}

/// Open `root` for traversal.
///
/// Fails with [`HarvestError::RootUnreadable`] if the root is missing, is
/// not a directory, or cannot be listed.
pub fn walk(root: &Path, recursive: bool, follow_symlinks: bool) -> Result<Walk, HarvestError> {
    let unreadable = |source: std::io::Error| HarvestError::RootUnreadable {
        path: root.to_path_buf(),
        source,
    };

    let metadata = std::fs::metadata(root).map_err(unreadable)?;
    if !metadata.is_dir() {
        return Err(unreadable(std::io::Error::other("not a directory")));
    }
    std::fs::read_dir(root).map_err(unreadable)?;

    let mut walker = WalkDir::new(root).min_depth(1).follow_links(follow_symlinks);
    if !recursive {
        walker = walker.max_depth(1);
    }

    Ok(Walk {
        inner: walker.into_iter(),
    })
}

impl Iterator for Walk {
    type Item = Result<CandidateFile, FileError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                    return Some(Err(FileError::EntryAccess {
                        path,
                        message: err.to_string(),
                    }));
                }
            };

            let file_type = entry.file_type();
            if file_type.is_symlink() {
                // Only reached when links are not followed.
                match std::fs::metadata(entry.path()) {
                    Ok(target) if target.is_file() => {
                        return Some(candidate(entry.path(), Ok(target)));
                    }
                    Ok(_) => continue,
                    Err(e) => return Some(candidate(entry.path(), Err(e.to_string()))),
                }
            }
            if !file_type.is_file() {
                continue;
            }

            let metadata = entry.metadata().map_err(|e| e.to_string());
            return Some(candidate(entry.path(), metadata));
        }
    }
}

fn candidate(
    path: &Path,
    metadata: Result<std::fs::Metadata, String>,
) -> Result<CandidateFile, FileError> {
    let access_error = |message: String| FileError::EntryAccess {
        path: path.to_path_buf(),
        message,
    };

    let metadata = metadata.map_err(access_error)?;
    let modified = metadata
        .modified()
        .map_err(|e| access_error(format!("no modification time: {}", e)))?;

    Ok(CandidateFile {
        path: path.to_path_buf(),
        modified: truncate_to_secs(DateTime::<Utc>::from(modified)),
        size: metadata.len(),
    })
}

/// Stores keep whole seconds; comparing at finer precision would make every
/// file look newer than its record.
pub fn truncate_to_secs(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_nanosecond(0).unwrap_or(ts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn tree() -> TempDir {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.xml"), "<a/>").unwrap();
        fs::write(tmp.path().join("b.xml"), "<b/>").unwrap();
        fs::create_dir_all(tmp.path().join("sub/deeper")).unwrap();
        fs::write(tmp.path().join("sub/c.xml"), "<c/>").unwrap();
        fs::write(tmp.path().join("sub/deeper/d.xml"), "<d/>").unwrap();
        tmp
    }

    fn names(walk: Walk) -> Vec<String> {
        let mut names: Vec<String> = walk
            .map(|r| r.unwrap())
            .map(|c| c.path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn flat_walk_lists_only_immediate_files() {
        let tmp = tree();
        let found = names(walk(tmp.path(), false, false).unwrap());
        assert_eq!(found, vec!["a.xml", "b.xml"]);
    }

    #[test]
    fn recursive_walk_visits_whole_subtree() {
        let tmp = tree();
        let found = names(walk(tmp.path(), true, false).unwrap());
        assert_eq!(found, vec!["a.xml", "b.xml", "c.xml", "d.xml"]);
    }

    #[test]
    fn candidate_carries_size_and_whole_second_mtime() {
        let tmp = tree();
        let files: Vec<CandidateFile> = walk(tmp.path(), false, false)
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        let a = files
            .iter()
            .find(|c| c.path.ends_with("a.xml"))
            .unwrap();
        assert_eq!(a.size, 4);
        assert_eq!(a.modified.nanosecond(), 0);
    }

    #[test]
    fn missing_root_is_run_level_error() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope");
        match walk(&missing, true, false) {
            Err(HarvestError::RootUnreadable { path, .. }) => assert_eq!(path, missing),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("walk of a missing root succeeded"),
        }
    }

    #[test]
    fn file_as_root_is_run_level_error() {
        let tmp = tree();
        let err = walk(&tmp.path().join("a.xml"), false, false).err().unwrap();
        assert!(matches!(err, HarvestError::RootUnreadable { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn broken_symlink_is_isolated_when_following_links() {
        let tmp = tree();
        std::os::unix::fs::symlink(tmp.path().join("gone.xml"), tmp.path().join("dangling.xml"))
            .unwrap();

        let results: Vec<_> = walk(tmp.path(), false, true).unwrap().collect();
        let errors = results.iter().filter(|r| r.is_err()).count();
        let files = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(errors, 1);
        assert_eq!(files, 2);
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_resolve_without_following_links() {
        let tmp = tree();
        std::os::unix::fs::symlink(tmp.path().join("sub/c.xml"), tmp.path().join("link.xml"))
            .unwrap();
        std::os::unix::fs::symlink(tmp.path().join("gone.xml"), tmp.path().join("dangling.xml"))
            .unwrap();
        std::os::unix::fs::symlink(tmp.path().join("sub"), tmp.path().join("sublink")).unwrap();

        let results: Vec<_> = walk(tmp.path(), false, false).unwrap().collect();
        let errors: Vec<_> = results.iter().filter_map(|r| r.as_ref().err()).collect();
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            errors[0],
            FileError::EntryAccess { path, .. } if path.ends_with("dangling.xml")
        ));

        let mut found: Vec<String> = results
            .iter()
            .filter_map(|r| r.as_ref().ok())
            .map(|c| c.path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        found.sort();
        assert_eq!(found, vec!["a.xml", "b.xml", "link.xml"]);
    }
}
