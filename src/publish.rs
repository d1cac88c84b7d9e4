// src/publish.rs

//! Atomic publication of catalogs and the index
//!
//! Every document is first written to a hidden `.name.tmp` file in its final
//! directory, then renamed into place. Renames run in staging order and the
//! index is always staged last, so a reader can never observe an index entry
//! pointing at a catalog that does not exist yet. Same-directory renames are
//! atomic on POSIX filesystems; staging into another directory would lose
//! that guarantee.

use crate::error::{Error, Result};
use crate::stream::catalog;
use serde::Serialize;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File mode applied to published documents
const PUBLISH_MODE: u32 = 0o644;

/// A staged temporary file and its final destination
struct Replace {
    temp: PathBuf,
    dest: PathBuf,
}

/// Collects staged documents and renames them into place on commit
///
/// Dropping the publisher before (or during a failed) commit removes every
/// temporary file that has not been renamed yet.
#[derive(Default)]
pub struct Publisher {
    replaces: Vec<Replace>,
}

impl Publisher {
    /// Create an empty publisher
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize `value` to a hidden temporary file next to `dest`
    pub fn stage_json<T: Serialize>(&mut self, dest: &Path, value: &T) -> Result<()> {
        let file_name = dest
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| Error::Publish {
                path: dest.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "no file name"),
            })?;

        let temp = dest.with_file_name(format!(".{}.tmp", file_name));
        let content = catalog::to_json_vec(value)?;

        fs::write(&temp, content).map_err(|source| Error::Publish {
            path: temp.clone(),
            source,
        })?;

        debug!("Staged {:?} for {:?}", temp, dest);

        self.replaces.push(Replace {
            temp,
            dest: dest.to_path_buf(),
        });

        Ok(())
    }

    /// Rename all staged files into place, in staging order
    ///
    /// Published files get mode 0644. On failure, files renamed so far stay
    /// in place and the remaining temporaries are removed.
    pub fn commit(mut self) -> Result<()> {
        while !self.replaces.is_empty() {
            let replace = self.replaces.remove(0);

            fs::rename(&replace.temp, &replace.dest).map_err(|source| Error::Publish {
                path: replace.dest.clone(),
                source,
            })?;

            fs::set_permissions(&replace.dest, fs::Permissions::from_mode(PUBLISH_MODE)).map_err(
                |source| Error::Publish {
                    path: replace.dest.clone(),
                    source,
                },
            )?;

            debug!("Published {:?}", replace.dest);
        }

        Ok(())
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        for replace in &self.replaces {
            let _ = fs::remove_file(&replace.temp);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stage_and_commit() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("images.json");

        let mut publisher = Publisher::new();
        publisher.stage_json(&dest, &json!({"format": "products:1.0"})).unwrap();

        // Staged but not yet visible under the final name.
        assert!(!dest.exists());
        assert!(dir.path().join(".images.json.tmp").exists());

        publisher.commit().unwrap();

        assert!(dest.exists());
        assert!(!dir.path().join(".images.json.tmp").exists());

        let mode = fs::metadata(&dest).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, PUBLISH_MODE);

        let content = fs::read_to_string(&dest).unwrap();
        assert!(content.ends_with('\n'));
    }

    #[test]
    fn test_commit_order_is_staging_order() {
        let dir = tempfile::tempdir().unwrap();
        let catalog_dest = dir.path().join("images.json");
        let index_dest = dir.path().join("index.json");

        let mut publisher = Publisher::new();
        publisher.stage_json(&catalog_dest, &json!({})).unwrap();
        publisher.stage_json(&index_dest, &json!({})).unwrap();
        publisher.commit().unwrap();

        let catalog_mtime = fs::metadata(&catalog_dest).unwrap().modified().unwrap();
        let index_mtime = fs::metadata(&index_dest).unwrap().modified().unwrap();
        assert!(catalog_mtime <= index_mtime);
    }

    #[test]
    fn test_drop_removes_staged_files() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("images.json");

        {
            let mut publisher = Publisher::new();
            publisher.stage_json(&dest, &json!({})).unwrap();
            assert!(dir.path().join(".images.json.tmp").exists());
        }

        assert!(!dir.path().join(".images.json.tmp").exists());
        assert!(!dest.exists());
    }
}
