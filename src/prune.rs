// src/prune.rs

//! Retention pruning of product versions
//!
//! Two orthogonal policies operate against a stream. Quota retention keeps
//! the newest N complete versions of every cataloged product and removes the
//! rest of the referenced set, along with any incomplete version directory.
//! The dangling sweep removes version directories the catalog does not
//! reference, but only once their newest file has aged past a freshness
//! window, so uploads in progress are never swept away. Both finish by
//! clearing out directories the deletions emptied, and quota retention
//! republishes the catalog and index atomically.

use crate::error::{Error, Result};
use crate::publish::Publisher;
use crate::stream::{self, catalog::read_json_file, ProductCatalog, StreamIndex};
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// How fresh an unreferenced version must be to survive the dangling sweep
pub const DANGLING_FRESHNESS_WINDOW: Duration = Duration::from_secs(6 * 60 * 60);

/// Keep the newest `keep` complete versions of every product in the stream
///
/// Only versions referenced by the published catalog take part in the quota;
/// never-referenced complete versions are left to the dangling sweep.
/// Incomplete version directories are always removed. The updated catalog
/// and index are republished atomically afterwards.
pub fn prune_stream_product_versions(
    root_dir: &Path,
    stream_version: &str,
    stream_name: &str,
    keep: usize,
) -> Result<()> {
    if keep < 1 {
        return Err(Error::InvalidArg(
            "At least 1 product version must be retained".to_string(),
        ));
    }

    let catalog_rel_path = format!("streams/{}/{}.json", stream_version, stream_name);
    let catalog_path = root_dir.join(&catalog_rel_path);

    let Some(mut catalog) = read_json_file::<ProductCatalog>(&catalog_path)? else {
        // Nothing published for this stream yet.
        return Ok(());
    };

    let product_ids: Vec<String> = catalog.products.keys().cloned().collect();

    for id in product_ids {
        let product = &catalog.products[&id];
        let product_rel_path = format!("{}/{}", stream_name, product.rel_path());
        let product_path = root_dir.join(&product_rel_path);

        if !product_path.is_dir() {
            continue;
        }

        let on_disk = list_versions(&product_path, root_dir, &product_rel_path)?;

        // The quota applies to referenced complete versions, newest first.
        let kept: BTreeSet<&String> = on_disk
            .iter()
            .filter(|v| v.complete && product.versions.contains_key(&v.name))
            .rev()
            .take(keep)
            .map(|v| &v.name)
            .collect();

        let mut removed = Vec::new();

        for version in &on_disk {
            let referenced = product.versions.contains_key(&version.name);

            let prune = if !version.complete {
                true
            } else {
                referenced && !kept.contains(&version.name)
            };

            if !prune {
                continue;
            }

            std::fs::remove_dir_all(product_path.join(&version.name))?;
            info!(
                "Pruned version {:?} of product {:?} (stream {:?})",
                version.name, id, stream_name
            );

            if referenced {
                removed.push(version.name.clone());
            }
        }

        if let Some(product) = catalog.products.get_mut(&id) {
            for name in removed {
                product.versions.remove(&name);
            }
        }
    }

    prune_empty_dirs(root_dir.join(stream_name), true)?;

    // Republish the pruned catalog, then refresh its index entry.
    let index_path = root_dir
        .join("streams")
        .join(stream_version)
        .join("index.json");

    let mut index = read_json_file::<StreamIndex>(&index_path)?.unwrap_or_default();
    index.add_entry(stream_name, &catalog_rel_path, &catalog);

    let mut publisher = Publisher::new();
    publisher.stage_json(&catalog_path, &catalog)?;
    publisher.stage_json(&index_path, &index)?;
    publisher.commit()
}

/// Remove version directories the catalog does not reference
///
/// A version survives while its youngest file is younger than `window`,
/// which protects uploads still in progress. A catalog without any products
/// disables the sweep entirely.
pub fn prune_dangling_product_versions(
    root_dir: &Path,
    stream_version: &str,
    stream_name: &str,
    window: Duration,
) -> Result<()> {
    let catalog_path = root_dir
        .join("streams")
        .join(stream_version)
        .join(format!("{}.json", stream_name));

    let Some(catalog) = read_json_file::<ProductCatalog>(&catalog_path)? else {
        return Ok(());
    };

    if catalog.products.is_empty() {
        debug!(
            "Product catalog for stream {:?} is empty, skipping dangling sweep",
            stream_name
        );
        return Ok(());
    }

    let stream_path = root_dir.join(stream_name);
    let now = SystemTime::now();

    for product_rel_path in list_product_dirs(&stream_path, root_dir)? {
        let parts = match stream::parse_product_path(&product_rel_path) {
            Ok(parts) => parts,
            Err(_) => continue,
        };

        let id = format!("{}:{}:{}:{}", parts[1], parts[2], parts[3], parts[4]);
        let referenced = catalog.products.get(&id);

        let product_path = root_dir.join(&product_rel_path);

        for entry in std::fs::read_dir(&product_path)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();

            if !entry.file_type()?.is_dir() || name.starts_with('.') {
                continue;
            }

            if referenced.is_some_and(|p| p.versions.contains_key(&name)) {
                continue;
            }

            let age = now
                .duration_since(youngest_mtime(&entry.path())?)
                .unwrap_or(Duration::ZERO);

            if age < window {
                debug!(
                    "Unreferenced version {:?} of product {:?} is still fresh, keeping",
                    name, id
                );
                continue;
            }

            std::fs::remove_dir_all(entry.path())?;
            info!(
                "Pruned dangling version {:?} of product {:?} (stream {:?})",
                name, id, stream_name
            );
        }
    }

    prune_empty_dirs(stream_path, true)
}

/// Remove every directory beneath `root` that holds no files, bottom-up
///
/// The input path is cleaned lexically first. When `keep_root` is set the
/// root directory itself survives even if empty. Symlinks are never
/// followed.
pub fn prune_empty_dirs<P: AsRef<Path>>(root: P, keep_root: bool) -> Result<()> {
    let root = clean_path(root.as_ref());

    match std::fs::symlink_metadata(&root) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => return Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err.into()),
    }

    for entry in WalkDir::new(&root).follow_links(false).contents_first(true) {
        let entry = entry.map_err(|err| Error::Io(err.into()))?;

        if !entry.file_type().is_dir() {
            continue;
        }

        if entry.depth() == 0 && keep_root {
            continue;
        }

        if std::fs::read_dir(entry.path())?.next().is_none() {
            std::fs::remove_dir(entry.path())?;
        }
    }

    Ok(())
}

/// A version directory found on disk during pruning
struct OnDiskVersion {
    name: String,
    complete: bool,
}

/// List version directories of a product, oldest first, with completeness
///
/// Discovery here is deliberately lenient: incomplete versions are included
/// so the caller can treat them as prune candidates.
fn list_versions(
    product_path: &Path,
    root_dir: &Path,
    product_rel_path: &str,
) -> Result<Vec<OnDiskVersion>> {
    let mut versions = Vec::new();

    for entry in std::fs::read_dir(product_path)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();

        if !entry.file_type()?.is_dir() || name.starts_with('.') {
            continue;
        }

        let version_rel_path = format!("{}/{}", product_rel_path, name);

        let complete = match stream::get_version(root_dir, &version_rel_path, false) {
            Ok(_) => true,
            Err(Error::VersionIncomplete(_)) => false,
            Err(err @ Error::InvalidImageConfig { .. }) => {
                // Cannot judge the version; err on the side of keeping it.
                warn!("{}", err);
                true
            }
            Err(err) => return Err(err),
        };

        versions.push(OnDiskVersion { name, complete });
    }

    versions.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(versions)
}

/// Repository-relative paths of all product-shaped directories in a stream
fn list_product_dirs(stream_path: &Path, root_dir: &Path) -> Result<Vec<String>> {
    let mut dirs = Vec::new();

    let walker = WalkDir::new(stream_path)
        .follow_links(false)
        .min_depth(4)
        .max_depth(4)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));

    for entry in walker {
        let entry = entry.map_err(|err| Error::Io(err.into()))?;
        if !entry.file_type().is_dir() {
            continue;
        }

        if let Ok(rel) = entry.path().strip_prefix(root_dir) {
            dirs.push(rel.to_string_lossy().to_string());
        }
    }

    Ok(dirs)
}

/// Modification time of the youngest file within a version directory
///
/// Falls back to the directory's own mtime when it holds no files.
fn youngest_mtime(dir: &Path) -> Result<SystemTime> {
    let mut youngest: Option<SystemTime> = None;

    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry.map_err(|err| Error::Io(err.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let modified = entry.metadata().map_err(|err| Error::Io(err.into()))?.modified()?;
        if youngest.map_or(true, |y| modified > y) {
            youngest = Some(modified);
        }
    }

    match youngest {
        Some(time) => Ok(time),
        None => Ok(std::fs::metadata(dir)?.modified()?),
    }
}

/// Lexically normalize a path: resolve `.` and `..`, drop duplicate
/// separators
fn clean_path(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    let mut depth = 0usize;
    let absolute = path.has_root();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if depth > 0 {
                    cleaned.pop();
                    depth -= 1;
                } else if !absolute {
                    cleaned.push("..");
                }
            }
            other => {
                cleaned.push(other.as_os_str());
                if matches!(other, Component::Normal(_)) {
                    depth += 1;
                }
            }
        }
    }

    if cleaned.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_path() {
        assert_eq!(clean_path(Path::new("a/./b")), PathBuf::from("a/b"));
        assert_eq!(clean_path(Path::new("a/../b")), PathBuf::from("b"));
        assert_eq!(clean_path(Path::new("//a///b//")), PathBuf::from("/a/b"));
        assert_eq!(clean_path(Path::new("/..")), PathBuf::from("/"));
        assert_eq!(clean_path(Path::new("../a/..")), PathBuf::from(".."));
        assert_eq!(clean_path(Path::new("a/..")), PathBuf::from("."));
        assert_eq!(
            clean_path(Path::new("root/child/../../root/child/../child")),
            PathBuf::from("root/child")
        );
    }

    #[test]
    fn test_prune_empty_dirs_keeps_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("root/a/b/c")).unwrap();
        std::fs::create_dir_all(dir.path().join("root/x")).unwrap();
        std::fs::write(dir.path().join("root/x/file"), b"").unwrap();

        prune_empty_dirs(dir.path().join("root"), true).unwrap();

        assert!(!dir.path().join("root/a").exists());
        assert!(dir.path().join("root/x/file").exists());
        assert!(dir.path().join("root").exists());
    }

    #[test]
    fn test_prune_empty_dirs_removes_root_when_allowed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("root/child")).unwrap();

        prune_empty_dirs(dir.path().join("root"), false).unwrap();
        assert!(!dir.path().join("root").exists());
    }

    #[test]
    fn test_prune_empty_dirs_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        prune_empty_dirs(dir.path().join("absent"), true).unwrap();
    }

    #[test]
    fn test_youngest_mtime_prefers_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("v/sub")).unwrap();
        std::fs::write(dir.path().join("v/sub/file"), b"x").unwrap();

        let mtime = youngest_mtime(&dir.path().join("v")).unwrap();
        let file_mtime = std::fs::metadata(dir.path().join("v/sub/file"))
            .unwrap()
            .modified()
            .unwrap();
        assert_eq!(mtime, file_mtime);
    }
}
