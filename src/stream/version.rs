// src/stream/version.rs

//! Version discovery and completeness validation
//!
//! A version directory is read into a [`Version`]: recognized files become
//! items, an optional `SHA256SUMS` file becomes the checksum map, and an
//! optional `image.yaml` contributes release aliases and requirements to the
//! owning product. A version is complete only when it holds the metadata
//! tarball plus at least one root filesystem (squashfs or qcow2); incomplete
//! versions are never surfaced in the catalog.

use crate::checksum;
use crate::error::{Error, Result};
use crate::hash;
use crate::stream::item::{self, Item, ItemType, FILE_METADATA};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Name of the checksum file holding SHA-256 digests
pub const FILE_CHECKSUMS: &str = "SHA256SUMS";

/// Name of the optional per-version image config file
pub const FILE_IMAGE_CONFIG: &str = "image.yaml";

/// Additional product information carried by a version's `image.yaml`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ImageConfig {
    /// Map of release name to a comma-delimited string of extra aliases
    #[serde(default)]
    pub release_aliases: BTreeMap<String, String>,

    /// Configuration requirements the image needs to work
    #[serde(default)]
    pub requirements: BTreeMap<String, String>,
}

/// `image.yaml` top-level structure; only the `simplestream` key is read
#[derive(Debug, Deserialize)]
struct ImageConfigFile {
    #[serde(default)]
    simplestream: Option<ImageConfig>,
}

/// A single build of a product
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Version {
    /// Parsed `SHA256SUMS` content, when the file exists
    #[serde(skip)]
    pub checksums: Option<BTreeMap<String, String>>,

    /// Parsed `image.yaml` content, when the file exists
    #[serde(skip)]
    pub image_config: Option<ImageConfig>,

    /// Items found within the version, keyed by file name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub items: BTreeMap<String, Item>,
}

/// Read a single version directory into a [`Version`]
///
/// Item hashes (including the combined metadata+rootfs hashes) are computed
/// only when `calc_hashes` is set. Fails with
/// [`Error::VersionIncomplete`] when the version lacks the metadata tarball
/// or a root filesystem, and with [`Error::InvalidImageConfig`] when the
/// version's `image.yaml` does not parse.
pub fn get_version(root_dir: &Path, version_rel_path: &str, calc_hashes: bool) -> Result<Version> {
    let version_path = root_dir.join(version_rel_path);
    let mut version = Version::default();

    for entry in std::fs::read_dir(&version_path)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().to_string();

        if item::has_allowed_extension(&name) {
            let item_rel_path = format!("{}/{}", version_rel_path, name);
            let item = item::get_item(root_dir, &item_rel_path, calc_hashes)?;
            version.items.insert(name, item);
        } else if name == FILE_CHECKSUMS {
            version.checksums = Some(checksum::read_checksum_file(&entry.path())?);
        } else if name == FILE_IMAGE_CONFIG {
            version.image_config = read_image_config(&entry.path())?;
        }
    }

    // The metadata item carries a combined hash against every rootfs flavor
    // present in the version. Seeing a squashfs or qcow2 sibling is also what
    // marks the version complete; a root tarball alone does not.
    let mut complete = false;

    if version.items.contains_key(FILE_METADATA) {
        let meta_path = version_path.join(FILE_METADATA);

        let companions: Vec<(String, ItemType)> = version
            .items
            .values()
            .filter(|i| {
                matches!(
                    i.ftype,
                    ItemType::Squashfs | ItemType::DiskKvm | ItemType::RootTarXz
                )
            })
            .map(|i| (i.name.clone(), i.ftype.clone()))
            .collect();

        for (name, ftype) in companions {
            let combined = if calc_hashes {
                Some(hash::hash_files(&[&meta_path, &version_path.join(&name)])?)
            } else {
                None
            };

            if let Some(meta) = version.items.get_mut(FILE_METADATA) {
                match ftype {
                    ItemType::DiskKvm => {
                        meta.combined_sha256_disk_kvm_img = combined;
                        complete = true;
                    }
                    ItemType::Squashfs => {
                        meta.combined_sha256_squashfs = combined;
                        complete = true;
                    }
                    ItemType::RootTarXz => {
                        meta.combined_sha256_root_xz = combined;
                    }
                    _ => {}
                }
            }
        }
    }

    if !complete {
        return Err(Error::VersionIncomplete(version_rel_path.to_string()));
    }

    Ok(version)
}

/// Parse the `simplestream` section of an `image.yaml` file
fn read_image_config(path: &Path) -> Result<Option<ImageConfig>> {
    let content = std::fs::read_to_string(path)?;

    let config: ImageConfigFile =
        serde_yaml::from_str(&content).map_err(|source| Error::InvalidImageConfig {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(config.simplestream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_version(dir: &Path, files: &[&str]) {
        fs::create_dir_all(dir).unwrap();
        for f in files {
            fs::write(dir.join(f), b"streamkeeper").unwrap();
        }
    }

    #[test]
    fn test_complete_version_with_both_rootfs() {
        let root = tempfile::tempdir().unwrap();
        let rel = "images/ubuntu/noble/amd64/cloud/2024_01_01";
        write_version(
            &root.path().join(rel),
            &["lxd.tar.xz", "rootfs.squashfs", "disk.qcow2", "root.tar.xz"],
        );

        let version = get_version(root.path(), rel, true).unwrap();
        assert_eq!(version.items.len(), 4);

        let meta = &version.items["lxd.tar.xz"];
        assert!(meta.combined_sha256_squashfs.is_some());
        assert!(meta.combined_sha256_disk_kvm_img.is_some());
        assert!(meta.combined_sha256_root_xz.is_some());

        // Combined hash covers metadata followed by the rootfs.
        let expected = hash::hash_files(&[
            root.path().join(rel).join("lxd.tar.xz"),
            root.path().join(rel).join("disk.qcow2"),
        ])
        .unwrap();
        assert_eq!(meta.combined_sha256_disk_kvm_img.as_deref(), Some(expected.as_str()));
    }

    #[test]
    fn test_metadata_alone_is_incomplete() {
        let root = tempfile::tempdir().unwrap();
        let rel = "images/ubuntu/noble/amd64/cloud/2024_01_01";
        write_version(&root.path().join(rel), &["lxd.tar.xz"]);

        assert!(matches!(
            get_version(root.path(), rel, false),
            Err(Error::VersionIncomplete(_))
        ));
    }

    #[test]
    fn test_root_tarball_does_not_complete() {
        let root = tempfile::tempdir().unwrap();
        let rel = "images/ubuntu/noble/amd64/cloud/2024_01_01";
        write_version(&root.path().join(rel), &["lxd.tar.xz", "root.tar.xz"]);

        assert!(matches!(
            get_version(root.path(), rel, false),
            Err(Error::VersionIncomplete(_))
        ));
    }

    #[test]
    fn test_rootfs_without_metadata_is_incomplete() {
        let root = tempfile::tempdir().unwrap();
        let rel = "images/ubuntu/noble/amd64/cloud/2024_01_01";
        write_version(&root.path().join(rel), &["rootfs.squashfs"]);

        assert!(matches!(
            get_version(root.path(), rel, false),
            Err(Error::VersionIncomplete(_))
        ));
    }

    #[test]
    fn test_no_hashes_without_calc() {
        let root = tempfile::tempdir().unwrap();
        let rel = "images/ubuntu/noble/amd64/cloud/2024_01_01";
        write_version(&root.path().join(rel), &["lxd.tar.xz", "disk.qcow2"]);

        let version = get_version(root.path(), rel, false).unwrap();
        assert!(version.items["disk.qcow2"].sha256.is_none());
        assert!(version.items["lxd.tar.xz"].combined_sha256_disk_kvm_img.is_none());
    }

    #[test]
    fn test_checksums_and_config_are_read() {
        let root = tempfile::tempdir().unwrap();
        let rel = "images/ubuntu/noble/amd64/cloud/2024_01_01";
        let dir = root.path().join(rel);
        write_version(&dir, &["lxd.tar.xz", "disk.qcow2"]);
        fs::write(dir.join("SHA256SUMS"), "aaaa  lxd.tar.xz\n").unwrap();
        fs::write(
            dir.join("image.yaml"),
            "simplestream:\n  release_aliases:\n    noble: \"24.04, lts\"\n  requirements:\n    secureboot: \"false\"\n",
        )
        .unwrap();

        let version = get_version(root.path(), rel, false).unwrap();

        let sums = version.checksums.unwrap();
        assert_eq!(sums.get("lxd.tar.xz").map(String::as_str), Some("aaaa"));

        let config = version.image_config.unwrap();
        assert_eq!(
            config.release_aliases.get("noble").map(String::as_str),
            Some("24.04, lts")
        );
        assert_eq!(
            config.requirements.get("secureboot").map(String::as_str),
            Some("false")
        );
    }

    #[test]
    fn test_invalid_image_config() {
        let root = tempfile::tempdir().unwrap();
        let rel = "images/ubuntu/noble/amd64/cloud/2024_01_01";
        let dir = root.path().join(rel);
        write_version(&dir, &["lxd.tar.xz", "disk.qcow2"]);
        fs::write(dir.join("image.yaml"), "simplestream: [unbalanced").unwrap();

        assert!(matches!(
            get_version(root.path(), rel, false),
            Err(Error::InvalidImageConfig { .. })
        ));
    }

    #[test]
    fn test_config_without_simplestream_key() {
        let root = tempfile::tempdir().unwrap();
        let rel = "images/ubuntu/noble/amd64/cloud/2024_01_01";
        let dir = root.path().join(rel);
        write_version(&dir, &["lxd.tar.xz", "disk.qcow2"]);
        fs::write(dir.join("image.yaml"), "other: true\n").unwrap();

        let version = get_version(root.path(), rel, false).unwrap();
        assert!(version.image_config.is_none());
    }
}
