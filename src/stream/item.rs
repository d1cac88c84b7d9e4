// src/stream/item.rs

//! Version items and file classification
//!
//! Every recognized file in a version directory becomes an [`Item`] in the
//! product catalog. The item type is derived from the file name: known
//! extensions map to the closed set of simplestream file types, delta files
//! additionally encode the version they were computed from, and anything
//! else is tagged with its own file name (which is how the metadata tarball
//! itself is typed).

use crate::error::Result;
use crate::hash;
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Name of the metadata tarball required in every complete version
pub const FILE_METADATA: &str = "lxd.tar.xz";

/// Name of the optional root tarball (combined-hash input only)
pub const FILE_ROOT_TARBALL: &str = "root.tar.xz";

/// File extensions that make a file part of the product version
const ALLOWED_EXTENSIONS: [&str; 5] = [".tar.xz", ".squashfs", ".vcdiff", ".qcow2", ".qcow2.vcdiff"];

/// Check whether a file name carries one of the recognized item extensions
pub fn has_allowed_extension(name: &str) -> bool {
    ALLOWED_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

/// Type of the file an item holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemType {
    /// LXD metadata tarball
    Metadata,
    /// Container root file system (squashfs)
    Squashfs,
    /// Container root file system delta (VCDiff)
    SquashfsDelta,
    /// VM root file system (qcow2)
    DiskKvm,
    /// VM root file system delta (VCDiff)
    DiskKvmDelta,
    /// Root file system as a tarball
    RootTarXz,
    /// No recognized type; the tag equals the file name
    Other(String),
}

impl ItemType {
    /// The catalog `ftype` string for this type
    pub fn as_str(&self) -> &str {
        match self {
            ItemType::Metadata => "lxd.tar.xz",
            ItemType::Squashfs => "squashfs",
            ItemType::SquashfsDelta => "squashfs.vcdiff",
            ItemType::DiskKvm => "disk-kvm.img",
            ItemType::DiskKvmDelta => "disk-kvm.img.vcdiff",
            ItemType::RootTarXz => "root.tar.xz",
            ItemType::Other(name) => name,
        }
    }

    /// Check whether this is one of the delta (VCDiff) types
    pub fn is_delta(&self) -> bool {
        matches!(self, ItemType::SquashfsDelta | ItemType::DiskKvmDelta)
    }

    /// Check whether this is a root filesystem that delta generation targets
    pub fn is_delta_source(&self) -> bool {
        matches!(self, ItemType::Squashfs | ItemType::DiskKvm)
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<String> for ItemType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "lxd.tar.xz" => ItemType::Metadata,
            "squashfs" => ItemType::Squashfs,
            "squashfs.vcdiff" => ItemType::SquashfsDelta,
            "disk-kvm.img" => ItemType::DiskKvm,
            "disk-kvm.img.vcdiff" => ItemType::DiskKvmDelta,
            "root.tar.xz" => ItemType::RootTarXz,
            _ => ItemType::Other(s),
        }
    }
}

impl Serialize for ItemType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ItemType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Ok(ItemType::from(String::deserialize(deserializer)?))
    }
}

/// Classify a file name into its item type
///
/// For delta files the name of the version the delta was computed from is
/// extracted from the file name and returned alongside the type.
pub fn classify_item(name: &str) -> (ItemType, Option<String>) {
    if name.ends_with(".squashfs") {
        return (ItemType::Squashfs, None);
    }

    if name.ends_with(".qcow2") {
        return (ItemType::DiskKvm, None);
    }

    if name.ends_with(".vcdiff") {
        // Delta names encode the source version: <prefix>.<version>.vcdiff
        // for containers and <prefix>.<version>.qcow2.vcdiff for VMs.
        let parts: Vec<&str> = name.split('.').collect();

        if name.ends_with(".qcow2.vcdiff") {
            let base = parts.len().checked_sub(3).map(|i| parts[i].to_string());
            return (ItemType::DiskKvmDelta, base);
        }

        let base = parts.len().checked_sub(2).map(|i| parts[i].to_string());
        return (ItemType::SquashfsDelta, base);
    }

    match name {
        FILE_METADATA => (ItemType::Metadata, None),
        FILE_ROOT_TARBALL => (ItemType::RootTarXz, None),
        _ => (ItemType::Other(name.to_string()), None),
    }
}

/// A file within a product version
///
/// Field order matches the serialized catalog format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Name of the file (not serialized; items are keyed by name)
    #[serde(skip)]
    pub name: String,

    /// Type tag of the file
    pub ftype: ItemType,

    /// Path of the file relative to the repository root
    pub path: String,

    /// Size of the file in bytes
    pub size: u64,

    /// SHA-256 hash of the file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,

    /// Combined SHA-256 of the metadata tarball and the VM root filesystem.
    /// Set only on the metadata item when both files exist in the version.
    #[serde(
        rename = "combined_disk-kvm-img_sha256",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub combined_sha256_disk_kvm_img: Option<String>,

    /// Combined SHA-256 of the metadata tarball and the container root
    /// filesystem. Set only on the metadata item when both files exist.
    #[serde(
        rename = "combined_squashfs_sha256",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub combined_sha256_squashfs: Option<String>,

    /// Combined SHA-256 of the metadata tarball and the root tarball.
    /// Set only on the metadata item when both files exist.
    #[serde(
        rename = "combined_rootxz_sha256",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub combined_sha256_root_xz: Option<String>,

    /// Version the delta file was computed from. Set only on delta items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta_base: Option<String>,
}

/// Read item metadata for the file on the given repository-relative path
///
/// The file's hash is calculated only when `calc_hash` is set; discovery
/// passes skip it and the build pipeline re-reads the version with hashes
/// enabled once its delta files exist.
pub fn get_item(root_dir: &Path, item_rel_path: &str, calc_hash: bool) -> Result<Item> {
    let item_path = root_dir.join(item_rel_path);
    let metadata = std::fs::metadata(&item_path)?;

    let name = item_rel_path
        .rsplit('/')
        .next()
        .unwrap_or(item_rel_path)
        .to_string();

    let sha256 = if calc_hash {
        Some(hash::hash_file(&item_path)?)
    } else {
        None
    };

    let (ftype, delta_base) = classify_item(&name);

    Ok(Item {
        name,
        ftype,
        path: item_rel_path.to_string(),
        size: metadata.len(),
        sha256,
        combined_sha256_disk_kvm_img: None,
        combined_sha256_squashfs: None,
        combined_sha256_root_xz: None,
        delta_base,
    })
}
