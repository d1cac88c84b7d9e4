// tests/common/mod.rs

//! Shared fixtures for integration tests: mock product trees and catalogs.

#![allow(dead_code)]

use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};
use streamkeeper::stream::{self, ProductCatalog, StreamIndex};
use streamkeeper::Publisher;

/// Payload written into every mock item file (12 bytes, like real tests
/// hash a fixed-size blob)
pub const DEFAULT_CONTENT: &[u8] = b"streamkeeper";

/// Hex SHA-256 of [`DEFAULT_CONTENT`]
pub fn default_content_sha() -> String {
    format!("{:x}", Sha256::digest(DEFAULT_CONTENT))
}

/// Hex SHA-256 of [`DEFAULT_CONTENT`] concatenated with itself, which is the
/// combined metadata+rootfs hash of any two default-content files
pub fn combined_default_sha() -> String {
    let mut hasher = Sha256::new();
    hasher.update(DEFAULT_CONTENT);
    hasher.update(DEFAULT_CONTENT);
    format!("{:x}", hasher.finalize())
}

/// Check whether the external delta tool is runnable; delta-dependent tests
/// skip themselves when it is not.
pub fn delta_tool_available() -> bool {
    Command::new("xdelta3")
        .arg("-V")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

/// A version directory to create within a mock product
#[derive(Clone)]
pub struct MockVersion {
    name: String,
    files: Vec<String>,
    checksum_lines: Vec<String>,
}

impl MockVersion {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            files: Vec::new(),
            checksum_lines: Vec::new(),
        }
    }

    /// Add item files holding [`DEFAULT_CONTENT`]
    pub fn with_files(mut self, files: &[&str]) -> Self {
        self.files.extend(files.iter().map(|f| f.to_string()));
        self
    }

    /// Write a `SHA256SUMS` file with the given raw lines
    pub fn with_checksums(mut self, lines: &[String]) -> Self {
        self.checksum_lines = lines.to_vec();
        self
    }
}

enum MockOp {
    Versions(Vec<MockVersion>),
    Catalog,
}

/// Builder for an on-disk product tree, optionally snapshotting the product
/// catalog between steps (so later versions stay unreferenced by it)
pub struct MockProduct {
    rel_path: String,
    ops: Vec<MockOp>,
}

impl MockProduct {
    pub fn new(rel_path: &str) -> Self {
        Self {
            rel_path: rel_path.to_string(),
            ops: Vec::new(),
        }
    }

    pub fn add_versions(mut self, versions: Vec<MockVersion>) -> Self {
        self.ops.push(MockOp::Versions(versions));
        self
    }

    /// Publish a catalog and index reflecting the versions created so far
    pub fn add_product_catalog(mut self) -> Self {
        self.ops.push(MockOp::Catalog);
        self
    }

    /// Stream directory name (first path component)
    pub fn stream_name(&self) -> &str {
        self.rel_path.split('/').next().unwrap()
    }

    /// Product path relative to the repository root
    pub fn rel_path(&self) -> &str {
        &self.rel_path
    }

    /// Product ID derived from the path components
    pub fn product_id(&self) -> String {
        self.rel_path
            .split('/')
            .skip(1)
            .collect::<Vec<_>>()
            .join(":")
    }

    /// Materialize the mock under the given repository root
    pub fn create(&self, root: &Path) {
        let product_dir = root.join(&self.rel_path);
        fs::create_dir_all(&product_dir).unwrap();

        for op in &self.ops {
            match op {
                MockOp::Versions(versions) => {
                    for version in versions {
                        let dir = product_dir.join(&version.name);
                        fs::create_dir_all(&dir).unwrap();

                        for file in &version.files {
                            fs::write(dir.join(file), DEFAULT_CONTENT).unwrap();
                        }

                        if !version.checksum_lines.is_empty() {
                            fs::write(
                                dir.join("SHA256SUMS"),
                                version.checksum_lines.join("\n") + "\n",
                            )
                            .unwrap();
                        }
                    }
                }
                MockOp::Catalog => self.write_catalog(root),
            }
        }
    }

    /// Publish a catalog and index for the current on-disk state, without
    /// running the full build pipeline (no hashes, no deltas)
    fn write_catalog(&self, root: &Path) {
        let stream_name = self.stream_name();
        let products = stream::get_products(root, stream_name).unwrap();
        let catalog = ProductCatalog::new(products);

        fs::create_dir_all(root.join("streams/v1")).unwrap();

        let catalog_rel_path = format!("streams/v1/{}.json", stream_name);
        let mut index = StreamIndex::new();
        index.add_entry(stream_name, &catalog_rel_path, &catalog);

        let mut publisher = Publisher::new();
        publisher
            .stage_json(&root.join(&catalog_rel_path), &catalog)
            .unwrap();
        publisher
            .stage_json(&root.join("streams/v1/index.json"), &index)
            .unwrap();
        publisher.commit().unwrap();
    }
}

/// Version names present in the published catalog for the given product
pub fn catalog_versions(root: &Path, stream_name: &str, product_id: &str) -> Vec<String> {
    let catalog: ProductCatalog = stream::catalog::read_json_file(
        &root.join(format!("streams/v1/{}.json", stream_name)),
    )
    .unwrap()
    .expect("catalog file must exist");

    catalog
        .products
        .get(product_id)
        .map(|p| p.versions.keys().cloned().collect())
        .unwrap_or_default()
}

/// Version directory names present on disk for the given product
pub fn disk_versions(root: &Path, product_rel_path: &str) -> Vec<String> {
    let dir = root.join(product_rel_path);
    if !dir.is_dir() {
        return Vec::new();
    }

    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().unwrap().is_dir())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}
