// src/stream/catalog.rs

//! Product catalog and stream index
//!
//! The catalog is the `products:1.0` JSON document served to simplestream
//! clients for one stream; the index is the `index:1.0` document listing all
//! catalogs. Both use sorted maps throughout so that emission is
//! deterministic: parsing a catalog this tool wrote and re-emitting it is
//! byte-identical.

use crate::error::Result;
use crate::stream::product::Product;
use chrono::{SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::Path;

/// Catalog of all products within one stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductCatalog {
    /// Content identifier, e.g. `images`
    pub content_id: String,

    /// Format of the product catalog
    pub format: String,

    /// Data type of the product catalog
    #[serde(rename = "datatype")]
    pub data_type: String,

    /// Products keyed by product ID
    pub products: BTreeMap<String, Product>,
}

impl ProductCatalog {
    /// Create a catalog with the standard header fields
    pub fn new(products: BTreeMap<String, Product>) -> Self {
        Self {
            content_id: "images".to_string(),
            format: "products:1.0".to_string(),
            data_type: "image-downloads".to_string(),
            products,
        }
    }
}

/// Index of all published product catalogs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamIndex {
    /// Format of the index
    pub format: String,

    /// Index entries keyed by stream name
    pub index: BTreeMap<String, StreamIndexEntry>,
}

/// A single catalog reference within the index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamIndexEntry {
    /// Path of the catalog file relative to the repository root
    pub path: String,

    /// Format of the referenced catalog
    pub format: String,

    /// Data type of the referenced catalog
    pub datatype: String,

    /// RFC 3339 timestamp of the last index update
    pub updated: String,

    /// Sorted IDs of the products in the referenced catalog
    pub products: Vec<String>,
}

impl StreamIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self {
            format: "index:1.0".to_string(),
            index: BTreeMap::new(),
        }
    }

    /// Insert or replace the entry for a stream
    pub fn add_entry(&mut self, stream_name: &str, catalog_rel_path: &str, catalog: &ProductCatalog) {
        let entry = StreamIndexEntry {
            path: catalog_rel_path.to_string(),
            format: catalog.format.clone(),
            datatype: catalog.data_type.clone(),
            updated: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            products: catalog.products.keys().cloned().collect(),
        };

        self.index.insert(stream_name.to_string(), entry);
    }
}

impl Default for StreamIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Compare two product maps and return the difference between them
///
/// `added` holds products and versions present in `new_products` but not in
/// `old_products`; `removed` is symmetric. For a product present on both
/// sides, the returned entry carries the product metadata with only the
/// differing versions. Identity is `(product ID, version name)`; version
/// contents are not compared.
pub fn diff_products(
    old_products: &BTreeMap<String, Product>,
    new_products: &BTreeMap<String, Product>,
) -> (BTreeMap<String, Product>, BTreeMap<String, Product>) {
    (
        missing_from(new_products, old_products),
        missing_from(old_products, new_products),
    )
}

/// Products and versions present in `from` but absent in `base`
fn missing_from(
    base: &BTreeMap<String, Product>,
    from: &BTreeMap<String, Product>,
) -> BTreeMap<String, Product> {
    let mut missing = BTreeMap::new();

    for (id, product) in from {
        let Some(base_product) = base.get(id) else {
            missing.insert(id.clone(), product.clone());
            continue;
        };

        for (name, version) in &product.versions {
            if base_product.versions.contains_key(name) {
                continue;
            }

            missing
                .entry(id.clone())
                .or_insert_with(|| Product {
                    versions: BTreeMap::new(),
                    ..product.clone()
                })
                .versions
                .insert(name.clone(), version.clone());
        }
    }

    missing
}

/// Read a JSON document from disk, returning `None` when the file is absent
pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };

    Ok(Some(serde_json::from_str(&content)?))
}

/// Serialize a value as the pretty-printed JSON this tool publishes
pub fn to_json_vec<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut out = serde_json::to_vec_pretty(value)?;
    out.push(b'\n');

    Ok(out)
}
