// src/stream/product.rs

//! Product discovery and path schema validation
//!
//! A product lives at `stream/distro/release/architecture/variant` under the
//! repository root; anything that does not split into exactly those five
//! components is not a product. Version directories sit directly below the
//! product directory, named so that alphabetical order is build order.

use crate::error::{Error, Result};
use crate::stream::version::{self, ImageConfig, Version};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::warn;
use walkdir::WalkDir;

/// Number of path components identifying a product, stream included
const PRODUCT_PATH_COMPONENTS: usize = 5;

/// Expected shape of a product path, used in error messages
const PRODUCT_PATH_FORMAT: &str = "stream/distribution/release/architecture/variant";

/// A single image with all of its discovered versions
///
/// Field order matches the serialized catalog format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Comma-joined list of aliases the product can be referenced by
    pub aliases: String,

    /// Architecture the image was built for, e.g. `amd64`
    #[serde(rename = "arch")]
    pub architecture: String,

    /// Name of the image distribution
    #[serde(rename = "os")]
    pub distro: String,

    /// Name of the image release
    pub release: String,

    /// Pretty display name of the release
    pub release_title: String,

    /// Name of the image variant
    pub variant: String,

    /// Versions keyed by version name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub versions: BTreeMap<String, Version>,

    /// Configuration requirements the image needs to work
    #[serde(default)]
    pub requirements: BTreeMap<String, String>,
}

impl Product {
    /// The product ID, `distro:release:architecture:variant`
    pub fn id(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.distro, self.release, self.architecture, self.variant
        )
    }

    /// The product's path relative to the stream directory
    pub fn rel_path(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.distro, self.release, self.architecture, self.variant
        )
    }
}

/// Split a stream-relative product path into its
/// `(stream, distro, release, architecture, variant)` components
pub fn parse_product_path(product_rel_path: &str) -> Result<[&str; PRODUCT_PATH_COMPONENTS]> {
    let parts: Vec<&str> = product_rel_path
        .split('/')
        .filter(|p| !p.is_empty())
        .collect();

    if parts.len() != PRODUCT_PATH_COMPONENTS {
        return Err(Error::InvalidProductPath {
            path: product_rel_path.to_string(),
            reason: format!("does not match the required format {:?}", PRODUCT_PATH_FORMAT),
        });
    }

    Ok([parts[0], parts[1], parts[2], parts[3], parts[4]])
}

/// Read the product on the given path, including all of its versions
///
/// Versions are scanned in ascending name order. Incomplete versions are
/// skipped silently; versions with an unparsable `image.yaml` are skipped
/// with a warning. The alphabetically-last version carrying an image config
/// supplies the product requirements and extra release aliases.
pub fn get_product(root_dir: &Path, product_rel_path: &str) -> Result<Product> {
    let [_, distro, release, architecture, variant] = parse_product_path(product_rel_path)?;

    let product_path = root_dir.join(product_rel_path);
    let metadata = std::fs::metadata(&product_path).map_err(|err| Error::InvalidProductPath {
        path: product_rel_path.to_string(),
        reason: err.to_string(),
    })?;

    if !metadata.is_dir() {
        return Err(Error::InvalidProductPath {
            path: product_rel_path.to_string(),
            reason: "not a directory".to_string(),
        });
    }

    let mut product = Product {
        distro: distro.to_string(),
        release: release.to_string(),
        architecture: architecture.to_string(),
        variant: variant.to_string(),
        ..Default::default()
    };

    // Sorted scan keeps the config merge deterministic: the config of the
    // alphabetically-last version wins.
    let mut version_names = Vec::new();
    for entry in std::fs::read_dir(&product_path)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();

        if entry.file_type()?.is_dir() && !name.starts_with('.') {
            version_names.push(name);
        }
    }
    version_names.sort();

    let mut config: Option<ImageConfig> = None;

    for name in version_names {
        let version_rel_path = format!("{}/{}", product_rel_path, name);

        let version = match version::get_version(root_dir, &version_rel_path, false) {
            Ok(v) => v,
            Err(Error::VersionIncomplete(_)) => continue,
            Err(err @ Error::InvalidImageConfig { .. }) => {
                warn!("Skipping version {:?}: {}", version_rel_path, err);
                continue;
            }
            Err(err) => return Err(err),
        };

        if version.image_config.is_some() {
            config = version.image_config.clone();
        }

        product.versions.insert(name, version);
    }

    product.aliases = assemble_aliases(&product, config.as_ref());

    if let Some(config) = config {
        product.requirements = config.requirements;
    }

    Ok(product)
}

/// Build the comma-joined alias string for a product
///
/// Every product gets `distro/release/variant` (plus the shorter
/// `distro/release` when the variant is `default`); each release alias from
/// the image config adds the same pair with the release swapped out.
fn assemble_aliases(product: &Product, config: Option<&ImageConfig>) -> String {
    let mut aliases = vec![format!(
        "{}/{}/{}",
        product.distro, product.release, product.variant
    )];

    if product.variant == "default" {
        aliases.push(format!("{}/{}", product.distro, product.release));
    }

    if let Some(config) = config {
        for (release, extra) in &config.release_aliases {
            if release != &product.release {
                continue;
            }

            for alias in extra.split(',') {
                // Spaces are not allowed in aliases.
                let alias = alias.replace(' ', "");
                if alias.is_empty() {
                    continue;
                }

                aliases.push(format!("{}/{}/{}", product.distro, alias, product.variant));

                if product.variant == "default" {
                    aliases.push(format!("{}/{}", product.distro, alias));
                }
            }
        }
    }

    aliases.join(",")
}

/// Discover all products under the given stream directory
///
/// Every directory whose repository-relative path matches the product schema
/// is taken as a product; paths that do not parse are ignored, as are hidden
/// directories and products without a single complete version.
pub fn get_products(root_dir: &Path, stream_name: &str) -> Result<BTreeMap<String, Product>> {
    let stream_path = root_dir.join(stream_name);
    let mut products = BTreeMap::new();

    let walker = WalkDir::new(&stream_path)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !e
                    .file_name()
                    .to_string_lossy()
                    .starts_with('.')
        });

    for entry in walker {
        let entry = entry.map_err(|err| Error::Io(err.into()))?;
        if !entry.file_type().is_dir() {
            continue;
        }

        let rel_path = match entry.path().strip_prefix(root_dir) {
            Ok(rel) => rel.to_string_lossy().to_string(),
            Err(_) => continue,
        };

        let product = match get_product(root_dir, &rel_path) {
            Ok(p) => p,
            Err(Error::InvalidProductPath { .. }) => continue,
            Err(err) => return Err(err),
        };

        if product.versions.is_empty() {
            continue;
        }

        products.insert(product.id(), product);
    }

    Ok(products)
}
