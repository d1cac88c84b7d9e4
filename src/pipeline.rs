// src/pipeline.rs

//! The build pass: discovery, diff, per-version jobs, publication
//!
//! Each stream is compared against its previously published catalog; only
//! versions the catalog does not reference yet are processed. A fixed-size
//! worker pool runs one job per new version: generate deltas, hash all items
//! (deltas included), gate on the checksum file, then insert the version
//! into the catalog under a mutex. A failing job drops its version from this
//! build and never cancels siblings; the surviving result is published
//! atomically, catalogs first, index last.

use crate::cancel::CancelToken;
use crate::delta;
use crate::error::{Error, Result};
use crate::publish::Publisher;
use crate::checksum;
use crate::stream::{self, ProductCatalog, StreamIndex, Version};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;
use tracing::{error, info};

/// Options for a single build pass
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Stream version label under `streams/`, e.g. `v1`
    pub stream_version: String,

    /// Stream directories to build, relative to the repository root
    pub streams: Vec<String>,

    /// Number of concurrent version jobs
    pub workers: usize,
}

/// One unit of work: a new version of one product
struct VersionJob {
    product_id: String,
    /// Product path relative to the root, stream included
    product_rel_path: String,
    version_name: String,
}

/// Run a full build pass and publish the resulting catalogs and index
pub fn build_index(cancel: &CancelToken, root_dir: &Path, options: &BuildOptions) -> Result<()> {
    let meta_dir = root_dir
        .join("streams")
        .join(&options.stream_version);
    std::fs::create_dir_all(&meta_dir)?;

    let mut publisher = Publisher::new();
    let mut index = StreamIndex::new();

    for stream_name in &options.streams {
        let catalog = build_product_catalog(
            cancel,
            root_dir,
            &options.stream_version,
            stream_name,
            options.workers,
        )?;

        let catalog_rel_path = format!(
            "streams/{}/{}.json",
            options.stream_version, stream_name
        );

        publisher.stage_json(&root_dir.join(&catalog_rel_path), &catalog)?;
        index.add_entry(stream_name, &catalog_rel_path, &catalog);
    }

    // The index must land after every catalog it references.
    publisher.stage_json(&meta_dir.join("index.json"), &index)?;
    publisher.commit()
}

/// Build the product catalog for one stream
///
/// Loads the previously published catalog (absent means empty), discovers
/// products on disk, and processes every unreferenced version on a worker
/// pool. The pipeline only ever adds to the catalog; removal is the prune
/// engine's job.
pub fn build_product_catalog(
    cancel: &CancelToken,
    root_dir: &Path,
    stream_version: &str,
    stream_name: &str,
    workers: usize,
) -> Result<ProductCatalog> {
    let catalog_path = root_dir
        .join("streams")
        .join(stream_version)
        .join(format!("{}.json", stream_name));

    let mut catalog: ProductCatalog = stream::catalog::read_json_file(&catalog_path)?
        .unwrap_or_else(|| ProductCatalog::new(BTreeMap::new()));

    let products = stream::get_products(root_dir, stream_name)?;

    let (_, added) = stream::diff_products(&catalog.products, &products);

    let mut jobs = Vec::new();
    for (id, product) in &added {
        if product.versions.is_empty() {
            continue;
        }

        // Seed the catalog with the product metadata; versions are inserted
        // by the jobs below as they succeed.
        catalog.products.entry(id.clone()).or_insert_with(|| {
            let mut shell = products[id].clone();
            shell.versions = BTreeMap::new();
            shell
        });

        for version_name in product.versions.keys() {
            jobs.push(VersionJob {
                product_id: id.clone(),
                product_rel_path: format!("{}/{}", stream_name, product.rel_path()),
                version_name: version_name.clone(),
            });
        }
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
        .map_err(|err| Error::Io(std::io::Error::other(err)))?;

    let catalog = Mutex::new(catalog);

    pool.install(|| {
        jobs.par_iter()
            .for_each(|job| process_version_job(cancel, root_dir, stream_name, &catalog, job));
    });

    let catalog = catalog
        .into_inner()
        .map_err(|err| Error::Io(std::io::Error::other(err.to_string())))?;

    Ok(catalog)
}

/// Process one new version: deltas, hashes, checksum gate, catalog insert
///
/// Failures are logged with product and version context and drop the version
/// from this build; they never abort the pass.
fn process_version_job(
    cancel: &CancelToken,
    root_dir: &Path,
    stream_name: &str,
    catalog: &Mutex<ProductCatalog>,
    job: &VersionJob,
) {
    if cancel.is_cancelled() {
        return;
    }

    // Deltas are generated before hashing so the fresh delta files get their
    // hashes calculated along with everything else.
    let result = delta::create_delta_files(
        cancel,
        root_dir,
        &job.product_rel_path,
        Some(&job.version_name),
    );
    if let Err(err) = result {
        error!(
            "Failed to create delta file (stream {:?}, product {:?}, version {:?}): {}",
            stream_name, job.product_id, job.version_name, err
        );
        return;
    }

    let version_rel_path = format!("{}/{}", job.product_rel_path, job.version_name);

    let version = match stream::get_version(root_dir, &version_rel_path, true) {
        Ok(version) => version,
        Err(err) => {
            error!(
                "Failed to get version (stream {:?}, product {:?}, version {:?}): {}",
                stream_name, job.product_id, job.version_name, err
            );
            return;
        }
    };

    if let Err(err) = verify_version_checksums(root_dir, &version_rel_path, &version) {
        error!(
            "Checksum verification failed (stream {:?}, product {:?}, version {:?}): {}",
            stream_name, job.product_id, job.version_name, err
        );
        return;
    }

    let mut catalog = match catalog.lock() {
        Ok(catalog) => catalog,
        Err(poisoned) => poisoned.into_inner(),
    };

    if let Some(product) = catalog.products.get_mut(&job.product_id) {
        product
            .versions
            .insert(job.version_name.clone(), version);

        info!(
            "New version added to the product catalog (stream {:?}, product {:?}, version {:?})",
            stream_name, job.product_id, job.version_name
        );
    }
}

/// Verify version items against the version's checksum file, if present
///
/// Freshly generated delta files have no entry yet; their computed hashes
/// are appended to the file. Any other missing entry, and any mismatch,
/// fails the version.
fn verify_version_checksums(root_dir: &Path, version_rel_path: &str, version: &Version) -> Result<()> {
    let Some(checksums) = &version.checksums else {
        return Ok(());
    };

    let checksum_path = root_dir
        .join(version_rel_path)
        .join(stream::FILE_CHECKSUMS);

    for item in version.items.values() {
        let actual = item.sha256.clone().unwrap_or_default();

        match checksums.get(&item.name) {
            None if item.ftype.is_delta() => {
                // The delta was generated moments ago by this very job.
                checksum::append_checksum(&checksum_path, &item.name, &actual)?;
            }
            None => {
                return Err(Error::ChecksumMissing {
                    item: item.name.clone(),
                });
            }
            Some(expected) if expected != &actual => {
                return Err(Error::ChecksumMismatch {
                    item: item.name.clone(),
                    expected: expected.clone(),
                    actual,
                });
            }
            Some(_) => {}
        }
    }

    Ok(())
}
