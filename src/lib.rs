// src/lib.rs

//! Streamkeeper
//!
//! Maintains a Simplestreams-compatible image repository hosted on a local
//! filesystem. Image producers drop builds into a structured directory tree;
//! streamkeeper discovers them, verifies their integrity, generates binary
//! deltas between successive builds, publishes the JSON catalogs and index
//! consumed by simplestream clients, and prunes obsolete builds under
//! configurable retention rules.
//!
//! # Architecture
//!
//! - Discovery is read-only: producers own the version directories, the
//!   tool only adds delta files and checksum entries it generated itself
//! - Per-version failures stay per-version: a bad checksum or failed delta
//!   drops that version from the pass, never the pass itself
//! - Publication is atomic: catalogs and index are staged as hidden files
//!   and renamed into place, catalogs first, index last

pub mod cancel;
pub mod checksum;
pub mod delta;
mod error;
pub mod hash;
pub mod pipeline;
pub mod prune;
pub mod publish;
pub mod stream;

pub use cancel::CancelToken;
pub use error::{Error, Result};
pub use pipeline::{build_index, build_product_catalog, BuildOptions};
pub use prune::{
    prune_dangling_product_versions, prune_empty_dirs, prune_stream_product_versions,
    DANGLING_FRESHNESS_WINDOW,
};
pub use publish::Publisher;
pub use stream::{Item, ItemType, Product, ProductCatalog, StreamIndex, Version};
