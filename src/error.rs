// src/error.rs

//! Error types for the streamkeeper library
//!
//! Everything attributable to a single product version (incomplete content,
//! checksum trouble, a failed delta) stays scoped to that version and is
//! handled by the caller without aborting the pass. Structural failures
//! (invalid arguments, staging, renames, I/O outside a job) propagate.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while maintaining a simplestream tree
#[derive(Error, Debug)]
pub enum Error {
    /// Product path does not match the `stream/distro/release/arch/variant` schema
    #[error("Invalid product path {path:?}: {reason}")]
    InvalidProductPath { path: String, reason: String },

    /// Version is missing the metadata tarball or a root filesystem
    #[error("Product version is incomplete: {0:?}")]
    VersionIncomplete(String),

    /// Version carries an `image.yaml` that cannot be parsed
    #[error("Product version has invalid image config {path:?}: {source}")]
    InvalidImageConfig {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// An item's recorded checksum does not match its content
    #[error("Checksum mismatch for {item:?}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        item: String,
        expected: String,
        actual: String,
    },

    /// The checksum file exists but has no entry for a non-delta item
    #[error("Checksum entry missing for {item:?}")]
    ChecksumMissing { item: String },

    /// The external binary-delta tool is not installed
    #[error("Delta tool {tool:?} not found in PATH")]
    DeltaToolMissing { tool: String },

    /// Delta generation failed
    #[error("Delta generation failed for {output:?}: {reason}")]
    Delta { output: PathBuf, reason: String },

    /// Command-line validation failure
    #[error("{0}")]
    InvalidArg(String),

    /// Staging or rename failure during publication
    #[error("Failed to publish {path:?}: {source}")]
    Publish {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The cancellation token fired
    #[error("Operation cancelled")]
    Cancelled,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the library
pub type Result<T> = std::result::Result<T, Error>;
