// src/hash.rs

//! Streaming SHA-256 hashing for version items
//!
//! Two flavors are needed by the catalog: the plain per-file hash, and the
//! combined hash over the metadata tarball concatenated with a root
//! filesystem. Both stream the input in fixed-size chunks so image files of
//! any size hash in bounded memory.

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Read buffer size for hashing
const CHUNK_SIZE: usize = 8192;

/// Compute the lowercase hex SHA-256 of a single file
pub fn hash_file(path: &Path) -> Result<String> {
    hash_files(&[path])
}

/// Compute the lowercase hex SHA-256 of the logical concatenation of the
/// given files, in order
pub fn hash_files<P: AsRef<Path>>(paths: &[P]) -> Result<String> {
    let mut hasher = Sha256::new();

    for path in paths {
        feed_file(&mut hasher, path.as_ref())?;
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Stream one file into the hasher
fn feed_file(hasher: &mut Sha256, path: &Path) -> Result<()> {
    let mut file = File::open(path)?;
    let mut buffer = [0u8; CHUNK_SIZE];

    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }

        hasher.update(&buffer[..n]);
    }

    Ok(())
}
