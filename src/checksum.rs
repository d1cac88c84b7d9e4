// src/checksum.rs

//! Reading and appending `SHA256SUMS` files
//!
//! The checksum file uses the coreutils line format: a hex digest and a file
//! name separated by whitespace, one entry per line. Producers drop it next
//! to the version items; the build pass appends entries for delta files it
//! generates itself.

use crate::error::Result;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// Parse a checksum file into a map of file name to hex digest
///
/// Lines that do not split into two whitespace-separated fields are ignored.
pub fn read_checksum_file(path: &Path) -> Result<BTreeMap<String, String>> {
    let content = std::fs::read_to_string(path)?;
    let mut checksums = BTreeMap::new();

    for line in content.lines() {
        let line = line.trim();

        let Some((digest, name)) = line.split_once(char::is_whitespace) else {
            continue;
        };

        let name = name.trim();
        if name.is_empty() {
            continue;
        }

        checksums.insert(name.to_string(), digest.to_string());
    }

    Ok(checksums)
}

/// Append a single `<hex>  <name>` entry to the checksum file
///
/// The entry is written with one `write` call on a file opened for append,
/// so concurrent appenders cannot interleave within a line.
pub fn append_checksum(path: &Path, name: &str, digest: &str) -> Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(format!("{}  {}\n", digest, name).as_bytes())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_read_checksum_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("SHA256SUMS");
        fs::write(
            &path,
            "aaaa  lxd.tar.xz\nbbbb\tdisk.qcow2\n  cccc   spaced.squashfs  \nmalformed\n\n",
        )
        .unwrap();

        let sums = read_checksum_file(&path).unwrap();
        assert_eq!(sums.len(), 3);
        assert_eq!(sums.get("lxd.tar.xz").map(String::as_str), Some("aaaa"));
        assert_eq!(sums.get("disk.qcow2").map(String::as_str), Some("bbbb"));
        assert_eq!(sums.get("spaced.squashfs").map(String::as_str), Some("cccc"));
    }

    #[test]
    fn test_append_checksum_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("SHA256SUMS");
        fs::write(&path, "aaaa  existing.squashfs\n").unwrap();

        append_checksum(&path, "disk.2024_01_01.qcow2.vcdiff", "bbbb").unwrap();

        let sums = read_checksum_file(&path).unwrap();
        assert_eq!(sums.len(), 2);
        assert_eq!(
            sums.get("disk.2024_01_01.qcow2.vcdiff").map(String::as_str),
            Some("bbbb")
        );
    }

    #[test]
    fn test_append_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("SHA256SUMS");

        append_checksum(&path, "rootfs.squashfs", "cccc").unwrap();

        let sums = read_checksum_file(&path).unwrap();
        assert_eq!(sums.get("rootfs.squashfs").map(String::as_str), Some("cccc"));
    }
}
