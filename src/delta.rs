// src/delta.rs

//! Binary delta generation between adjacent complete versions
//!
//! For every root filesystem in a version, a VCDiff delta is generated from
//! the same-named file in the previous complete version, using the external
//! `xdelta3` tool. Deltas that already exist are skipped, as are files whose
//! counterpart is missing from the previous version. The oldest version of a
//! product is never a delta target.

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::stream::{self, ItemType};
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, info};
use wait_timeout::ChildExt;

/// Name of the external binary-delta tool
const DELTA_TOOL: &str = "xdelta3";

/// Poll interval while waiting on the delta subprocess
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Generate missing delta files within the given product
///
/// Version names sort into build order; each version is diffed against its
/// immediate predecessor. When `version_name` is set, only that version is
/// processed (the build pipeline targets one version per job).
pub fn create_delta_files(
    cancel: &CancelToken,
    root_dir: &Path,
    product_rel_path: &str,
    version_name: Option<&str>,
) -> Result<()> {
    let product = stream::get_product(root_dir, product_rel_path)?;

    let versions: Vec<&String> = product.versions.keys().collect();
    if versions.len() < 2 {
        // Nothing to diff against.
        return Ok(());
    }

    // The oldest version has no predecessor, so start at index 1.
    for i in 1..versions.len() {
        if version_name.is_some_and(|target| target != versions[i]) {
            continue;
        }

        let prev_name = versions[i - 1];
        let cur_name = versions[i];
        let version = &product.versions[cur_name];

        for item in version.items.values() {
            if !item.ftype.is_delta_source() {
                continue;
            }

            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let prefix = match item.name.rsplit_once('.') {
                Some((prefix, _)) => prefix,
                None => item.name.as_str(),
            };

            let suffix = match item.ftype {
                ItemType::DiskKvm => "qcow2.vcdiff",
                _ => "vcdiff",
            };

            let delta_name = format!("{}.{}.{}", prefix, prev_name, suffix);
            if version.items.contains_key(&delta_name) {
                debug!(
                    "Delta {:?} already exists for version {:?}",
                    delta_name, cur_name
                );
                continue;
            }

            let product_path = root_dir.join(product_rel_path);
            let source_path = product_path.join(prev_name).join(&item.name);
            let target_path = product_path.join(cur_name).join(&item.name);
            let output_path = product_path.join(cur_name).join(&delta_name);

            // A gap: the previous version never carried this file.
            if !source_path.exists() {
                debug!(
                    "No delta source {:?} in version {:?}, skipping",
                    item.name, prev_name
                );
                continue;
            }

            generate_vcdiff(cancel, &source_path, &target_path, &output_path)?;

            info!(
                "Delta generated for version {:?} (base {:?})",
                cur_name, prev_name
            );
        }
    }

    Ok(())
}

/// Run the delta tool to produce `output` taking `source` to `target`
///
/// The child is polled so a fired cancellation token kills it promptly.
/// Partial output is removed on any failure.
fn generate_vcdiff(
    cancel: &CancelToken,
    source: &Path,
    target: &Path,
    output: &Path,
) -> Result<()> {
    let spawned = Command::new(DELTA_TOOL)
        .arg("-e")
        .arg("-s")
        .arg(source)
        .arg(target)
        .arg(output)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn();

    let mut child = match spawned {
        Ok(child) => child,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::DeltaToolMissing {
                tool: DELTA_TOOL.to_string(),
            });
        }
        Err(err) => return Err(err.into()),
    };

    let status = loop {
        if cancel.is_cancelled() {
            let _ = child.kill();
            let _ = child.wait();
            let _ = std::fs::remove_file(output);
            return Err(Error::Cancelled);
        }

        match child.wait_timeout(WAIT_POLL_INTERVAL)? {
            Some(status) => break status,
            None => continue,
        }
    };

    if !status.success() {
        let mut stderr = String::new();
        if let Some(mut pipe) = child.stderr.take() {
            let _ = pipe.read_to_string(&mut stderr);
        }

        let _ = std::fs::remove_file(output);

        return Err(Error::Delta {
            output: output.to_path_buf(),
            reason: format!("{} exited with {}: {}", DELTA_TOOL, status, stderr.trim()),
        });
    }

    Ok(())
}
