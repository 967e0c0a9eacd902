//! Checking a download against the digest published with its asset.

use std::fs;
use std::path::Path;

use crate::error::{InstallError, Result};
use crate::github::types::Asset;
use crate::scheduler::TaskContext;
use crate::verify::{compute_file_sha256, verify_digest};

/// Verifies `path` against `asset.digest`.
///
/// An asset without a digest fails unless `allow_unverified` is set. A file
/// that fails verification is deleted so it can never be extracted.
pub fn verify_download(
    ctx: &TaskContext,
    path: &Path,
    asset: &Asset,
    allow_unverified: bool,
) -> Result<()> {
    ctx.progress().reset();

    let Some(digest) = asset.digest.as_deref().filter(|d| !d.trim().is_empty()) else {
        if allow_unverified {
            tracing::warn!("{} has no digest; installing unverified", asset.name);
            ctx.progress().complete();
            return Ok(());
        }
        return Err(InstallError::NoDigestAvailable(asset.name.clone()));
    };

    if verify_digest(path, digest) {
        tracing::info!("Checksum verified for {}", asset.name);
        ctx.progress().complete();
        return Ok(());
    }

    let actual = compute_file_sha256(path).unwrap_or_else(|e| format!("unreadable ({e})"));
    tracing::error!(
        "Checksum mismatch for {}: expected {}, got {}",
        asset.name,
        digest,
        actual
    );
    let _ = fs::remove_file(path);
    Err(InstallError::ChecksumMismatch {
        expected: digest.to_string(),
        actual,
    })
}
