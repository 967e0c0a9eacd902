//! SHA256 integrity verification of downloaded files.
//!
//! Files are hashed in fixed-size chunks so multi-megabyte archives never
//! have to be held in memory, and the final comparison runs in constant time.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{InstallError, Result};

/// Read chunk size while hashing.
const CHUNK_SIZE: usize = 4096;

/// Length in bytes of a SHA256 digest.
pub const SHA256_LEN: usize = 32;

/// Prefix GitHub puts in front of asset digests.
const SHA256_PREFIX: &str = "sha256:";

/// Verifies that the file at `path` hashes to `expected_hex`.
///
/// Returns `false` when the expected digest is not 64 hex characters, when the
/// file cannot be read, or when the digests differ. Never panics or errors.
#[must_use]
pub fn verify(path: &Path, expected_hex: &str) -> bool {
    let expected = match hex::decode(expected_hex.trim()) {
        Ok(bytes) if bytes.len() == SHA256_LEN => bytes,
        Ok(bytes) => {
            warn!(
                "Rejecting digest of {} bytes (expected {})",
                bytes.len(),
                SHA256_LEN
            );
            return false;
        }
        Err(e) => {
            warn!("Rejecting malformed digest: {}", e);
            return false;
        }
    };

    match hash_file(path) {
        Ok(actual) => constant_time_eq(&actual, &expected),
        Err(e) => {
            warn!("Could not hash {}: {}", path.display(), e);
            false
        }
    }
}

/// Verifies a file against a digest field such as `sha256:<hex>`.
///
/// A bare hex string is accepted as SHA256. Any other algorithm prefix fails.
#[must_use]
pub fn verify_digest(path: &Path, digest: &str) -> bool {
    match strip_digest_prefix(digest) {
        Some(hex) => verify(path, hex),
        None => {
            warn!("Unsupported digest algorithm: {}", digest);
            false
        }
    }
}

/// Strips the `sha256:` prefix from a digest field.
///
/// Returns `None` for a different `<algorithm>:` prefix.
#[must_use]
pub fn strip_digest_prefix(digest: &str) -> Option<&str> {
    let digest = digest.trim();
    if let Some(hex) = digest.strip_prefix(SHA256_PREFIX) {
        return Some(hex);
    }
    if digest.contains(':') { None } else { Some(digest) }
}

/// Computes the lowercase hex SHA256 of a file.
pub fn compute_file_sha256(path: &Path) -> Result<String> {
    let hash = hash_file(path).map_err(InstallError::from)?;
    let hex_hash = hex::encode(hash);
    debug!("SHA256 of {}: {}", path.display(), hex_hash);
    Ok(hex_hash)
}

fn hash_file(path: &Path) -> io::Result<[u8; SHA256_LEN]> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; CHUNK_SIZE];

    loop {
        let bytes_read = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize().into())
}

/// Compares two byte slices without exiting early on the first difference.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let diff = a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y));
    diff == 0
}
