//! Deterministic content fingerprints.
//!
//! Fingerprints are SHA-256 digests rendered as hex strings and treated as
//! opaque equality tokens. Structured values are canonicalized through JSON
//! before hashing: `serde_json` backs objects with a sorted map, so two
//! values that serialize to the same fields produce the same digest
//! regardless of insertion order, across processes and runs.

use crate::{Error, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::Path;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Read buffer size for streaming hashes
const READ_BUF_LEN: usize = 64 * 1024;

/// Fingerprint a structured value.
///
/// The value is serialized to canonical JSON (map keys sorted) and the
/// resulting bytes are hashed. Field order within mappings therefore does
/// not affect the digest.
///
/// # Errors
///
/// Returns an error if the value cannot be serialized.
pub fn fingerprint<T: Serialize>(value: &T) -> Result<String> {
    let json = serde_json::to_value(value)
        .map_err(|e| Error::serialization(format!("Failed to canonicalize value: {e}")))?;
    let bytes = serde_json::to_vec(&json)
        .map_err(|e| Error::serialization(format!("Failed to serialize value: {e}")))?;
    Ok(fingerprint_bytes(&bytes))
}

/// Fingerprint a byte slice.
#[must_use]
pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Fingerprint a string.
#[must_use]
pub fn fingerprint_string(s: &str) -> String {
    fingerprint_bytes(s.as_bytes())
}

/// Fingerprint a file's contents, streaming through a fixed buffer.
///
/// Returns the digest together with the file's size in bytes.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn fingerprint_file(path: &Path) -> Result<(String, u64)> {
    let _span = tracing::trace_span!("fingerprint_file", path = %path.display()).entered();
    let mut file = fs::File::open(path).map_err(|e| Error::io(e, path, "open"))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; READ_BUF_LEN];
    let mut total: u64 = 0;
    loop {
        let n = file.read(&mut buf).map_err(|e| Error::io(e, path, "read"))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        total += n as u64;
    }
    Ok((hex::encode(hasher.finalize()), total))
}

/// Stream bytes through a digest, invoking `tap` once per chunk.
///
/// The tap enables concurrent buffering and size measurement in a single
/// pass over the stream. Returns the digest and the total byte count.
///
/// # Errors
///
/// Returns an error if reading from the stream fails.
pub async fn hash_stream<R, F>(reader: &mut R, mut tap: F) -> Result<(String, u64)>
where
    R: AsyncRead + Unpin + ?Sized,
    F: FnMut(&[u8]),
{
    let mut hasher = Sha256::new();
    let mut buf = [0u8; READ_BUF_LEN];
    let mut total: u64 = 0;
    loop {
        let n = reader
            .read(&mut buf)
            .await
            .map_err(|e| Error::io_no_path(e, "read"))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        tap(&buf[..n]);
        total += n as u64;
    }
    Ok((hex::encode(hasher.finalize()), total))
}
