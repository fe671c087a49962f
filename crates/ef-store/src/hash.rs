//! Content hashing for artifacts and run fingerprints.

use std::fs;
use std::io::Read;
use std::path::Path;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::{StoreError, StoreResult};

/// Hex SHA-256 of a file's bytes.
pub fn file_sha256(path: &Path) -> StoreResult<String> {
    let mut file = fs::File::open(path).map_err(|e| StoreError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = [0_u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(|e| StoreError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Hex SHA-256 of the JSON form of `value`.
///
/// Used to fingerprint run inputs: equal inputs give equal hashes.
pub fn content_hash<T: Serialize>(value: &T) -> StoreResult<String> {
    let json = serde_json::to_vec(value).map_err(StoreError::Encode)?;
    Ok(format!("{:x}", Sha256::digest(&json)))
}
