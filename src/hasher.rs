/// Content hashing used as cache and artifact identity.
use std::io::Read as _;
use std::path::Path;

use sha2::{Digest as _, Sha256};

use crate::error::Error;
use crate::types::ContentHash;

/// Read buffer for streaming file hashes.
const CHUNK_SIZE: usize = 64 * 1024;

/// SHA-256 of raw bytes.
pub fn hash_bytes(bytes: &[u8]) -> ContentHash {
    let digest = Sha256::digest(bytes);
    return ContentHash(format!("{digest:x}"));
}

/// SHA-256 of a file's contents, streamed so large archives are not loaded whole.
///
/// # Errors
///
/// Returns `Error::FileNotFound` if the file is missing, or `Error::Io` on read failure.
pub fn hash_file(path: &Path) -> Result<ContentHash, Error> {
    let mut file = match std::fs::File::open(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::FileNotFound { path: path.to_path_buf() });
        },
        Err(e) => return Err(Error::Io(e)),
        Ok(f) => f,
    };

    let mut hasher = Sha256::new();
    let mut buffer = vec![0_u8; CHUNK_SIZE];
    loop {
        let read = file.read(&mut buffer)?;
        let Some(chunk) = buffer.get(..read) else {
            break;
        };
        if chunk.is_empty() {
            break;
        }
        hasher.update(chunk);
    }

    return Ok(ContentHash(format!("{:x}", hasher.finalize())));
}

/// SHA-256 over an ordered list of strings.
///
/// Each part is length-prefixed so `["ab", "c"]` and `["a", "bc"]` differ.
pub fn hash_strings<S: AsRef<str>>(parts: &[S]) -> ContentHash {
    let mut hasher = Sha256::new();
    for part in parts {
        let bytes = part.as_ref().as_bytes();
        let len = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
        hasher.update(len.to_le_bytes());
        hasher.update(bytes);
    }
    return ContentHash(format!("{:x}", hasher.finalize()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_hash_is_lowercase_hex() {
        let hash = hash_bytes(b"abc");
        assert_eq!(
            hash.0,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn file_hash_matches_bytes_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lib.jar");
        std::fs::write(&path, b"archive contents").unwrap();
        assert_eq!(hash_file(&path).unwrap(), hash_bytes(b"archive contents"));
    }

    #[test]
    fn missing_file_is_reported_by_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.jar");
        let err = hash_file(&path).unwrap_err();
        assert!(matches!(err, Error::FileNotFound { path: p } if p == path));
    }

    #[test]
    fn composite_hash_respects_boundaries() {
        assert_ne!(hash_strings(&["ab", "c"]), hash_strings(&["a", "bc"]));
        assert_eq!(hash_strings(&["a", "b"]), hash_strings(&["a", "b"]));
    }
}
