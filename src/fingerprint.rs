//! Content fingerprints for local mod files
//!
//! The registry's reverse lookup is keyed by SHA-1 of the file bytes, so two
//! byte-identical files are indistinguishable downstream regardless of name.

use sha1::{Digest, Sha1};
use std::fs::File;
use std::io::Read;
use std::path::Path;

const CHUNK_SIZE: usize = 64 * 1024;

/// Compute the lowercase hex SHA-1 digest of a file.
///
/// Returns `None` if the file cannot be opened or read; callers exclude such
/// files from registry lookup rather than treating this as fatal.
pub fn file_sha1(path: &Path) -> Option<String> {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            tracing::debug!("Skipping unreadable file {}: {}", path.display(), e);
            return None;
        }
    };

    let mut hasher = Sha1::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buffer[..n]),
            Err(e) => {
                tracing::debug!("Read failed for {}: {}", path.display(), e);
                return None;
            }
        }
    }

    Some(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn identical_content_identical_digest() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.jar");
        let b = dir.path().join("b.jar");
        std::fs::write(&a, b"mod bytes").unwrap();
        std::fs::write(&b, b"mod bytes").unwrap();

        assert_eq!(file_sha1(&a), file_sha1(&b));
    }

    #[test]
    fn single_byte_difference_changes_digest() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.jar");
        let b = dir.path().join("b.jar");
        std::fs::write(&a, b"mod bytes").unwrap();
        std::fs::write(&b, b"mod bytez").unwrap();

        assert_ne!(file_sha1(&a), file_sha1(&b));
    }

    #[test]
    fn known_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.jar");
        let mut f = File::create(&path).unwrap();
        f.write_all(b"hello").unwrap();
        drop(f);

        // sha1("hello")
        assert_eq!(
            file_sha1(&path).unwrap(),
            "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d"
        );
    }

    #[test]
    fn missing_file_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(file_sha1(&dir.path().join("absent.jar")), None);
    }
}
