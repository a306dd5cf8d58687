//! Content fingerprints.
//!
//! SHA-256 digests rendered as lowercase hex. Used both as the dedup key for
//! stored cover art and as the change detector for scanned audio files, so
//! the whole stream is hashed (no sampling) and input is never buffered in
//! full.

use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// Size of the read buffer used while hashing.
const READ_BUFFER: usize = 64 * 1024;

/// A SHA-256 content fingerprint (64 lowercase hex characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// The hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the hex digest.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Fingerprint an arbitrary byte stream.
///
/// # Errors
///
/// Returns an IO error if the stream cannot be fully read.
pub fn fingerprint_reader<R: Read>(reader: R) -> io::Result<Fingerprint> {
    let mut reader = BufReader::with_capacity(READ_BUFFER, reader);
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(Fingerprint(format!("{:x}", hasher.finalize())))
}

/// Fingerprint the full contents of a file.
///
/// # Errors
///
/// Returns an IO error if the file cannot be opened or read.
pub fn fingerprint_file(path: &Path) -> io::Result<Fingerprint> {
    let file = File::open(path)?;
    fingerprint_reader(file)
}

/// Fingerprint an in-memory buffer.
#[cfg(test)]
pub fn fingerprint_bytes(data: &[u8]) -> Fingerprint {
    Fingerprint(format!("{:x}", Sha256::digest(data)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_known_digest() {
        // SHA-256("abc")
        let fp = fingerprint_bytes(b"abc");
        assert_eq!(
            fp.as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_reader_matches_bytes() {
        let data = vec![7u8; READ_BUFFER * 3 + 17];
        let streamed = fingerprint_reader(&data[..]).unwrap();
        assert_eq!(streamed, fingerprint_bytes(&data));
    }

    #[test]
    fn test_file_hash_is_stable() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("test.bin");

        let mut file = File::create(&file_path).unwrap();
        file.write_all(b"Hello, world!").unwrap();
        drop(file);

        let hash = fingerprint_file(&file_path).unwrap();
        assert_eq!(hash.as_str().len(), 64);
        assert_eq!(hash, fingerprint_file(&file_path).unwrap());
    }

    #[test]
    fn test_different_content_differs() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        std::fs::write(&a, b"Content A").unwrap();
        std::fs::write(&b, b"Content B").unwrap();

        assert_ne!(fingerprint_file(&a).unwrap(), fingerprint_file(&b).unwrap());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let err = fingerprint_file(&dir.path().join("missing.bin")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::other("device gone"))
        }
    }

    #[test]
    fn test_unreadable_stream_fails() {
        assert!(fingerprint_reader(FailingReader).is_err());
    }
}
