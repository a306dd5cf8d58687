//! Content-addressable storage for cover art.
//!
//! Every blob lives at a path derived purely from its fingerprint:
//!
//! ```text
//! <output_dir>/<hash[0:2]>/<hash[2:4]>/<hash>.jpg
//! ```
//!
//! Bytes are always materialized inside `<output_dir>/temp/` first and only
//! the final `rename` into the addressed location is visible to readers, so
//! a reader never observes a half-written blob. Two workers storing the same
//! image race harmlessly: the destination either already exists (no-op) or
//! the last rename replaces identical bytes.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Error, Result, ResultExt};
use crate::hash::{self, Fingerprint};

/// Name of the scratch directory under the output directory.
pub const TEMP_DIR_NAME: &str = "temp";

/// Extension used for stored blobs.
const BLOB_EXTENSION: &str = "jpg";

/// A blob placed in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    /// Content fingerprint of the bytes
    pub fingerprint: Fingerprint,
    /// Absolute location of the blob
    pub path: PathBuf,
    /// Location relative to the store root (`ab/12/ab12....jpg`)
    pub relative_path: PathBuf,
    /// False when an identical blob was already present
    pub written: bool,
}

/// Filesystem content-addressable store rooted at an output directory.
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
    temp_dir: PathBuf,
}

impl ContentStore {
    /// Open a store, creating the root and scratch directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the directories cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let temp_dir = root.join(TEMP_DIR_NAME);
        fs::create_dir_all(&temp_dir)
            .with_context(format!("creating scratch directory {}", temp_dir.display()))?;
        Ok(Self { root, temp_dir })
    }

    /// Store root (the output directory).
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scratch directory for in-flight extractions.
    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// A fresh, unique path inside the scratch directory.
    ///
    /// The file is not created; callers (or external tools) write to it and
    /// then hand it to [`ContentStore::put`].
    pub fn scratch_path(&self, prefix: &str) -> PathBuf {
        let name = format!(
            "{}_{}_{:016x}.{}",
            prefix,
            std::process::id(),
            rand::random::<u64>(),
            BLOB_EXTENSION
        );
        self.temp_dir.join(name)
    }

    /// Place the file at `source` into the store.
    ///
    /// Files already inside the scratch directory are moved; anything else
    /// is copied into scratch first so the final rename stays on one
    /// filesystem. Idempotent: storing identical bytes twice yields the same
    /// fingerprint and path, and the second call does not rewrite the blob.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the source cannot be read or the blob cannot be
    /// renamed into place.
    pub fn put(&self, source: &Path) -> Result<StoredBlob> {
        let scratch = if source.starts_with(&self.temp_dir) {
            source.to_path_buf()
        } else {
            let scratch = self.scratch_path("copy");
            fs::copy(source, &scratch)
                .with_context(format!("copying {} into scratch", source.display()))?;
            scratch
        };

        let result = self.place(&scratch);
        if result.is_err() {
            // Never leave a partial scratch file behind on failure
            let _ = fs::remove_file(&scratch);
        }
        result
    }

    /// Remove the scratch directory and anything left inside it.
    pub fn remove_scratch(&self) -> Result<()> {
        match fs::remove_dir_all(&self.temp_dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn place(&self, scratch: &Path) -> Result<StoredBlob> {
        let fingerprint = hash::fingerprint_file(scratch)
            .with_context(format!("hashing {}", scratch.display()))?;
        let dest = resolve_path(fingerprint.as_str(), &self.root)?;
        let relative_path = relative_path(fingerprint.as_str())?;

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .with_context(format!("creating {}", parent.display()))?;
        }

        if dest.is_file() {
            debug!(target: "store", hash = %fingerprint, "Blob already stored");
            fs::remove_file(scratch)?;
            return Ok(StoredBlob {
                fingerprint,
                path: dest,
                relative_path,
                written: false,
            });
        }

        if let Err(e) = fs::rename(scratch, &dest) {
            // Another writer may have placed the same bytes between the
            // existence check and our rename (rename refuses to replace on
            // some platforms).
            if dest.is_file() {
                warn!(target: "store", hash = %fingerprint, error = %e, "Concurrent placement, keeping existing blob");
                let _ = fs::remove_file(scratch);
                return Ok(StoredBlob {
                    fingerprint,
                    path: dest,
                    relative_path,
                    written: false,
                });
            }
            return Err(Error::Io(e).context(format!(
                "renaming {} to {}",
                scratch.display(),
                dest.display()
            )));
        }

        debug!(target: "store", hash = %fingerprint, path = %dest.display(), "Stored blob");
        Ok(StoredBlob {
            fingerprint,
            path: dest,
            relative_path,
            written: true,
        })
    }
}

/// Path of a blob relative to the store root: `<h[0:2]>/<h[2:4]>/<h>.jpg`.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] if the fingerprint is shorter than four
/// characters or contains anything other than ASCII hex digits.
pub fn relative_path(fingerprint: &str) -> Result<PathBuf> {
    if fingerprint.len() < 4 {
        return Err(Error::invalid_argument(format!(
            "fingerprint must be at least 4 characters long, got {:?}",
            fingerprint
        )));
    }
    if !fingerprint.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::invalid_argument(format!(
            "fingerprint must be hexadecimal, got {:?}",
            fingerprint
        )));
    }

    let level1 = &fingerprint[..2];
    let level2 = &fingerprint[2..4];
    Ok(PathBuf::from(level1)
        .join(level2)
        .join(format!("{}.{}", fingerprint, BLOB_EXTENSION)))
}

/// Absolute path of a blob under `output_dir`. Pure function of its inputs.
///
/// # Errors
///
/// Same as [`relative_path`].
pub fn resolve_path(fingerprint: &str, output_dir: &Path) -> Result<PathBuf> {
    Ok(output_dir.join(relative_path(fingerprint)?))
}
