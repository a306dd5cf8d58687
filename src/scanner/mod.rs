//! Directory scanner.
//!
//! Walks a root directory on a blocking thread, keeps files whose extension
//! is on the audio allow-list, and emits one [`MediaFileRecord`] per file
//! (tags read, content fingerprinted, natural key derived from the path
//! relative to the root) into a bounded channel. A full channel blocks the
//! walk.
//!
//! Per-entry problems (traversal errors, unreadable tags, unreadable bytes)
//! are logged and the walk continues. Failing to open the root aborts the
//! scan. Either way the record channel closes exactly once, when the walk
//! thread exits, and the outcome is reported separately on
//! [`ScanHandle::done`] so the consumer can tell a clean end from a failed one.

use chrono::{DateTime, Utc};
use futures::stream::Stream;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use walkdir::WalkDir;

use crate::error::{Error, Result, ResultExt};
use crate::hash;
use crate::metadata::TagReader;
use crate::model::{MediaFileRecord, TrackStatus, split_relative};

/// Extensions treated as audio (compared case-insensitively).
pub const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "wav", "flac", "aac", "ogg", "wma", "m4a", "aiff", "alac", "opus",
];

/// Counters for one completed walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Audio files found
    pub discovered: usize,
    /// Records handed to the consumer
    pub emitted: usize,
    /// Audio files or entries skipped because of an error
    pub skipped: usize,
}

/// Receiving side of a running scan.
#[derive(Debug)]
pub struct ScanHandle {
    /// Discovered records; closes when the walk ends
    pub records: mpsc::Receiver<MediaFileRecord>,
    /// Outcome of the walk, sent once after the last record
    pub done: oneshot::Receiver<Result<ScanSummary>>,
}

impl ScanHandle {
    /// View the records as a stream.
    pub fn into_stream(self) -> (impl Stream<Item = MediaFileRecord>, oneshot::Receiver<Result<ScanSummary>>) {
        let stream = futures::stream::unfold(self.records, |mut rx| async move {
            rx.recv().await.map(|record| (record, rx))
        });
        (stream, self.done)
    }
}

/// Whether `path` has an audio extension.
pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| AUDIO_EXTENSIONS.iter().any(|a| a.eq_ignore_ascii_case(ext)))
}

/// Scan `root` recursively for audio files.
///
/// Must be called from within a Tokio runtime. `buffer` is the capacity of
/// the record channel.
pub fn scan(root: PathBuf, tag_reader: Arc<dyn TagReader>, buffer: usize) -> ScanHandle {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    let (done_tx, done_rx) = oneshot::channel();

    // Spawn a blocking task to perform the synchronous file system traversal
    tokio::task::spawn_blocking(move || {
        let outcome = walk(&root, tag_reader.as_ref(), &tx);
        match &outcome {
            Ok(summary) => tracing::info!(
                target: "scanner",
                root = %root.display(),
                discovered = summary.discovered,
                skipped = summary.skipped,
                "Scan finished"
            ),
            Err(e) => tracing::error!(target: "scanner", root = %root.display(), error = %e, "Scan aborted"),
        }
        // Close the record channel before reporting completion
        drop(tx);
        let _ = done_tx.send(outcome);
    });

    ScanHandle {
        records: rx,
        done: done_rx,
    }
}

fn walk(
    root: &Path,
    tag_reader: &dyn TagReader,
    tx: &mpsc::Sender<MediaFileRecord>,
) -> Result<ScanSummary> {
    let meta = fs::metadata(root).with_context(format!("opening scan root {}", root.display()))?;
    if !meta.is_dir() {
        return Err(Error::invalid_argument(format!(
            "scan root {} is not a directory",
            root.display()
        )));
    }

    let mut summary = ScanSummary::default();

    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                return Err(Error::Io(e.into()).context(format!("opening scan root {}", root.display())));
            }
            Err(e) => {
                tracing::warn!(target: "scanner", error = %e, "Skipping unreadable entry");
                summary.skipped += 1;
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if !is_audio_file(path) {
            tracing::debug!(target: "scanner", path = %path.display(), "Skipping non-audio file");
            continue;
        }
        summary.discovered += 1;

        let record = match read_record(root, path, tag_reader) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(target: "scanner", path = %path.display(), error = %e, "Skipping file");
                summary.skipped += 1;
                continue;
            }
        };

        // If the receiver is dropped, blocking_send returns an error and we stop scanning.
        if tx.blocking_send(record).is_err() {
            tracing::debug!(target: "scanner", "Consumer gone, stopping walk");
            break;
        }
        summary.emitted += 1;
    }

    Ok(summary)
}

/// Build the record for one audio file.
///
/// # Errors
///
/// Returns an error if the path is not valid UTF-8 (its stored key could
/// not be turned back into the file), the file is outside `root`, its tags
/// cannot be read, or its bytes cannot be fingerprinted.
pub fn read_record(root: &Path, path: &Path, tag_reader: &dyn TagReader) -> Result<MediaFileRecord> {
    if path.to_str().is_none() {
        return Err(Error::invalid_argument(format!(
            "{} is not valid UTF-8",
            path.display()
        )));
    }
    let (sub_dir, file_name) = split_relative(root, path).ok_or_else(|| {
        Error::invalid_argument(format!(
            "{} is not under {}",
            path.display(),
            root.display()
        ))
    })?;

    let meta = fs::metadata(path).with_context(format!("reading {}", path.display()))?;
    let tags = tag_reader.read(path)?;
    let file_hash = hash::fingerprint_file(path)
        .with_context(format!("hashing {}", path.display()))?
        .into_string();

    let extension = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default();

    Ok(MediaFileRecord {
        id: None,
        root_dir: root.to_string_lossy().into_owned(),
        sub_dir,
        file_name,
        extension,
        // Birth time is not recorded on every filesystem
        created_at: meta.created().ok().map(DateTime::<Utc>::from),
        modified_at: meta.modified().ok().map(DateTime::<Utc>::from),
        tags,
        probe: None,
        status: TrackStatus::New,
        file_hash,
        cover_hash: None,
        cover_path: None,
        artist_id: None,
        album_id: None,
    })
}
