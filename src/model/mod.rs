//! Core data models for the catalog.
//!
//! Defines the scanned [`MediaFileRecord`] and its [`TrackStatus`]. Artist
//! and album rows are written through [`crate::db::catalog`].
//!
//! # Database Schema
//!
//! The models map to the following tables:
//! - `tracks` - One row per audio file, unique on (root, subdirectory, file name)
//! - `artists` - Artist records with unique names
//! - `albums` - Albums unique on (name, album artist)
//! - `coverart` - Content-addressed cover images, unique on hash

use chrono::{DateTime, Utc};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::metadata::TrackTags;
use crate::probe::ProbeReport;

/// Artist name used when a file carries no artist tag.
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

/// Album name used when a file carries no album tag.
pub const UNKNOWN_ALBUM: &str = "Unknown Album";

/// Lifecycle of a track record.
///
/// Records start as `New` (or `Updated` when a previously enriched file's
/// content changed) and advance to `Cover` once enrichment commits. A failed
/// enrichment leaves the status untouched so the next run retries it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackStatus {
    /// Discovered, not yet enriched
    New,
    /// Content changed since the last enrichment
    Updated,
    /// Cover art, artist and album resolved
    Cover,
}

impl TrackStatus {
    /// Convert to string representation for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackStatus::New => "new",
            TrackStatus::Updated => "updated",
            TrackStatus::Cover => "cover",
        }
    }

    /// Whether the enrichment workers should pick this record up.
    pub fn is_pending(&self) -> bool {
        matches!(self, TrackStatus::New | TrackStatus::Updated)
    }
}

impl fmt::Display for TrackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TrackStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(TrackStatus::New),
            "updated" => Ok(TrackStatus::Updated),
            "cover" => Ok(TrackStatus::Cover),
            other => Err(Error::invalid_argument(format!("unknown track status {:?}", other))),
        }
    }
}

/// One discovered audio file.
///
/// Identity is the natural key (root directory, subdirectory, file name);
/// rescans update the existing row instead of adding a new one.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaFileRecord {
    /// Database ID (None until persisted)
    pub id: Option<i64>,
    /// Scan root as given on the command line
    pub root_dir: String,
    /// Directory relative to the root ("" for files directly in the root)
    pub sub_dir: String,
    pub file_name: String,
    /// Lowercase extension including the dot (".flac")
    pub extension: String,
    /// Birth time, when the filesystem records one
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
    pub tags: TrackTags,
    /// Raw probe-tool description
    pub probe: Option<ProbeReport>,
    pub status: TrackStatus,
    /// Fingerprint of the full file contents
    pub file_hash: String,
    /// Fingerprint of the stored cover art (after enrichment)
    pub cover_hash: Option<String>,
    /// Cover location relative to the store root (after enrichment)
    pub cover_path: Option<String>,
    pub artist_id: Option<i64>,
    pub album_id: Option<i64>,
}

impl MediaFileRecord {
    /// Absolute path of the audio file.
    pub fn path(&self) -> PathBuf {
        let mut path = PathBuf::from(&self.root_dir);
        if !self.sub_dir.is_empty() {
            path.push(&self.sub_dir);
        }
        path.push(&self.file_name);
        path
    }

    /// Artist name used as the artist natural key.
    pub fn artist_name(&self) -> &str {
        self.tags
            .artist
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(UNKNOWN_ARTIST)
    }

    /// Album name used in the album natural key.
    pub fn album_name(&self) -> &str {
        self.tags
            .album
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(UNKNOWN_ALBUM)
    }

    /// Album artist, falling back to the track artist when absent or blank.
    pub fn album_artist_name(&self) -> &str {
        self.tags
            .album_artist
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.artist_name())
    }

    /// MusicBrainz artist id from tags or, failing that, the probe report.
    pub fn musicbrainz_artist_id(&self) -> Option<&str> {
        self.tags
            .musicbrainz_artist_id
            .as_deref()
            .or_else(|| self.probe.as_ref().and_then(|p| p.musicbrainz_artist_id()))
    }
}

/// Split `path` into (subdirectory, file name) relative to `root`.
///
/// Returns `None` when the path is not under the root, has no file name, or
/// has a component that is not valid UTF-8.
pub fn split_relative(root: &Path, path: &Path) -> Option<(String, String)> {
    let relative = path.strip_prefix(root).ok()?;
    let file_name = relative.file_name()?.to_str()?.to_string();
    let sub_dir = match relative.parent() {
        Some(parent) => parent
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<Vec<_>>>()?
            .join("/"),
        None => String::new(),
    };
    Some((sub_dir, file_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::mock_record;

    #[test]
    fn test_status_roundtrip() {
        for status in [TrackStatus::New, TrackStatus::Updated, TrackStatus::Cover] {
            assert_eq!(status.as_str().parse::<TrackStatus>().unwrap(), status);
        }
        assert!("done".parse::<TrackStatus>().is_err());
    }

    #[test]
    fn test_pending_statuses() {
        assert!(TrackStatus::New.is_pending());
        assert!(TrackStatus::Updated.is_pending());
        assert!(!TrackStatus::Cover.is_pending());
    }

    #[test]
    fn test_record_path() {
        let mut record = mock_record("Albums/OK Computer", "01 Airbag.mp3");
        record.root_dir = "/music".to_string();
        assert_eq!(
            record.path(),
            PathBuf::from("/music/Albums/OK Computer/01 Airbag.mp3")
        );

        record.sub_dir = String::new();
        assert_eq!(record.path(), PathBuf::from("/music/01 Airbag.mp3"));
    }

    #[test]
    fn test_album_artist_falls_back_to_artist() {
        let mut record = mock_record("", "a.mp3");
        record.tags.artist = Some("Y".to_string());
        record.tags.album_artist = Some("  ".to_string());
        assert_eq!(record.album_artist_name(), "Y");

        record.tags.album_artist = None;
        assert_eq!(record.album_artist_name(), "Y");

        record.tags.album_artist = Some("Various Artists".to_string());
        assert_eq!(record.album_artist_name(), "Various Artists");
    }

    #[test]
    fn test_missing_names_use_placeholders() {
        let mut record = mock_record("", "a.mp3");
        record.tags.artist = None;
        record.tags.album = Some(String::new());
        assert_eq!(record.artist_name(), UNKNOWN_ARTIST);
        assert_eq!(record.album_name(), UNKNOWN_ALBUM);
        assert_eq!(record.album_artist_name(), UNKNOWN_ARTIST);
    }

    #[test]
    fn test_split_relative() {
        let root = Path::new("/music");
        assert_eq!(
            split_relative(root, Path::new("/music/a/b/song.flac")),
            Some(("a/b".to_string(), "song.flac".to_string()))
        );
        assert_eq!(
            split_relative(root, Path::new("/music/song.flac")),
            Some((String::new(), "song.flac".to_string()))
        );
        assert_eq!(split_relative(root, Path::new("/other/song.flac")), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_split_relative_rejects_non_utf8() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let root = Path::new("/music");
        let bad_name = root.join(OsStr::from_bytes(b"caf\xe9.mp3"));
        let bad_dir = root.join(OsStr::from_bytes(b"caf\xe9")).join("song.mp3");
        assert_eq!(split_relative(root, &bad_name), None);
        assert_eq!(split_relative(root, &bad_dir), None);
    }
}
