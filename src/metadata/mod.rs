//! Embedded tag reading.
//!
//! Uses the lofty crate for format-independent metadata access (ID3v2,
//! Vorbis comments, MP4 atoms, ...). The scanner depends on the
//! [`TagReader`] trait rather than lofty directly so tests can feed fixed
//! tags for files that are not real audio.

use lofty::file::{AudioFile, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::{Accessor, ItemKey};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

/// Tag and stream properties read from one audio file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackTags {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub year: Option<u32>,
    pub genre: Option<String>,
    /// Audio bit rate in kbps
    pub bit_rate: Option<u32>,
    /// Sample rate in Hz
    pub sample_rate: Option<u32>,
    pub channels: Option<u8>,
    pub duration: Duration,
    pub track_number: Option<u32>,
    /// MusicBrainz artist id, used as the enrichment lookup key
    pub musicbrainz_artist_id: Option<String>,
}

/// Reads embedded metadata from an audio file.
pub trait TagReader: Send + Sync {
    /// Read tags and stream properties.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Metadata`] if the file cannot be opened or parsed.
    fn read(&self, path: &Path) -> Result<TrackTags>;
}

/// [`TagReader`] backed by lofty.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoftyTagReader;

impl TagReader for LoftyTagReader {
    fn read(&self, path: &Path) -> Result<TrackTags> {
        // Probe the file to determine format and read tags
        let tagged_file = Probe::open(path)
            .map_err(|e| Error::metadata(path, format!("failed to open file for probing: {e}")))?
            .read()
            .map_err(|e| Error::metadata(path, format!("failed to read file metadata: {e}")))?;

        let properties = tagged_file.properties();
        let mut tags = TrackTags {
            bit_rate: properties.audio_bitrate(),
            sample_rate: properties.sample_rate(),
            channels: properties.channels(),
            duration: properties.duration(),
            ..Default::default()
        };

        // Get the primary tag, or fall back to the first available tag
        let Some(tag) = tagged_file
            .primary_tag()
            .or_else(|| tagged_file.first_tag())
        else {
            return Ok(tags);
        };

        tags.title = non_blank(tag.title().as_deref());
        tags.artist = non_blank(tag.artist().as_deref());
        tags.album = non_blank(tag.album().as_deref());
        tags.genre = non_blank(tag.genre().as_deref());
        tags.year = tag.year();
        tags.track_number = tag.track();
        tags.album_artist = non_blank(tag.get_string(&ItemKey::AlbumArtist));
        tags.musicbrainz_artist_id = non_blank(tag.get_string(&ItemKey::MusicBrainzArtistId));

        Ok(tags)
    }
}

/// Trimmed owned copy of a tag value, `None` when missing or blank.
pub fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
