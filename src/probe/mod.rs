//! Stream/format description via `ffprobe`.
//!
//! Shells out to `ffprobe` (part of FFmpeg) and keeps its structured JSON
//! description of the file. The report is persisted with the track as an
//! opaque blob; the pipeline only reads a few tags out of it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;

use crate::error::{Error, Result};

/// Parsed `ffprobe -show_format -show_streams` output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeReport {
    pub streams: Vec<ProbeStream>,
    pub format: ProbeFormat,
}

/// One stream entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeStream {
    pub index: u32,
    pub codec_name: Option<String>,
    pub codec_type: Option<String>,
    pub bit_rate: Option<String>,
    pub sample_rate: Option<String>,
    pub channels: Option<u32>,
    pub channel_layout: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration: Option<String>,
}

/// The container-level section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeFormat {
    pub filename: Option<String>,
    pub duration: Option<String>,
    pub bit_rate: Option<String>,
    pub size: Option<String>,
    pub tags: BTreeMap<String, String>,
}

impl ProbeReport {
    /// Container tag by name, ignoring case (`album_artist`, `ALBUM_ARTIST`, ...).
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.format
            .tags
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.trim().is_empty())
    }

    /// Album artist as reported by the container tags.
    pub fn album_artist(&self) -> Option<&str> {
        self.tag("album_artist").or_else(|| self.tag("albumartist"))
    }

    /// MusicBrainz artist id as written by common taggers.
    pub fn musicbrainz_artist_id(&self) -> Option<&str> {
        self.tag("MusicBrainz Artist Id")
            .or_else(|| self.tag("MUSICBRAINZ_ARTISTID"))
            .or_else(|| self.tag("musicbrainz_artistid"))
    }
}

/// Produces a structured description of a media file.
pub trait MediaProber: Send + Sync {
    /// Probe one file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExternalTool`] if the tool cannot run, exits
    /// unsuccessfully, or prints something that is not a probe report.
    fn probe(&self, path: &Path) -> Result<ProbeReport>;
}

/// [`MediaProber`] that runs the `ffprobe` executable.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    program: String,
}

impl FfprobeProber {
    /// Use the given executable name or path.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for FfprobeProber {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

impl MediaProber for FfprobeProber {
    fn probe(&self, path: &Path) -> Result<ProbeReport> {
        tracing::debug!(target: "probe", path = %path.display(), "Running ffprobe");

        let output = Command::new(&self.program)
            .arg("-i")
            .arg(path)
            .args(["-show_format", "-show_streams", "-print_format", "json", "-v", "quiet"])
            .output()
            .map_err(|e| Error::tool(&self.program, format!("failed to run: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::tool(
                &self.program,
                format!("{}: {}", output.status, stderr.trim()),
            ));
        }

        parse_report(&String::from_utf8_lossy(&output.stdout))
            .map_err(|e| Error::tool(&self.program, format!("invalid output: {}", e)))
    }
}

/// Parse ffprobe's JSON output.
pub fn parse_report(json: &str) -> std::result::Result<ProbeReport, serde_json::Error> {
    serde_json::from_str(json)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "streams": [
            {"index": 0, "codec_name": "mp3", "codec_type": "audio", "sample_rate": "44100",
             "channels": 2, "channel_layout": "stereo", "bit_rate": "320000", "duration": "241.5"},
            {"index": 1, "codec_name": "mjpeg", "codec_type": "video", "width": 600, "height": 600}
        ],
        "format": {
            "filename": "/music/airbag.mp3",
            "duration": "241.500000",
            "bit_rate": "320000",
            "size": "9662000",
            "tags": {
                "title": "Airbag",
                "artist": "Radiohead",
                "ALBUM_ARTIST": "Radiohead",
                "MusicBrainz Artist Id": "a74b1b7f-71a5-4011-9441-d0b5e4122711"
            }
        }
    }"#;

    #[test]
    fn test_parse_sample_report() {
        let report = parse_report(SAMPLE).unwrap();
        assert_eq!(report.streams.len(), 2);
        assert_eq!(report.streams[0].channels, Some(2));
        assert_eq!(report.format.size.as_deref(), Some("9662000"));
        assert_eq!(report.streams[1].codec_type.as_deref(), Some("video"));
    }

    #[test]
    fn test_tag_lookup_ignores_case() {
        let report = parse_report(SAMPLE).unwrap();
        assert_eq!(report.album_artist(), Some("Radiohead"));
        assert_eq!(report.tag("TITLE"), Some("Airbag"));
        assert_eq!(
            report.musicbrainz_artist_id(),
            Some("a74b1b7f-71a5-4011-9441-d0b5e4122711")
        );
        assert_eq!(report.tag("genre"), None);
    }

    #[test]
    fn test_parse_partial_report() {
        let report = parse_report(r#"{"format": {"filename": "x.flac"}}"#).unwrap();
        assert!(report.streams.is_empty());
        assert!(report.format.tags.is_empty());
    }

    #[test]
    fn test_parse_garbage_fails() {
        assert!(parse_report("not json").is_err());
    }

    #[test]
    fn test_missing_tool_is_external_tool_error() {
        let prober = FfprobeProber::new("definitely-not-a-real-ffprobe-binary");
        let err = prober.probe(Path::new("song.mp3")).unwrap_err();
        assert!(matches!(err, Error::ExternalTool { .. }));
    }
}
