//! Cover extraction through external tools.
//!
//! FLAC pictures live in a metadata block that `metaflac` exports as-is;
//! every other container goes through `ffmpeg`, which writes the first
//! attached-picture frame.

use std::path::Path;
use std::process::{Command, Output};

use super::CoverExtractor;
use crate::error::{Error, Result};

/// [`CoverExtractor`] that shells out to `metaflac` / `ffmpeg`.
#[derive(Debug, Clone)]
pub struct ToolExtractor {
    ffmpeg: String,
    metaflac: String,
}

impl ToolExtractor {
    /// Use the given executable names or paths.
    pub fn new(ffmpeg: impl Into<String>, metaflac: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            metaflac: metaflac.into(),
        }
    }

    /// The command that extracts the cover of `media` into `dest`.
    fn command(&self, media: &Path, dest: &Path) -> Command {
        if is_flac(media) {
            let mut cmd = Command::new(&self.metaflac);
            let mut export = std::ffi::OsString::from("--export-picture-to=");
            export.push(dest);
            cmd.arg(export).arg(media);
            cmd
        } else {
            let mut cmd = Command::new(&self.ffmpeg);
            cmd.args(["-loglevel", "quiet", "-y", "-i"])
                .arg(media)
                .args(["-an", "-frames:v", "1", "-update", "1"])
                .arg(dest);
            cmd
        }
    }
}

impl Default for ToolExtractor {
    fn default() -> Self {
        Self::new("ffmpeg", "metaflac")
    }
}

impl CoverExtractor for ToolExtractor {
    fn extract(&self, media: &Path, dest: &Path) -> Result<()> {
        let mut cmd = self.command(media, dest);
        let program = cmd.get_program().to_string_lossy().into_owned();
        tracing::debug!(target: "cover", tool = %program, path = %media.display(), "Extracting cover");

        let output: Output = cmd
            .output()
            .map_err(|e| Error::tool(&program, format!("failed to run: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::extraction(
                media,
                format!("{} exited with {}: {}", program, output.status, stderr.trim()),
            ));
        }
        Ok(())
    }
}

fn is_flac(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("flac"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(cmd: &Command) -> Vec<String> {
        cmd.get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_flac_uses_metaflac() {
        let extractor = ToolExtractor::default();
        let cmd = extractor.command(Path::new("/music/a.FLAC"), Path::new("/out/temp/c.jpg"));

        assert_eq!(cmd.get_program(), "metaflac");
        assert_eq!(
            args(&cmd),
            vec!["--export-picture-to=/out/temp/c.jpg", "/music/a.FLAC"]
        );
    }

    #[test]
    fn test_other_formats_use_ffmpeg() {
        let extractor = ToolExtractor::new("/opt/ffmpeg", "metaflac");
        let cmd = extractor.command(Path::new("/music/a.mp3"), Path::new("/out/temp/c.jpg"));

        assert_eq!(cmd.get_program(), "/opt/ffmpeg");
        let args = args(&cmd);
        assert_eq!(args[..4], ["-loglevel", "quiet", "-y", "-i"]);
        assert_eq!(args[4], "/music/a.mp3");
        assert!(args.windows(2).any(|w| w == ["-frames:v", "1"]));
        assert_eq!(args.last().map(String::as_str), Some("/out/temp/c.jpg"));
    }

    #[test]
    fn test_missing_tool_fails() {
        let extractor = ToolExtractor::new("no-such-ffmpeg-binary", "no-such-metaflac-binary");
        let err = extractor
            .extract(Path::new("a.mp3"), Path::new("c.jpg"))
            .unwrap_err();
        assert!(matches!(err, Error::ExternalTool { .. }));
    }
}
