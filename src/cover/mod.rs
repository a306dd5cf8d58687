//! Cover art extraction and storage.
//!
//! An extractor writes a single image for a media file to a path inside the
//! store's scratch directory; [`extract_and_store`] then moves it into the
//! content-addressed layout. Two extractors are provided:
//!
//! 1. **External tools** - `metaflac` for FLAC, `ffmpeg` for everything else
//! 2. **Embedded tags** - the front cover read directly with lofty
//!
//! Extraction failure is a per-file failure; the caller logs it and moves on.

mod embedded;
mod tools;

pub use embedded::EmbeddedExtractor;
pub use tools::ToolExtractor;

use std::fs;
use std::path::Path;

use crate::config::{CoverSource, ToolsConfig};
use crate::error::{Error, Result};
use crate::store::{ContentStore, StoredBlob};

/// Writes the cover image of a media file to a given path.
pub trait CoverExtractor: Send + Sync {
    /// Extract the cover of `media` into `dest`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Extraction`] or [`Error::ExternalTool`] when no image
    /// could be produced.
    fn extract(&self, media: &Path, dest: &Path) -> Result<()>;
}

/// Build the extractor selected in the tool settings.
pub fn extractor_for(tools: &ToolsConfig) -> Box<dyn CoverExtractor> {
    match tools.cover_source {
        CoverSource::Tools => Box::new(ToolExtractor::new(&tools.ffmpeg, &tools.metaflac)),
        CoverSource::Embedded => Box::new(EmbeddedExtractor),
    }
}

/// Extract the cover of `media` and place it in the store.
///
/// The image is written to a fresh scratch file and only becomes visible in
/// the store through the final rename. The scratch file never outlives the
/// call.
///
/// # Errors
///
/// Returns [`Error::Extraction`] if the extractor fails or leaves no bytes
/// behind, or an IO error if the image cannot be placed.
pub fn extract_and_store(
    store: &ContentStore,
    extractor: &dyn CoverExtractor,
    media: &Path,
) -> Result<StoredBlob> {
    let scratch = store.scratch_path("cover");

    let produced = extractor
        .extract(media, &scratch)
        .and_then(|()| match fs::metadata(&scratch) {
            Ok(meta) if meta.len() > 0 => Ok(()),
            Ok(_) => Err(Error::extraction(media, "extractor produced an empty image")),
            Err(_) => Err(Error::extraction(media, "extractor produced no output")),
        });

    if let Err(e) = produced {
        let _ = fs::remove_file(&scratch);
        return Err(e);
    }

    store.put(&scratch)
}
