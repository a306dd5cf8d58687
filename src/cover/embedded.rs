//! Extract cover art embedded in audio file tags.
//!
//! Uses lofty to read picture data from:
//! - ID3v2 tags (MP3)
//! - Vorbis comments (FLAC, OGG)
//! - MP4 atoms (M4A/AAC)
//!
//! The store only holds JPEG blobs, so PNG and other picture formats are
//! decoded and re-encoded as JPEG before they are written.

use image::{DynamicImage, ImageFormat};
use lofty::file::TaggedFileExt;
use lofty::picture::PictureType;
use lofty::probe::Probe;
use std::fs;
use std::io::Cursor;
use std::path::Path;

use super::CoverExtractor;
use crate::error::{Error, Result};

/// [`CoverExtractor`] that needs no external tools.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedExtractor;

impl CoverExtractor for EmbeddedExtractor {
    fn extract(&self, media: &Path, dest: &Path) -> Result<()> {
        let tagged_file = Probe::open(media)
            .map_err(|e| Error::extraction(media, format!("failed to open file: {e}")))?
            .read()
            .map_err(|e| Error::extraction(media, format!("failed to read tags: {e}")))?;

        // Prefer the front cover of any tag, fall back to the first picture
        let pictures: Vec<_> = tagged_file.tags().iter().flat_map(|t| t.pictures()).collect();
        let picture = pictures
            .iter()
            .find(|p| p.pic_type() == PictureType::CoverFront)
            .or_else(|| pictures.first())
            .ok_or_else(|| Error::extraction(media, "no embedded picture"))?;

        let jpeg = to_jpeg(media, picture.data())?;
        fs::write(dest, jpeg)?;
        Ok(())
    }
}

/// JPEG bytes for an embedded picture.
///
/// The declared MIME type is not trusted; the format is sniffed from the
/// bytes. JPEG data passes through untouched.
fn to_jpeg(media: &Path, data: &[u8]) -> Result<Vec<u8>> {
    if matches!(image::guess_format(data), Ok(ImageFormat::Jpeg)) {
        return Ok(data.to_vec());
    }

    let img = image::load_from_memory(data)
        .map_err(|e| Error::extraction(media, format!("unsupported embedded picture: {e}")))?;

    // The JPEG encoder rejects alpha channels
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut buffer = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Jpeg)
        .map_err(|e| Error::extraction(media, format!("failed to encode JPEG: {e}")))?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cover::extract_and_store;
    use crate::store::ContentStore;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), format).unwrap();
        buffer
    }

    fn png_cover() -> Vec<u8> {
        let img = RgbaImage::from_pixel(4, 4, Rgba([200, 30, 30, 128]));
        encode(DynamicImage::ImageRgba8(img), ImageFormat::Png)
    }

    fn jpeg_cover() -> Vec<u8> {
        let img = RgbImage::from_pixel(4, 4, Rgb([30, 30, 200]));
        encode(DynamicImage::ImageRgb8(img), ImageFormat::Jpeg)
    }

    fn metadata_block(kind: u8, last: bool, body: &[u8]) -> Vec<u8> {
        let len = u32::try_from(body.len()).unwrap().to_be_bytes();
        let mut block = vec![if last { kind | 0x80 } else { kind }, len[1], len[2], len[3]];
        block.extend_from_slice(body);
        block
    }

    /// A FLAC stream with no audio frames and a single front-cover picture.
    fn flac_with_picture(mime: &str, data: &[u8]) -> Vec<u8> {
        // 4096-sample blocks, 44.1 kHz, stereo, 16-bit, unknown length
        let mut streaminfo = vec![0x10, 0x00, 0x10, 0x00, 0, 0, 0, 0, 0, 0];
        streaminfo.extend_from_slice(&[0x0A, 0xC4, 0x42, 0xF0, 0, 0, 0, 0]);
        streaminfo.extend_from_slice(&[0; 16]);

        let vendor = b"music-catalog";
        let mut comments = (vendor.len() as u32).to_le_bytes().to_vec();
        comments.extend_from_slice(vendor);
        comments.extend_from_slice(&0u32.to_le_bytes());

        let mut picture = Vec::new();
        picture.extend_from_slice(&3u32.to_be_bytes()); // front cover
        picture.extend_from_slice(&(mime.len() as u32).to_be_bytes());
        picture.extend_from_slice(mime.as_bytes());
        picture.extend_from_slice(&0u32.to_be_bytes()); // description
        for field in [4u32, 4, 24, 0] {
            picture.extend_from_slice(&field.to_be_bytes());
        }
        picture.extend_from_slice(&(data.len() as u32).to_be_bytes());
        picture.extend_from_slice(data);

        let mut flac = b"fLaC".to_vec();
        flac.extend(metadata_block(0, false, &streaminfo));
        flac.extend(metadata_block(4, false, &comments));
        flac.extend(metadata_block(6, true, &picture));
        flac
    }

    fn write_flac(dir: &TempDir, name: &str, mime: &str, data: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, flac_with_picture(mime, data)).unwrap();
        path
    }

    #[test]
    fn test_extract_from_nonexistent_file() {
        let dir = TempDir::new().unwrap();
        let result = EmbeddedExtractor.extract(Path::new("nonexistent.mp3"), &dir.path().join("c.jpg"));
        assert!(matches!(result, Err(Error::Extraction { .. })));
    }

    #[test]
    fn test_extract_from_non_audio_file() {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        writeln!(file, "Not an audio file").expect("Failed to write");
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("c.jpg");

        assert!(EmbeddedExtractor.extract(file.path(), &dest).is_err());
        assert!(!dest.exists());
    }

    #[test]
    fn test_png_cover_stored_as_jpeg() {
        let dir = TempDir::new().unwrap();
        let store = ContentStore::open(dir.path().join("out")).unwrap();
        let flac = write_flac(&dir, "png.flac", "image/png", &png_cover());

        let blob = extract_and_store(&store, &EmbeddedExtractor, &flac).unwrap();

        let stored = fs::read(&blob.path).unwrap();
        assert_eq!(blob.path.extension().unwrap(), "jpg");
        assert_eq!(&stored[..3], &[0xFF, 0xD8, 0xFF]);
        assert_eq!(image::guess_format(&stored).unwrap(), ImageFormat::Jpeg);
        assert_eq!(image::load_from_memory(&stored).unwrap().width(), 4);
    }

    #[test]
    fn test_jpeg_cover_passes_through() {
        let dir = TempDir::new().unwrap();
        let cover = jpeg_cover();
        let flac = write_flac(&dir, "jpeg.flac", "image/jpeg", &cover);
        let dest = dir.path().join("cover.jpg");

        EmbeddedExtractor.extract(&flac, &dest).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), cover);
    }

    #[test]
    fn test_mislabeled_png_is_still_converted() {
        let dir = TempDir::new().unwrap();
        let flac = write_flac(&dir, "liar.flac", "image/jpeg", &png_cover());
        let dest = dir.path().join("cover.jpg");

        EmbeddedExtractor.extract(&flac, &dest).unwrap();
        assert_eq!(image::guess_format(&fs::read(&dest).unwrap()).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn test_undecodable_picture_is_extraction_error() {
        let dir = TempDir::new().unwrap();
        let flac = write_flac(&dir, "junk.flac", "image/png", b"definitely not an image");
        let dest = dir.path().join("cover.jpg");

        let err = EmbeddedExtractor.extract(&flac, &dest).unwrap_err();
        assert!(matches!(err, Error::Extraction { .. }));
        assert!(!dest.exists());
    }
}
