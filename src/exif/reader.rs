use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime};
use img_parts::jpeg::Jpeg;
use img_parts::png::Png;
use img_parts::webp::WebP;
use img_parts::{Bytes, ImageEXIF};
use nom_exif::*;
use std::path::Path;

use super::tiff::find_date_time_original;
use crate::pipeline::ImageKind;

const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Read the `DateTimeOriginal` tag from an image file.
///
/// The value is returned as stored, `YYYY:MM:DD HH:MM:SS`. Returns
/// `Ok(None)` when the image has no EXIF block, when the block lacks the tag,
/// or when the container cannot carry EXIF at all. Only a failure to read
/// the file is an error.
pub fn read_creation_time(path: &Path) -> Result<Option<String>> {
    let kind = ImageKind::from_path(path);

    let exif_block = match kind {
        Some(ImageKind::Jpeg | ImageKind::Png | ImageKind::WebP | ImageKind::Tiff) => {
            let bytes = std::fs::read(path).context("Failed to read image file")?;
            embedded_exif(bytes, kind)
        }
        _ => return read_with_nom_exif(path),
    };

    let Some(block) = exif_block else {
        log::debug!("No EXIF data found in {}", path.display());
        return Ok(None);
    };

    Ok(find_date_time_original(&block))
}

/// Pull the TIFF-structured EXIF block out of a container.
fn embedded_exif(bytes: Vec<u8>, kind: Option<ImageKind>) -> Option<Bytes> {
    let bytes = Bytes::from(bytes);
    match kind? {
        ImageKind::Jpeg => Jpeg::from_bytes(bytes).ok()?.exif(),
        ImageKind::Png => Png::from_bytes(bytes).ok()?.exif(),
        ImageKind::WebP => WebP::from_bytes(bytes).ok()?.exif(),
        ImageKind::Tiff => Some(bytes),
        _ => None,
    }
}

/// Fallback for containers img-parts does not handle (HEIC).
fn read_with_nom_exif(path: &Path) -> Result<Option<String>> {
    let file = std::fs::File::open(path).context("Failed to open image file")?;

    let ms = match MediaSource::file(file) {
        Ok(ms) => ms,
        Err(e) => {
            log::debug!("No EXIF container in {}: {e}", path.display());
            return Ok(None);
        }
    };

    if !ms.has_exif() {
        log::debug!("No EXIF data found in {}", path.display());
        return Ok(None);
    }

    let mut parser = MediaParser::new();
    let iter: ExifIter = match parser.parse(ms) {
        Ok(iter) => iter,
        Err(e) => {
            log::debug!("Unreadable EXIF in {}: {e}", path.display());
            return Ok(None);
        }
    };
    let exif: Exif = iter.into();

    Ok(exif
        .get(ExifTag::DateTimeOriginal)
        .and_then(entry_to_string)
        .map(|s| normalize_date_time(&s)))
}

/// Convert an EntryValue to an Option<String>.
fn entry_to_string(val: &EntryValue) -> Option<String> {
    let s = val.to_string();
    let s = s.trim().trim_matches('"').trim_end_matches('\0').to_string();
    if s.is_empty() { None } else { Some(s) }
}

/// nom-exif renders parsed times as RFC 3339 or `YYYY-MM-DD HH:MM:SS`;
/// bring them back to the EXIF layout.
fn normalize_date_time(value: &str) -> String {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return dt.format(EXIF_DATETIME_FORMAT).to_string();
    }
    for layout in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", EXIF_DATETIME_FORMAT] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, layout) {
            return dt.format(EXIF_DATETIME_FORMAT).to_string();
        }
    }
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exif::write_with_creation_time;
    use image::{DynamicImage, ImageFormat, RgbImage};
    use tempfile::TempDir;

    const STAMP: &str = "2023:11:14 22:13:20";

    #[test]
    fn plain_jpeg_has_no_creation_time() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plain.jpg");
        RgbImage::new(8, 8).save_with_format(&path, ImageFormat::Jpeg).unwrap();

        assert_eq!(read_creation_time(&path).unwrap(), None);
    }

    #[test]
    fn png_without_exif_has_no_creation_time() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plain.png");
        RgbImage::new(4, 4).save_with_format(&path, ImageFormat::Png).unwrap();

        assert_eq!(read_creation_time(&path).unwrap(), None);
    }

    #[test]
    fn non_image_bytes_have_no_creation_time() {
        let dir = TempDir::new().unwrap();
        for name in ["fake.gif", "fake.jpg", "fake.png", "fake.webp", "fake.tiff", "fake.heic"] {
            let path = dir.path().join(name);
            std::fs::write(&path, b"not really an image").unwrap();
            assert_eq!(read_creation_time(&path).unwrap(), None, "{name}");
        }
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(read_creation_time(&dir.path().join("gone.jpg")).is_err());
        assert!(read_creation_time(&dir.path().join("gone.heic")).is_err());
    }

    #[test]
    fn tag_reads_back_verbatim_for_every_taggable_kind() {
        let dir = TempDir::new().unwrap();
        let pixels = DynamicImage::ImageRgb8(RgbImage::new(6, 6));

        for (name, kind) in [
            ("t.jpg", ImageKind::Jpeg),
            ("t.png", ImageKind::Png),
            ("t.webp", ImageKind::WebP),
            ("t.tiff", ImageKind::Tiff),
        ] {
            let path = dir.path().join(name);
            write_with_creation_time(&pixels, &path, kind, STAMP).unwrap();
            assert_eq!(
                read_creation_time(&path).unwrap().as_deref(),
                Some(STAMP),
                "{name}"
            );
        }
    }

    #[test]
    fn nom_exif_times_are_normalized() {
        assert_eq!(normalize_date_time("2023-11-14 22:13:20"), STAMP);
        assert_eq!(normalize_date_time("2023-11-14T22:13:20+00:00"), STAMP);
        assert_eq!(normalize_date_time(STAMP), STAMP);
        assert_eq!(normalize_date_time("garbled"), "garbled");
    }
}
