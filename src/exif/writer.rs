use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, DynamicImage, ImageFormat, ImageReader};
use img_parts::jpeg::Jpeg;
use img_parts::png::Png;
use img_parts::webp::WebP;
use img_parts::{Bytes, ImageEXIF};
use little_exif::exif_tag::ExifTag;
use little_exif::filetype::FileExtension;
use little_exif::metadata::Metadata;
use std::io::Cursor;
use std::path::Path;

use super::tiff::insert_date_time_original;
use crate::pipeline::ImageKind;

// little_exif as_u8_vec(JPEG) returns: [APP1 marker 2B][length 2B][Exif\0\0 6B][TIFF data]
// img-parts set_exif() expects just the TIFF data (after Exif\0\0)
const JPEG_EXIF_OVERHEAD: usize = 10; // 2 + 2 + 6

/// Result of writing a rewritten image.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteResult {
    /// `false` for formats with no EXIF container (BMP, GIF).
    pub tag_embedded: bool,
}

/// Decode an image fully into memory, guessing the format from its content.
pub fn decode_image(path: &Path) -> Result<DynamicImage> {
    ImageReader::open(path)
        .context("Failed to open image")?
        .with_guessed_format()
        .context("Failed to detect image format")?
        .decode()
        .context("Cannot identify image file")
}

/// Write `image` to `dest` as a fresh encode carrying only a
/// `DateTimeOriginal` tag with `date_time`.
///
/// The whole file is assembled in memory and written once, so a failure
/// never leaves a partial output behind.
pub fn write_with_creation_time(
    image: &DynamicImage,
    dest: &Path,
    kind: ImageKind,
    date_time: &str,
) -> Result<WriteResult> {
    let encoded = encode(image, kind)?;

    let (bytes, tag_embedded) = match kind {
        ImageKind::Jpeg => {
            let mut jpeg = Jpeg::from_bytes(Bytes::from(encoded))
                .map_err(|e| anyhow::anyhow!("Failed to parse JPEG: {e}"))?;
            jpeg.set_exif(Some(build_exif_tiff(date_time)?));
            (jpeg.encoder().bytes().to_vec(), true)
        }
        ImageKind::Png => {
            let mut png = Png::from_bytes(Bytes::from(encoded))
                .map_err(|e| anyhow::anyhow!("Failed to parse PNG: {e}"))?;
            png.set_exif(Some(build_exif_tiff(date_time)?));
            (png.encoder().bytes().to_vec(), true)
        }
        ImageKind::WebP => {
            let mut webp = WebP::from_bytes(Bytes::from(encoded))
                .map_err(|e| anyhow::anyhow!("Failed to parse WebP: {e}"))?;
            webp.set_exif(Some(build_exif_tiff(date_time)?));
            (webp.encoder().bytes().to_vec(), true)
        }
        ImageKind::Tiff => {
            let tagged = insert_date_time_original(&encoded, date_time)
                .context("Failed to embed EXIF into TIFF")?;
            (tagged, true)
        }
        ImageKind::Bmp | ImageKind::Gif => {
            log::warn!(
                "{} cannot carry EXIF; writing {} without a capture timestamp",
                kind.name(),
                dest.display()
            );
            (encoded, false)
        }
        ImageKind::Heic => anyhow::bail!("HEIC encoding is not supported"),
    };

    std::fs::write(dest, &bytes).context("Failed to write image file")?;
    Ok(WriteResult { tag_embedded })
}

/// Encode pixels at maximum quality in the target format.
fn encode(image: &DynamicImage, kind: ImageKind) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());

    match kind {
        ImageKind::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut buf, 100);
            jpeg_compatible(image)
                .write_with_encoder(encoder)
                .context("Failed to encode JPEG")?;
        }
        ImageKind::WebP => {
            webp_compatible(image)
                .write_to(&mut buf, ImageFormat::WebP)
                .context("Failed to encode WebP")?;
        }
        _ => {
            let format = kind
                .image_format()
                .with_context(|| format!("No encoder for {}", kind.name()))?;
            image
                .write_to(&mut buf, format)
                .with_context(|| format!("Failed to encode {}", kind.name()))?;
        }
    }

    Ok(buf.into_inner())
}

/// JPEG stores 8-bit gray or RGB only.
fn jpeg_compatible(image: &DynamicImage) -> DynamicImage {
    match image.color() {
        ColorType::L8 | ColorType::Rgb8 => image.clone(),
        ColorType::L16 | ColorType::La8 | ColorType::La16 => {
            DynamicImage::ImageLuma8(image.to_luma8())
        }
        _ => DynamicImage::ImageRgb8(image.to_rgb8()),
    }
}

/// The lossless WebP encoder takes 8-bit RGB or RGBA.
fn webp_compatible(image: &DynamicImage) -> DynamicImage {
    match image.color() {
        ColorType::Rgb8 | ColorType::Rgba8 => image.clone(),
        c if c.has_alpha() => DynamicImage::ImageRgba8(image.to_rgba8()),
        _ => DynamicImage::ImageRgb8(image.to_rgb8()),
    }
}

fn creation_time_metadata(date_time: &str) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.set_tag(ExifTag::DateTimeOriginal(date_time.to_string()));
    metadata
}

/// Build a raw TIFF-structured EXIF block holding only `DateTimeOriginal`.
fn build_exif_tiff(date_time: &str) -> Result<Bytes> {
    let exif_bytes = creation_time_metadata(date_time).as_u8_vec(FileExtension::JPEG);
    if exif_bytes.len() <= JPEG_EXIF_OVERHEAD {
        anyhow::bail!("little_exif produced an empty EXIF block");
    }
    Ok(Bytes::from(exif_bytes[JPEG_EXIF_OVERHEAD..].to_vec()))
}

impl ImageKind {
    /// Encoder format for this kind, if the image crate can write it.
    fn image_format(self) -> Option<ImageFormat> {
        match self {
            Self::Jpeg => Some(ImageFormat::Jpeg),
            Self::Png => Some(ImageFormat::Png),
            Self::WebP => Some(ImageFormat::WebP),
            Self::Tiff => Some(ImageFormat::Tiff),
            Self::Bmp => Some(ImageFormat::Bmp),
            Self::Gif => Some(ImageFormat::Gif),
            Self::Heic => None,
        }
    }
}
