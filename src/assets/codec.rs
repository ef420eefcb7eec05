//! Image Codec Helpers
//!
//! Content-type detection and JPEG re-encoding used by the uploader and the
//! image cache.

use crate::error::{Error, Result};
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{GenericImageView, ImageFormat};
use std::io::Cursor;

pub const OCTET_STREAM: &str = "application/octet-stream";

/// Result of re-encoding an image
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub bytes: Bytes,
    pub width: u32,
    pub height: u32,
    pub content_type: &'static str,
}

/// Effective content type of a payload
///
/// The declared type wins (parameters stripped); otherwise the bytes are
/// sniffed, and anything unrecognized is `application/octet-stream`.
pub fn content_type_of(declared: Option<&str>, bytes: &[u8]) -> String {
    declared
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .filter(|ct| !ct.is_empty())
        .or_else(|| {
            image::guess_format(bytes)
                .ok()
                .map(|format| format.to_mime_type().to_string())
        })
        .unwrap_or_else(|| OCTET_STREAM.to_string())
}

/// Preferred file extension for a content type
pub fn extension_for(content_type: &str) -> &'static str {
    ImageFormat::from_mime_type(content_type)
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or("bin")
}

/// Downsize to at most `max_width` (aspect ratio kept) and re-encode as JPEG
pub fn encode_jpeg(bytes: &[u8], max_width: u32, quality: u8) -> Result<EncodedImage> {
    if max_width == 0 {
        return Err(Error::Compression("max width must be positive".to_string()));
    }

    let decoded = image::load_from_memory(bytes)
        .map_err(|e| Error::Compression(format!("decode failed: {}", e)))?;

    let (width, height) = decoded.dimensions();
    let resized = if width > max_width {
        let scaled_height = ((height as u64 * max_width as u64) / width as u64).max(1) as u32;
        decoded.resize_exact(max_width, scaled_height, FilterType::Triangle)
    } else {
        decoded
    };

    let rgb = resized.to_rgb8();
    let mut out = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
        .encode_image(&rgb)
        .map_err(|e| Error::Compression(format!("encode failed: {}", e)))?;

    Ok(EncodedImage {
        bytes: Bytes::from(out.into_inner()),
        width: rgb.width(),
        height: rgb.height(),
        content_type: "image/jpeg",
    })
}

#[cfg(test)]
pub(crate) fn sample_png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x * y) % 256) as u8])
    });
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)
        .expect("encoding a generated image succeeds");
    out.into_inner()
}
