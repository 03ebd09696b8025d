use std::io::Cursor;

use image::AnimationDecoder;

use crate::error::CatalogError;

/// Still/animated image container formats the catalog accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Webp,
}

impl ImageFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Webp => "image/webp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Gif => "gif",
            ImageFormat::Webp => "webp",
        }
    }

    pub fn is_animated_container(&self) -> bool {
        matches!(self, ImageFormat::Gif)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ImageMeta {
    pub format: ImageFormat,
    pub frame_count: u32,
}

/// Detects the container format from its magic bytes. Extension and declared
/// content-type are never trusted for this.
pub fn detect_format(bytes: &[u8]) -> Option<ImageFormat> {
    if bytes.len() >= 8 && bytes[..8] == [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A] {
        return Some(ImageFormat::Png);
    }
    if bytes.len() >= 3 && bytes[..3] == [0xFF, 0xD8, 0xFF] {
        return Some(ImageFormat::Jpeg);
    }
    if bytes.len() >= 6 && (&bytes[..6] == b"GIF87a" || &bytes[..6] == b"GIF89a") {
        return Some(ImageFormat::Gif);
    }
    if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return Some(ImageFormat::Webp);
    }
    None
}

/// sha256 of the raw bytes, used both as the dedup key and the enrichment
/// cache key.
pub fn hash(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Cheap inspection: detects format and, for animated containers, decodes
/// just far enough to count frames.
pub fn metadata(bytes: &[u8]) -> Result<ImageMeta, CatalogError> {
    let format = detect_format(bytes)
        .ok_or_else(|| CatalogError::Validation("unsupported image format".to_string()))?;

    let frame_count = if format.is_animated_container() {
        decode_gif_frames(bytes)?.len() as u32
    } else {
        1
    };

    Ok(ImageMeta {
        format,
        frame_count,
    })
}

fn decode_gif_frames(bytes: &[u8]) -> Result<Vec<image::Frame>, CatalogError> {
    let decoder = image::codecs::gif::GifDecoder::new(Cursor::new(bytes))
        .map_err(|e| CatalogError::Validation(format!("invalid gif: {e}")))?;
    let frames = decoder
        .into_frames()
        .collect_frames()
        .map_err(|e| CatalogError::Validation(format!("invalid gif frames: {e}")))?;
    Ok(frames)
}

/// Picks up to `count` roughly evenly-spaced frames and re-encodes each as a
/// standalone PNG, for handoff to the vision model. Static formats yield the
/// original bytes unchanged. Decode failures are tolerated by returning an
/// empty list; callers fall back to the raw bytes.
pub fn sample_frames(bytes: &[u8], count: usize, format: ImageFormat) -> Vec<Vec<u8>> {
    if !format.is_animated_container() {
        return vec![bytes.to_vec()];
    }

    let frames = match decode_gif_frames(bytes) {
        Ok(frames) if !frames.is_empty() => frames,
        _ => return Vec::new(),
    };

    let total = frames.len();
    let want = count.max(1).min(total);
    let mut out = Vec::with_capacity(want);
    for i in 0..want {
        let idx = i * total / want;
        let frame = &frames[idx];
        let img = image::DynamicImage::ImageRgba8(frame.buffer().clone());
        let mut buf = Cursor::new(Vec::new());
        if img.write_to(&mut buf, image::ImageFormat::Png).is_ok() {
            out.push(buf.into_inner());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes() -> Vec<u8> {
        let img = image::DynamicImage::ImageRgba8(image::RgbaImage::new(2, 2));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn detects_png_by_magic_bytes() {
        let bytes = png_bytes();
        assert_eq!(detect_format(&bytes), Some(ImageFormat::Png));
    }

    #[test]
    fn rejects_unknown_bytes() {
        assert_eq!(detect_format(b"not an image"), None);
    }

    #[test]
    fn static_image_metadata_has_one_frame() {
        let bytes = png_bytes();
        let meta = metadata(&bytes).unwrap();
        assert_eq!(meta.format, ImageFormat::Png);
        assert_eq!(meta.frame_count, 1);
    }

    #[test]
    fn static_image_sample_frames_returns_original_bytes() {
        let bytes = png_bytes();
        let frames = sample_frames(&bytes, 4, ImageFormat::Png);
        assert_eq!(frames, vec![bytes]);
    }
}
