use std::fs;
use std::io::Cursor;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use serde::Serialize;

use crate::error::{ImageGenError, Result};

/// An image decoded from an API payload, with the container format it
/// arrived in.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub image: DynamicImage,
    pub format: ImageFormat,
    pub byte_len: usize,
}

impl DecodedImage {
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub color: String,
    pub format: String,
    pub size_bytes: usize,
}

pub fn encode(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Base64 -> raw bytes. Tolerates embedded whitespace and a `data:` URL
/// prefix.
pub fn decode_bytes(b64: &str) -> Result<Vec<u8>> {
    let body = match b64.trim().split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => b64,
    };
    let cleaned: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if cleaned.is_empty() {
        return Err(ImageGenError::Decode("empty image payload".into()));
    }
    Ok(BASE64.decode(cleaned.as_bytes())?)
}

pub fn decode(b64: &str) -> Result<DecodedImage> {
    let bytes = decode_bytes(b64)?;
    let format = image::guess_format(&bytes)
        .map_err(|e| ImageGenError::Decode(format!("unrecognized image data: {}", e)))?;
    let image = image::load_from_memory_with_format(&bytes, format)?;
    Ok(DecodedImage {
        image,
        format,
        byte_len: bytes.len(),
    })
}

pub fn encode_png(image: &DynamicImage) -> Result<String> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png)?;
    Ok(encode(buf.get_ref()))
}

/// Writes the decoded payload bytes as-is, creating parent directories.
pub fn save(b64: &str, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let bytes = decode_bytes(b64)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| ImageGenError::io(parent, e))?;
        }
    }
    fs::write(path, &bytes).map_err(|e| ImageGenError::io(path, e))?;
    log::info!("💾 Image saved to: {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

/// Fits `image` inside `max_width` x `max_height`, keeping the aspect ratio.
/// Images that already fit come back untouched; this never upscales.
pub fn resize(image: &DecodedImage, max_width: u32, max_height: u32) -> DecodedImage {
    let (width, height) = image.dimensions();
    if width <= max_width && height <= max_height {
        return image.clone();
    }

    let ratio = f64::min(
        max_width as f64 / width as f64,
        max_height as f64 / height as f64,
    );
    let new_width = ((width as f64 * ratio).round() as u32).max(1);
    let new_height = ((height as f64 * ratio).round() as u32).max(1);

    DecodedImage {
        image: image.image.resize_exact(new_width, new_height, FilterType::Lanczos3),
        format: image.format,
        byte_len: image.byte_len,
    }
}

/// Downscaled PNG preview of a payload, re-encoded to base64.
pub fn thumbnail(b64: &str, max_width: u32, max_height: u32) -> Result<String> {
    let decoded = decode(b64)?;
    let small = resize(&decoded, max_width, max_height);
    encode_png(&small.image)
}

pub fn image_info(b64: &str) -> Result<ImageInfo> {
    let decoded = decode(b64)?;
    let (width, height) = decoded.dimensions();
    Ok(ImageInfo {
        width,
        height,
        color: format!("{:?}", decoded.image.color()),
        format: format!("{:?}", decoded.format),
        size_bytes: decoded.byte_len,
    })
}

/// `image_20250101_120000_2.png` for the image at `index` 1.
pub fn default_file_name(index: usize, timestamp: DateTime<Utc>) -> String {
    format!("image_{}_{}.png", timestamp.format("%Y%m%d_%H%M%S"), index + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use image::{Rgb, RgbImage};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]));
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[test]
    fn payload_bytes_survive_encode_decode() {
        let bytes = png_bytes(7, 5);
        assert_eq!(decode_bytes(&encode(&bytes)).unwrap(), bytes);

        let arbitrary: Vec<u8> = (0..=255u8).collect();
        assert_eq!(decode_bytes(&encode(&arbitrary)).unwrap(), arbitrary);
    }

    #[test]
    fn decode_reads_png_payload() {
        let b64 = encode(&png_bytes(12, 8));
        let decoded = decode(&b64).unwrap();
        assert_eq!(decoded.dimensions(), (12, 8));
        assert_eq!(decoded.format, ImageFormat::Png);

        let with_prefix = format!("data:image/png;base64,{}", b64);
        assert_eq!(decode(&with_prefix).unwrap().dimensions(), (12, 8));
    }

    #[test]
    fn decode_rejects_bad_input() {
        assert!(matches!(decode("!!!not base64!!!"), Err(ImageGenError::Decode(_))));
        assert!(matches!(decode(""), Err(ImageGenError::Decode(_))));
        // valid base64, not an image
        assert!(matches!(decode(&encode(b"hello world")), Err(ImageGenError::Decode(_))));
    }

    #[test]
    fn resize_never_upscales() {
        let decoded = decode(&encode(&png_bytes(40, 60))).unwrap();
        let same = resize(&decoded, 100, 100);
        assert_eq!(same.dimensions(), (40, 60));

        let exact = resize(&decoded, 40, 60);
        assert_eq!(exact.dimensions(), (40, 60));
    }

    #[test]
    fn resize_downscales_keeping_aspect() {
        let decoded = decode(&encode(&png_bytes(400, 200))).unwrap();
        assert_eq!(resize(&decoded, 100, 100).dimensions(), (100, 50));

        let portrait = decode(&encode(&png_bytes(1024, 1536))).unwrap();
        assert_eq!(resize(&portrait, 160, 240).dimensions(), (160, 240));
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("out.png");
        let bytes = png_bytes(3, 3);

        save(&encode(&bytes), &path).unwrap();
        assert_eq!(fs::read(&path).unwrap(), bytes);
    }

    #[test]
    fn save_reports_io_errors() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"x").unwrap();
        // parent is a regular file, so the write fails
        let path = blocker.join("out.png");
        assert!(matches!(save(&encode(&png_bytes(2, 2)), &path), Err(ImageGenError::Io { .. })));
    }

    #[test]
    fn thumbnail_and_info() {
        let b64 = encode(&png_bytes(300, 150));
        let thumb = thumbnail(&b64, 60, 60).unwrap();
        let info = image_info(&thumb).unwrap();
        assert_eq!((info.width, info.height), (60, 30));
        assert_eq!(info.format, "Png");
        assert_eq!(info.color, "Rgb8");
    }

    #[test]
    fn file_names_are_one_based() {
        let ts = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(default_file_name(0, ts), "image_20250102_030405_1.png");
        assert_eq!(default_file_name(4, ts), "image_20250102_030405_5.png");
    }
}
