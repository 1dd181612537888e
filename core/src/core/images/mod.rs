//! Upload normalization: sniff, decode, bound, re-encode as lossy WebP.
//!
//! The declared file name is only used to pick the extension of a preserved original;
//! the format is always decided from the bytes.

use crate::types::Limits;
use error::ImageError;
use image::{DynamicImage, GenericImageView, ImageDecoder, ImageFormat, ImageReader};
use std::io::{Cursor, Read};
use std::path::Path;

mod container;
pub use container::{ContainerDecoder, UnavailableDecoder, default_container_decoder};

#[cfg(feature = "heif")]
pub use container::LibHeifDecoder;

pub mod error {
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum ImageError {
        #[error("Upload exceeds {max} bytes")]
        PayloadTooLarge { max: u64 },

        #[error("Image exceeds {max} pixels")]
        TooManyPixels { max: u64 },

        #[error("Unsupported media type: {0}")]
        UnsupportedMediaType(String),

        #[error("Decode failed: {0}")]
        DecodeFailed(String),

        #[error("Encode failed: {0}")]
        EncodeFailed(String),

        #[error("Read failed: {0}")]
        Read(#[source] std::io::Error),

        #[error("Write failed: {0}")]
        WriteFailed(#[source] std::io::Error),
    }
}

/// Extension of every normalized file.
pub const OUTPUT_EXTENSION: &str = "webp";

/// Names written for one upload, relative to the images directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedImage {
    pub stored: String,
    /// Untouched source bytes, kept for container formats only.
    pub original: Option<String>,
}

impl NormalizedImage {
    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.stored.as_str()).chain(self.original.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sniffed {
    Raster(ImageFormat),
    WebP,
    /// ISO-BMFF still image (HEIC/HEIF/AVIF); carries the canonical extension.
    Container(&'static str),
}

const CONTAINER_BRANDS: &[(&[u8; 4], &str)] = &[
    (b"heic", "heic"),
    (b"heix", "heic"),
    (b"hevc", "heic"),
    (b"hevx", "heic"),
    (b"heim", "heic"),
    (b"heis", "heic"),
    (b"mif1", "heif"),
    (b"msf1", "heif"),
    (b"avif", "avif"),
    (b"avis", "avif"),
];

const CONTAINER_EXTENSIONS: &[&str] = &["heic", "heif", "hif", "avif"];

fn container_brand(buf: &[u8]) -> Option<&'static str> {
    if buf.len() < 12 || &buf[4..8] != b"ftyp" {
        return None;
    }
    let major = &buf[8..12];
    CONTAINER_BRANDS
        .iter()
        .find(|(brand, _)| major == brand.as_slice())
        .map(|&(_, ext)| ext)
}

fn has_webp_magic(buf: &[u8]) -> bool {
    buf.len() >= 12 && &buf[0..4] == b"RIFF" && &buf[8..12] == b"WEBP"
}

fn sniff(buf: &[u8]) -> Result<Sniffed, ImageError> {
    if let Some(ext) = container_brand(buf) {
        return Ok(Sniffed::Container(ext));
    }
    if has_webp_magic(buf) {
        return Ok(Sniffed::WebP);
    }

    let Some(kind) = infer::get(buf) else {
        return Err(ImageError::UnsupportedMediaType(
            "application/octet-stream".to_string(),
        ));
    };
    let mime = kind.mime_type();
    if kind.matcher_type() != infer::MatcherType::Image {
        return Err(ImageError::UnsupportedMediaType(mime.to_string()));
    }

    match mime {
        "image/heif" | "image/heic" => Ok(Sniffed::Container("heic")),
        "image/avif" => Ok(Sniffed::Container("avif")),
        "image/webp" => Ok(Sniffed::WebP),
        _ => match ImageFormat::from_mime_type(mime) {
            Some(
                format @ (ImageFormat::Png
                | ImageFormat::Jpeg
                | ImageFormat::Gif
                | ImageFormat::Bmp
                | ImageFormat::Tiff),
            ) => Ok(Sniffed::Raster(format)),
            _ => Err(ImageError::UnsupportedMediaType(mime.to_string())),
        },
    }
}

fn original_extension(declared_filename: &str, sniffed: &'static str) -> String {
    Path::new(declared_filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .filter(|e| CONTAINER_EXTENSIONS.contains(&e.as_str()))
        .unwrap_or_else(|| sniffed.to_string())
}

/// Stateless per call; safe to share across threads.
pub struct ImageNormalizer {
    max_upload_bytes: u64,
    quality: f32,
    max_dimension: u32,
    max_source_pixels: u64,
    container: Box<dyn ContainerDecoder>,
}

impl ImageNormalizer {
    pub fn new(limits: &Limits) -> Self {
        Self::with_container_decoder(limits, default_container_decoder())
    }

    pub fn with_container_decoder(limits: &Limits, container: Box<dyn ContainerDecoder>) -> Self {
        Self {
            max_upload_bytes: limits.max_upload_bytes,
            quality: limits.webp_quality,
            max_dimension: limits.max_dimension,
            max_source_pixels: limits.max_source_pixels,
            container,
        }
    }

    /// Reads at most the size limit from `source`, normalizes it and writes the result into
    /// `images_dir` under a fresh name. Nothing is written on failure.
    pub fn normalize(
        &self,
        images_dir: &Path,
        source: impl Read,
        declared_filename: &str,
    ) -> Result<NormalizedImage, ImageError> {
        let mut buf = Vec::new();
        source
            .take(self.max_upload_bytes + 1)
            .read_to_end(&mut buf)
            .map_err(ImageError::Read)?;
        if buf.len() as u64 > self.max_upload_bytes {
            return Err(ImageError::PayloadTooLarge {
                max: self.max_upload_bytes,
            });
        }

        let sniffed = sniff(&buf)?;
        tracing::debug!(?sniffed, declared_filename, bytes = buf.len(), "sniffed upload");

        let decoded = match sniffed {
            Sniffed::Raster(format) => self.decode_raster(&buf, format)?,
            Sniffed::WebP => self.decode_webp(&buf)?,
            Sniffed::Container(_) => self.container.decode(&buf, self.max_source_pixels)?,
        };

        let encoded = self.encode(decoded)?;

        let id = uuid::Uuid::new_v4();
        let stored = format!("{id}.{OUTPUT_EXTENSION}");
        write_new(images_dir, &stored, &encoded)?;

        let original = match sniffed {
            Sniffed::Container(ext) => {
                let name = format!("{id}.{}", original_extension(declared_filename, ext));
                if let Err(e) = write_new(images_dir, &name, &buf) {
                    let _ = std::fs::remove_file(images_dir.join(&stored));
                    return Err(e);
                }
                Some(name)
            }
            _ => None,
        };

        Ok(NormalizedImage { stored, original })
    }

    /// Removes files written by an earlier `normalize` call. Missing files are ignored.
    pub fn discard(images_dir: &Path, image: &NormalizedImage) {
        for name in image.file_names() {
            let _ = std::fs::remove_file(images_dir.join(name));
        }
    }

    /// Declared dimensions are checked against the pixel budget before any pixel buffer
    /// is allocated.
    fn check_pixels(&self, width: u32, height: u32) -> Result<(), ImageError> {
        if u64::from(width) * u64::from(height) > self.max_source_pixels {
            tracing::warn!(
                width,
                height,
                max = self.max_source_pixels,
                "upload has too many pixels"
            );
            return Err(ImageError::TooManyPixels {
                max: self.max_source_pixels,
            });
        }
        Ok(())
    }

    fn decode_limits(&self) -> image::Limits {
        let mut limits = image::Limits::default();
        // Up to 16-bit RGBA per pixel, plus room for the decoder's own buffers.
        limits.max_alloc = Some(
            self.max_source_pixels
                .saturating_mul(8)
                .saturating_add(1 << 26),
        );
        limits
    }

    fn decode_raster(&self, buf: &[u8], format: ImageFormat) -> Result<DynamicImage, ImageError> {
        let mut reader = ImageReader::with_format(Cursor::new(buf), format);
        reader.limits(self.decode_limits());
        let decoder = reader
            .into_decoder()
            .map_err(raster_error(self.max_source_pixels))?;
        let (width, height) = decoder.dimensions();
        self.check_pixels(width, height)?;
        DynamicImage::from_decoder(decoder).map_err(raster_error(self.max_source_pixels))
    }

    fn decode_webp(&self, buf: &[u8]) -> Result<DynamicImage, ImageError> {
        let features = webp::BitstreamFeatures::new(buf)
            .ok_or_else(|| ImageError::DecodeFailed("invalid WebP header".to_string()))?;
        self.check_pixels(features.width(), features.height())?;
        webp::Decoder::new(buf)
            .decode()
            .map(|image| image.to_image())
            .ok_or_else(|| ImageError::DecodeFailed("invalid WebP stream".to_string()))
    }

    fn encode(&self, image: DynamicImage) -> Result<Vec<u8>, ImageError> {
        let image = if image.color().has_alpha() {
            DynamicImage::ImageRgba8(image.to_rgba8())
        } else {
            DynamicImage::ImageRgb8(image.to_rgb8())
        };
        let image = self.bound(image)?;

        let encoder = webp::Encoder::from_image(&image)
            .map_err(|e| ImageError::EncodeFailed(e.to_string()))?;
        Ok(encoder.encode(self.quality).to_vec())
    }

    /// Downscales so neither side exceeds `max_dimension`, preserving aspect ratio.
    fn bound(&self, src_image: DynamicImage) -> Result<DynamicImage, ImageError> {
        let (src_width, src_height) = src_image.dimensions();
        if src_width.max(src_height) <= self.max_dimension {
            return Ok(src_image);
        }

        let scale = self.max_dimension as f32 / src_width.max(src_height) as f32;
        let dst_width = ((src_width as f32 * scale) as u32).max(1);
        let dst_height = ((src_height as f32 * scale) as u32).max(1);

        let mut dst_image = DynamicImage::new(dst_width, dst_height, src_image.color());

        let mut resizer = fast_image_resize::Resizer::new();
        resizer
            .resize(
                &src_image,
                &mut dst_image,
                Some(&fast_image_resize::ResizeOptions::new().resize_alg(
                    fast_image_resize::ResizeAlg::Convolution(
                        fast_image_resize::FilterType::Lanczos3,
                    ),
                )),
            )
            .map_err(|e| ImageError::EncodeFailed(e.to_string()))?;

        tracing::debug!(src_width, src_height, dst_width, dst_height, "downscaled upload");
        Ok(dst_image)
    }
}

fn raster_error(max: u64) -> impl Fn(image::ImageError) -> ImageError {
    move |e| match e {
        image::ImageError::Limits(_) => ImageError::TooManyPixels { max },
        other => ImageError::DecodeFailed(other.to_string()),
    }
}

fn write_new(dir: &Path, name: &str, bytes: &[u8]) -> Result<(), ImageError> {
    crate::core::fs::write_atomic(&dir.join(name), bytes).map_err(ImageError::WriteFailed)
}
