use super::error::ImageError;
use image::DynamicImage;

/// Decodes the primary image of an ISO-BMFF still-image container (HEIC/HEIF/AVIF)
/// from memory.
pub trait ContainerDecoder: Send + Sync {
    /// Implementations must fail with [`ImageError::TooManyPixels`] before decoding when
    /// the primary image declares more than `max_pixels`.
    fn decode(&self, bytes: &[u8], max_pixels: u64) -> Result<DynamicImage, ImageError>;
}

/// Used when the crate is built without the `heif` feature.
pub struct UnavailableDecoder;

impl ContainerDecoder for UnavailableDecoder {
    fn decode(&self, _bytes: &[u8], _max_pixels: u64) -> Result<DynamicImage, ImageError> {
        Err(ImageError::DecodeFailed(
            "HEIF/AVIF decoding is not available in this build".to_string(),
        ))
    }
}

#[cfg(feature = "heif")]
pub struct LibHeifDecoder;

#[cfg(feature = "heif")]
impl ContainerDecoder for LibHeifDecoder {
    fn decode(&self, bytes: &[u8], max_pixels: u64) -> Result<DynamicImage, ImageError> {
        use libheif_rs::{ColorSpace, HeifContext, LibHeif, RgbChroma};

        let failed = |e: libheif_rs::HeifError| ImageError::DecodeFailed(e.to_string());
        let lib = LibHeif::new();
        let ctx = HeifContext::read_from_bytes(bytes).map_err(failed)?;
        let handle = ctx.primary_image_handle().map_err(failed)?;
        if u64::from(handle.width()) * u64::from(handle.height()) > max_pixels {
            return Err(ImageError::TooManyPixels { max: max_pixels });
        }
        let decoded = lib
            .decode(&handle, ColorSpace::Rgb(RgbChroma::Rgb), None)
            .map_err(failed)?;

        let planes = decoded.planes();
        let plane = planes.interleaved.ok_or_else(|| {
            ImageError::DecodeFailed("decoded image has no interleaved plane".to_string())
        })?;

        let row_bytes = plane.width as usize * 3;
        let mut pixels = Vec::with_capacity(row_bytes * plane.height as usize);
        for row in plane.data.chunks(plane.stride).take(plane.height as usize) {
            pixels.extend_from_slice(&row[..row_bytes]);
        }

        image::RgbImage::from_raw(plane.width, plane.height, pixels)
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| {
                ImageError::DecodeFailed("pixel buffer does not match image size".to_string())
            })
    }
}

pub fn default_container_decoder() -> Box<dyn ContainerDecoder> {
    #[cfg(feature = "heif")]
    {
        Box::new(LibHeifDecoder)
    }
    #[cfg(not(feature = "heif"))]
    {
        Box::new(UnavailableDecoder)
    }
}
