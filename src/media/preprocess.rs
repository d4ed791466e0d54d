use std::io::Cursor;

use image::{DynamicImage, ImageFormat};
use thiserror::Error;
use tracing::{debug, warn};

const CONTRAST_BOOST: f32 = 25.0;
const BRIGHTNESS_BOOST: i32 = 10;
const DENOISE_SIGMA: f32 = 0.8;

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("could not decode image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("could not encode enhanced image: {0}")]
    Encode(#[source] image::ImageError),
}

#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub bytes: Vec<u8>,
    pub enhanced: bool,
}

/// Raises contrast and brightness, then applies a light blur to smooth sensor noise.
/// The result is always JPEG.
pub fn enhance_image(bytes: &[u8]) -> Result<Vec<u8>, PreprocessError> {
    let decoded = image::load_from_memory(bytes).map_err(PreprocessError::Decode)?;
    let adjusted = decoded
        .adjust_contrast(CONTRAST_BOOST)
        .brighten(BRIGHTNESS_BOOST)
        .blur(DENOISE_SIGMA);

    let rgb = DynamicImage::ImageRgb8(adjusted.to_rgb8());
    let mut out = Vec::with_capacity(bytes.len());
    rgb.write_to(&mut Cursor::new(&mut out), ImageFormat::Jpeg)
        .map_err(PreprocessError::Encode)?;
    debug!(
        "Enhanced image {}x{}: {} -> {} bytes",
        rgb.width(),
        rgb.height(),
        bytes.len(),
        out.len()
    );
    Ok(out)
}

/// Never fails: anything the enhancer rejects is passed through unchanged.
pub fn preprocess_image(bytes: Vec<u8>) -> PreparedImage {
    match enhance_image(&bytes) {
        Ok(enhanced) => PreparedImage {
            bytes: enhanced,
            enhanced: true,
        },
        Err(err) => {
            warn!("Image preprocessing skipped, using original bytes: {err}");
            PreparedImage {
                bytes,
                enhanced: false,
            }
        }
    }
}
