use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};

use crate::{ProcessingError, ProcessingResult};

const COMPONENTS_X: u32 = 4;
const COMPONENTS_Y: u32 = 3;

/// Width of the nearest-neighbour sample the hash is computed from.
const SAMPLE_WIDTH: u32 = 32;

/// Blurhash of a (thumbnail) image, computed on a tiny downsample.
pub fn blurhash_from_image(img: &DynamicImage) -> ProcessingResult<String> {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err(ProcessingError::Blurhash("empty image".to_string()));
    }

    let sample_w = SAMPLE_WIDTH.min(width);
    let sample_h = ((f64::from(height) * f64::from(sample_w) / f64::from(width)).round() as u32).max(1);
    let sample = img.resize_exact(sample_w, sample_h, FilterType::Nearest);
    let rgba = sample.to_rgba8();

    ::blurhash::encode(COMPONENTS_X, COMPONENTS_Y, sample_w, sample_h, rgba.as_raw())
        .map_err(|e| ProcessingError::Blurhash(e.to_string()))
}
