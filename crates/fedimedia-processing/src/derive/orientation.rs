use image::{DynamicImage, GenericImageView};

use crate::probe::orientation::transforms;

/// Pixel-level orientation correction for decoded images.
pub struct ImageOrientation;

impl ImageOrientation {
    /// Rotate then flip so the image displays upright.
    pub fn apply(img: DynamicImage, orientation: u8) -> DynamicImage {
        let (rotate, flip_h, flip_v) = transforms(orientation);
        if rotate.is_none() && !flip_h && !flip_v {
            return img;
        }

        tracing::debug!(
            orientation,
            rotate = ?rotate,
            flip_horizontal = flip_h,
            flip_vertical = flip_v,
            dimensions = ?img.dimensions(),
            "Applying orientation"
        );

        let mut img = match rotate {
            Some(angle) => Self::rotate_by_angle(img, angle),
            None => img,
        };
        if flip_h {
            img = img.fliph();
        }
        if flip_v {
            img = img.flipv();
        }
        img
    }

    /// Clockwise rotation by 90, 180 or 270 degrees; other angles are a no-op.
    pub fn rotate_by_angle(img: DynamicImage, angle: u16) -> DynamicImage {
        match angle {
            90 => img.rotate90(),
            180 => img.rotate180(),
            270 => img.rotate270(),
            _ => img,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    /// 3x2 image with a single red pixel in the top-left corner.
    fn marker() -> DynamicImage {
        let mut img = RgbaImage::from_pixel(3, 2, Rgba([0, 0, 0, 255]));
        img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        DynamicImage::ImageRgba8(img)
    }

    fn red_at(img: &DynamicImage) -> (u32, u32) {
        let rgba = img.to_rgba8();
        let (x, y, _) = rgba
            .enumerate_pixels()
            .find(|(_, _, p)| p.0 == [255, 0, 0, 255])
            .unwrap();
        (x, y)
    }

    #[test]
    fn normal_is_untouched() {
        let img = ImageOrientation::apply(marker(), 1);
        assert_eq!(img.dimensions(), (3, 2));
        assert_eq!(red_at(&img), (0, 0));
    }

    #[test]
    fn rotate_90_moves_corner() {
        let img = ImageOrientation::apply(marker(), 6);
        assert_eq!(img.dimensions(), (2, 3));
        assert_eq!(red_at(&img), (1, 0));
    }

    #[test]
    fn transpose_keeps_origin() {
        // Orientation 5 is a transpose: the origin pixel stays put.
        let img = ImageOrientation::apply(marker(), 5);
        assert_eq!(img.dimensions(), (2, 3));
        assert_eq!(red_at(&img), (0, 0));
    }

    #[test]
    fn transverse_moves_origin_to_far_corner() {
        let img = ImageOrientation::apply(marker(), 7);
        assert_eq!(img.dimensions(), (2, 3));
        assert_eq!(red_at(&img), (1, 2));
    }

    #[test]
    fn mirror_and_flip() {
        assert_eq!(red_at(&ImageOrientation::apply(marker(), 2)), (2, 0));
        assert_eq!(red_at(&ImageOrientation::apply(marker(), 4)), (0, 1));
        assert_eq!(red_at(&ImageOrientation::apply(marker(), 3)), (2, 1));
    }

    #[test]
    fn unsupported_angle_is_noop() {
        let img = ImageOrientation::rotate_by_angle(marker(), 45);
        assert_eq!(img.dimensions(), (3, 2));
    }
}
