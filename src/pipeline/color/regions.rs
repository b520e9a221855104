//! Fixed-geometry crops of a landscape hand capture.
//!
//! Capture convention: hand held sideways, fingernails on the left third,
//! palm/finger skin on the right third. A neutral white card, when used,
//! sits at the frame centre.

use image::imageops;
use serde::{Deserialize, Serialize};

use crate::pipeline::{AnalysisError, RawImage};

/// Rectangle expressed as fractions of the image size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FractionBox {
    pub x: (f64, f64),
    pub y: (f64, f64),
}

/// Fingernails: left side, vertically centred.
pub const NAIL_BOX: FractionBox = FractionBox {
    x: (0.10, 0.35),
    y: (0.30, 0.70),
};

/// Skin: right side, vertically centred.
pub const SKIN_BOX: FractionBox = FractionBox {
    x: (0.65, 0.90),
    y: (0.30, 0.70),
};

/// Edge-artifact guard applied to every region before statistics.
pub const CENTER_CROP: (f64, f64) = (0.2, 0.8);

/// White patch side as a fraction of the smaller image dimension.
const WHITE_PATCH_FRACTION: f64 = 0.05;
const WHITE_PATCH_MIN_SIDE: i64 = 4;

/// Which region normalises the nail colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceRegion {
    /// Palm/finger skin on the right of the frame.
    #[default]
    Skin,
    /// Centred white calibration patch.
    WhitePatch,
}

impl ReferenceRegion {
    pub fn crop(self, image: &RawImage) -> Result<RawImage, AnalysisError> {
        match self {
            Self::Skin => crop_fraction(image, SKIN_BOX, "skin"),
            Self::WhitePatch => white_patch(image),
        }
    }
}

/// Crop `[x0, x1) × [y0, y1)` with bounds truncated toward zero.
fn crop_pixels(
    image: &RawImage,
    (x0, x1): (i64, i64),
    (y0, y1): (i64, i64),
    region: &'static str,
) -> Result<RawImage, AnalysisError> {
    let (w, h) = (image.width() as i64, image.height() as i64);
    let (x0, x1) = (x0.clamp(0, w), x1.clamp(0, w));
    let (y0, y1) = (y0.clamp(0, h), y1.clamp(0, h));

    let degenerate = || AnalysisError::DegenerateRegion {
        region,
        width: image.width(),
        height: image.height(),
    };
    if x1 <= x0 || y1 <= y0 {
        return Err(degenerate());
    }

    let view = imageops::crop_imm(
        image.pixels(),
        x0 as u32,
        y0 as u32,
        (x1 - x0) as u32,
        (y1 - y0) as u32,
    );
    RawImage::new(view.to_image()).ok_or_else(degenerate)
}

/// Crop a fractional box from the image.
pub fn crop_fraction(
    image: &RawImage,
    frac: FractionBox,
    region: &'static str,
) -> Result<RawImage, AnalysisError> {
    let (w, h) = (image.width() as f64, image.height() as f64);
    crop_pixels(
        image,
        ((w * frac.x.0) as i64, (w * frac.x.1) as i64),
        ((h * frac.y.0) as i64, (h * frac.y.1) as i64),
        region,
    )
}

/// Keep the middle 60% on both axes. Never empty for a non-empty input.
pub fn center_crop(image: &RawImage) -> RawImage {
    let (w, h) = (image.width() as f64, image.height() as f64);
    let (low, high) = CENTER_CROP;
    let (c0, r0) = ((w * low) as i64, (h * low) as i64);
    let c1 = ((w * high) as i64).max(c0 + 1);
    let r1 = ((h * high) as i64).max(r0 + 1);
    // c0 < w and r0 < h whenever w, h ≥ 1, so the crop is non-empty.
    crop_pixels(image, (c0, c1), (r0, r1), "center").unwrap_or_else(|_| image.clone())
}

pub fn nail_region(image: &RawImage) -> Result<RawImage, AnalysisError> {
    crop_fraction(image, NAIL_BOX, "nail")
}

/// Centred square of side max(4, 5% of the smaller dimension).
pub fn white_patch(image: &RawImage) -> Result<RawImage, AnalysisError> {
    let (w, h) = (image.width() as i64, image.height() as i64);
    let size = WHITE_PATCH_MIN_SIDE.max((w.min(h) as f64 * WHITE_PATCH_FRACTION) as i64);
    let r0 = h / 2 - size / 2;
    let c0 = w / 2 - size / 2;
    crop_pixels(image, (c0, c0 + size), (r0, r0 + size), "white_patch")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn image(width: u32, height: u32) -> RawImage {
        RawImage::new(RgbImage::from_fn(width, height, |x, y| {
            Rgb([x as u8, y as u8, 0])
        }))
        .unwrap()
    }

    #[test]
    fn nail_box_on_400x300() {
        let nail = nail_region(&image(400, 300)).unwrap();
        // x: 40..140, y: 90..210
        assert_eq!((nail.width(), nail.height()), (100, 120));
        assert_eq!(nail.pixels().get_pixel(0, 0), &Rgb([40, 90, 0]));
    }

    #[test]
    fn skin_box_on_400x300() {
        let skin = ReferenceRegion::Skin.crop(&image(400, 300)).unwrap();
        // x: 260..360, y: 90..210
        assert_eq!((skin.width(), skin.height()), (100, 120));
        assert_eq!(skin.pixels().get_pixel(0, 0), &Rgb([4, 90, 0])); // 260 wraps as u8
    }

    #[test]
    fn center_crop_keeps_middle_sixty_percent() {
        let cropped = center_crop(&image(100, 50));
        assert_eq!((cropped.width(), cropped.height()), (60, 30));
        assert_eq!(cropped.pixels().get_pixel(0, 0), &Rgb([20, 10, 0]));
    }

    #[test]
    fn center_crop_of_single_pixel_is_single_pixel() {
        let cropped = center_crop(&image(1, 1));
        assert_eq!((cropped.width(), cropped.height()), (1, 1));
    }

    #[test]
    fn white_patch_has_minimum_side() {
        let patch = white_patch(&image(40, 30)).unwrap();
        assert_eq!((patch.width(), patch.height()), (4, 4));
        // r0 = 15 - 2, c0 = 20 - 2
        assert_eq!(patch.pixels().get_pixel(0, 0), &Rgb([18, 13, 0]));
    }

    #[test]
    fn white_patch_scales_with_image() {
        let patch = ReferenceRegion::WhitePatch.crop(&image(400, 300)).unwrap();
        assert_eq!((patch.width(), patch.height()), (15, 15));
    }

    #[test]
    fn tiny_image_has_degenerate_nail_region() {
        let err = nail_region(&image(2, 2)).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::DegenerateRegion { region: "nail", .. }
        ));
    }
}
