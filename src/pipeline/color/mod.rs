//! Hand-crafted colour features: nail statistics normalised by a
//! reference region from the same photograph.

pub mod features;
pub mod regions;
pub mod spaces;
pub mod stats;

pub use features::{color_feature_map, extract_color_features, COLOR_FEATURE_DIM};
pub use regions::{nail_region, ReferenceRegion};

use super::{AnalysisError, FeatureVector, RawImage};

/// Crops the nail and reference regions from a landscape photo and
/// assembles their colour features.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColorExtractor {
    pub reference: ReferenceRegion,
}

impl ColorExtractor {
    pub fn new(reference: ReferenceRegion) -> Self {
        Self { reference }
    }

    pub fn extract(&self, image: &RawImage) -> Result<FeatureVector, AnalysisError> {
        let nail = nail_region(image)?;
        let reference = self.reference.crop(image)?;
        Ok(extract_color_features(&nail, &reference))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn hand_photo() -> RawImage {
        // Pinkish nails on the left, lighter skin on the right, white card centred.
        RawImage::new(RgbImage::from_fn(400, 300, |x, _| {
            if x < 150 {
                Rgb([200, 120, 130])
            } else if x < 250 {
                Rgb([245, 245, 245])
            } else {
                Rgb([220, 170, 150])
            }
        }))
        .unwrap()
    }

    #[test]
    fn skin_reference_normalises_by_skin() {
        let v = ColorExtractor::default().extract(&hand_photo()).unwrap();
        assert_eq!(v.len(), COLOR_FEATURE_DIM);
        let map = color_feature_map(
            &nail_region(&hand_photo()).unwrap(),
            &ReferenceRegion::Skin.crop(&hand_photo()).unwrap(),
            "NAIL",
        );
        assert!((map["NAIL_R_MEAN"] - 200.0 / 220.0).abs() < 1e-4);
    }

    #[test]
    fn white_patch_reference_changes_ratios() {
        let skin = ColorExtractor::new(ReferenceRegion::Skin)
            .extract(&hand_photo())
            .unwrap();
        let white = ColorExtractor::new(ReferenceRegion::WhitePatch)
            .extract(&hand_photo())
            .unwrap();
        assert_eq!(skin.len(), white.len());
        assert_ne!(skin, white);
    }

    #[test]
    fn tiny_image_is_rejected() {
        let tiny = RawImage::new(RgbImage::from_pixel(2, 2, Rgb([1, 2, 3]))).unwrap();
        let err = ColorExtractor::default().extract(&tiny).unwrap_err();
        assert!(matches!(err, AnalysisError::DegenerateRegion { .. }));
    }
}
