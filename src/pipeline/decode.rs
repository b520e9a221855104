//! Upload decoding: raw bytes → validated RGB pixel grid.
//!
//! Phone photos embed rotation in EXIF tag 0x0112. The decoder applies it
//! before anything else so that the landscape policy in `orient_landscape`
//! sees the image the way the user framed it.

use std::io::Cursor;

use image::{imageops, DynamicImage};
use tracing::debug;

use super::{AnalysisError, RawImage};

/// Uploads above this size are refused without decoding.
pub const MAX_IMAGE_BYTES: usize = 50 * 1024 * 1024;

/// Nothing shorter than a minimal PNG can be an image.
pub const MIN_IMAGE_BYTES: usize = 67;

/// Decode an uploaded file into an RGB image with EXIF orientation applied.
///
/// `file` names the upload in the error message so the client can tell
/// which of its images was rejected.
pub fn decode(bytes: &[u8], file: &str) -> Result<RawImage, AnalysisError> {
    let reject = |reason: String| AnalysisError::Decode {
        file: file.to_string(),
        reason,
    };

    check_size(bytes.len()).map_err(reject)?;
    let img = image::load_from_memory(bytes).map_err(|e| reject(e.to_string()))?;

    let orientation = Orientation::read(bytes);
    let rgb = orientation.apply(img).to_rgb8();

    debug!(
        file,
        width = rgb.width(),
        height = rgb.height(),
        orientation = ?orientation,
        "Decoded upload"
    );

    RawImage::new(rgb).ok_or_else(|| reject("image has no pixels".into()))
}

fn check_size(len: usize) -> Result<(), String> {
    if len < MIN_IMAGE_BYTES {
        return Err(format!("{len} bytes is too small to be an image"));
    }
    if len > MAX_IMAGE_BYTES {
        return Err(format!(
            "upload exceeds the {} MB image limit",
            MAX_IMAGE_BYTES / (1024 * 1024)
        ));
    }
    Ok(())
}

/// Camera orientation from EXIF tag 0x0112.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    #[default]
    Upright,
    MirroredHorizontal,
    UpsideDown,
    MirroredVertical,
    /// Mirrored, then 90° clockwise.
    Transposed,
    Clockwise90,
    /// Mirrored, then 270° clockwise.
    Transversed,
    Clockwise270,
}

impl Orientation {
    /// Map the raw tag value. Out-of-range values are treated as upright.
    pub fn from_tag(value: u32) -> Self {
        match value {
            2 => Self::MirroredHorizontal,
            3 => Self::UpsideDown,
            4 => Self::MirroredVertical,
            5 => Self::Transposed,
            6 => Self::Clockwise90,
            7 => Self::Transversed,
            8 => Self::Clockwise270,
            _ => Self::Upright,
        }
    }

    /// Orientation recorded in the file, upright when absent or unreadable.
    pub fn read(bytes: &[u8]) -> Self {
        exif::Reader::new()
            .read_from_container(&mut Cursor::new(bytes))
            .ok()
            .and_then(|meta| {
                meta.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
                    .and_then(|field| field.value.get_uint(0))
            })
            .map(Self::from_tag)
            .unwrap_or_default()
    }

    /// Undo the camera rotation so pixels appear as framed.
    pub fn apply(self, img: DynamicImage) -> DynamicImage {
        match self {
            Self::Upright => img,
            Self::MirroredHorizontal => img.fliph(),
            Self::UpsideDown => img.rotate180(),
            Self::MirroredVertical => img.flipv(),
            Self::Transposed => img.rotate90().fliph(),
            Self::Clockwise90 => img.rotate90(),
            Self::Transversed => img.rotate270().fliph(),
            Self::Clockwise270 => img.rotate270(),
        }
    }
}

/// Rotate portrait captures 90° clockwise.
///
/// Captures are expected landscape with the hand sideways (nails on the
/// left, skin on the right); a portrait frame means the phone was held
/// upright.
pub fn orient_landscape(image: RawImage) -> RawImage {
    if !image.is_portrait() {
        return image;
    }
    let rotated = imageops::rotate90(image.pixels());
    debug!(
        width = image.width(),
        height = image.height(),
        "Rotating portrait capture to landscape"
    );
    // Rotation swaps dimensions; a non-empty input stays non-empty.
    RawImage::new(rotated).unwrap_or(image)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{GenericImageView, ImageOutputFormat, Rgb, RgbImage};

    /// Encode an RGB image as PNG bytes.
    pub(crate) fn encode_png(img: &RgbImage) -> Vec<u8> {
        let dynamic = DynamicImage::ImageRgb8(img.clone());
        let mut cursor = Cursor::new(Vec::new());
        dynamic
            .write_to(&mut cursor, ImageOutputFormat::Png)
            .unwrap();
        cursor.into_inner()
    }

    /// Create a solid-colour PNG with the given dimensions.
    pub(crate) fn make_test_image(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
        encode_png(&RgbImage::from_pixel(width, height, Rgb(color)))
    }

    #[test]
    fn decodes_png_to_rgb() {
        let bytes = make_test_image(40, 30, [220, 200, 180]);
        let img = decode(&bytes, "nail1.png").unwrap();
        assert_eq!((img.width(), img.height()), (40, 30));
        assert_eq!(img.pixels().get_pixel(5, 5), &Rgb([220, 200, 180]));
    }

    #[test]
    fn garbage_bytes_name_the_file() {
        let garbage = [0xDE, 0xAD, 0xBE, 0xEF].repeat(25);
        let err = decode(&garbage, "broken.jpg").unwrap_err();
        match &err {
            AnalysisError::Decode { file, .. } => assert_eq!(file, "broken.jpg"),
            other => panic!("expected decode error, got {other:?}"),
        }
        assert!(err.to_string().contains("broken.jpg"));
    }

    #[test]
    fn tiny_buffer_is_rejected_before_decoding() {
        let err = decode(&[0x89, 0x50, 0x4E, 0x47], "tiny.png").unwrap_err();
        assert!(err.to_string().contains("too small"));
    }

    #[test]
    fn png_without_exif_reads_upright() {
        let png = make_test_image(10, 10, [128, 128, 128]);
        assert_eq!(Orientation::read(&png), Orientation::Upright);
    }

    #[test]
    fn tag_values_map_to_orientations() {
        assert_eq!(Orientation::from_tag(1), Orientation::Upright);
        assert_eq!(Orientation::from_tag(6), Orientation::Clockwise90);
        assert_eq!(Orientation::from_tag(8), Orientation::Clockwise270);
        assert_eq!(Orientation::from_tag(99), Orientation::Upright);
    }

    #[test]
    fn quarter_turns_swap_dimensions() {
        for orientation in [Orientation::Clockwise90, Orientation::Clockwise270] {
            let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 20, Rgb([100, 100, 100])));
            let result = orientation.apply(img);
            assert_eq!((result.width(), result.height()), (20, 10));
        }
    }

    #[test]
    fn mirroring_keeps_dimensions() {
        let mut px = RgbImage::from_pixel(3, 2, Rgb([0, 0, 0]));
        px.put_pixel(0, 0, Rgb([255, 0, 0]));
        let result = Orientation::MirroredHorizontal
            .apply(DynamicImage::ImageRgb8(px))
            .to_rgb8();
        assert_eq!(result.dimensions(), (3, 2));
        assert_eq!(result.get_pixel(2, 0), &Rgb([255, 0, 0]));
    }

    #[test]
    fn portrait_is_rotated_clockwise() {
        // 2 wide, 3 tall; mark the top-left pixel.
        let mut px = RgbImage::from_pixel(2, 3, Rgb([0, 0, 0]));
        px.put_pixel(0, 0, Rgb([255, 0, 0]));
        let rotated = orient_landscape(RawImage::new(px).unwrap());
        assert_eq!((rotated.width(), rotated.height()), (3, 2));
        // Clockwise: top-left moves to top-right.
        assert_eq!(rotated.pixels().get_pixel(2, 0), &Rgb([255, 0, 0]));
    }

    #[test]
    fn landscape_is_untouched() {
        let px = RgbImage::from_pixel(4, 3, Rgb([10, 20, 30]));
        let img = RawImage::new(px.clone()).unwrap();
        assert_eq!(orient_landscape(img).into_pixels(), px);
    }
}
