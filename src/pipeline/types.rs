use image::RgbImage;
use serde::Serialize;

/// Per-image feature vector. Length is fixed by the extraction strategy.
pub type FeatureVector = Vec<f32>;

/// Decoded upload: RGB, 8 bits per channel, both dimensions ≥ 1.
#[derive(Debug, Clone, PartialEq)]
pub struct RawImage(RgbImage);

impl RawImage {
    /// Wrap a pixel buffer. Returns `None` for zero-area images.
    pub fn new(pixels: RgbImage) -> Option<Self> {
        (pixels.width() >= 1 && pixels.height() >= 1).then_some(Self(pixels))
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    pub fn is_portrait(&self) -> bool {
        self.0.height() > self.0.width()
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.0
    }

    pub fn into_pixels(self) -> RgbImage {
        self.0
    }
}

/// One uploaded file as received from the transport layer.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub filename: Option<String>,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    pub fn new(filename: Option<String>, bytes: Vec<u8>) -> Self {
        Self { filename, bytes }
    }

    /// Name used in diagnostics when the client did not send one.
    pub fn display_name(&self, index: usize) -> String {
        self.filename
            .clone()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| format!("image #{}", index + 1))
    }
}

/// Regressor output plus threshold classification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    /// Hemoglobin estimate in g/dL. Not clamped.
    pub hb: f32,
    pub is_anemic: bool,
}

/// Result of a full analysis request, serialized as the response body.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AnalysisOutcome {
    pub hb_pred: f32,
    /// 1 when `hb_pred` is below the threshold, else 0.
    pub is_anemic: u8,
    pub num_images: usize,
}

impl AnalysisOutcome {
    pub fn new(prediction: Prediction, num_images: usize) -> Self {
        Self {
            hb_pred: prediction.hb,
            is_anemic: u8::from(prediction.is_anemic),
            num_images,
        }
    }
}
