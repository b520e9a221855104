//! Image embeddings from a frozen ResNet-18 backbone.
//!
//! The backbone is an external numeric oracle: an ONNX graph of ResNet-18
//! truncated after global average pooling (512-d output). This module owns
//! the fixed contract around it (input size, ImageNet normalisation,
//! output dimension and L2 normalisation) so any backbone honouring the
//! contract can be swapped in.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, TryLockError};

use image::imageops::FilterType;
use ndarray::Array4;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{AnalysisError, FeatureVector, RawImage};

/// Pooled descriptor length of ResNet-18 without its classification head.
pub const EMBEDDING_DIM: usize = 512;

/// Square input resolution expected by the backbone.
pub const INPUT_SIZE: u32 = 224;

/// ImageNet channel statistics on [0,1]-scaled RGB.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Lower bound on the norm when L2-normalising.
const NORM_EPS: f32 = 1e-12;

/// Embedding backbone abstraction.
///
/// `Send + Sync` because one instance is shared read-only by every request.
pub trait ImageEmbedder: Send + Sync {
    /// Produce an L2-normalised embedding of `dimension()` values.
    fn embed(&self, image: &RawImage) -> Result<FeatureVector, AnalysisError>;

    fn dimension(&self) -> usize;

    /// Execution device label for diagnostics.
    fn device(&self) -> &'static str;
}

/// Resize to 224×224 and normalise into an NCHW tensor `[1, 3, 224, 224]`.
pub fn to_backbone_input(image: &RawImage) -> Array4<f32> {
    let size = INPUT_SIZE as usize;
    let resized =
        image::imageops::resize(image.pixels(), INPUT_SIZE, INPUT_SIZE, FilterType::Triangle);

    let mut input = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for c in 0..3 {
            let scaled = pixel.0[c] as f32 / 255.0;
            input[[0, c, y, x]] = (scaled - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
        }
    }
    input
}

/// Divide by the Euclidean norm, guarding against a zero vector.
pub fn l2_normalize(values: &mut [f32]) {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    let denom = norm.max(NORM_EPS);
    for v in values.iter_mut() {
        *v /= denom;
    }
}

// ═══════════════════════════════════════════════════════════
// Session pool
// ═══════════════════════════════════════════════════════════

/// Backbone sessions kept per process. Each needs its own weights in memory.
pub const MAX_BACKBONE_SESSIONS: usize = 4;

/// Fixed set of independently locked sessions, handed out round-robin.
///
/// Inference needs `&mut` on a session. Concurrent requests take different
/// sessions, so they only queue once every session is busy.
pub struct SessionPool<T> {
    slots: Vec<Mutex<T>>,
    next: AtomicUsize,
}

impl<T> SessionPool<T> {
    /// `None` for an empty set.
    pub fn new(sessions: Vec<T>) -> Option<Self> {
        if sessions.is_empty() {
            return None;
        }
        Some(Self {
            slots: sessions.into_iter().map(Mutex::new).collect(),
            next: AtomicUsize::new(0),
        })
    }

    /// Run `f` on the first free session, starting from the round-robin
    /// position. Waits on that position when all are busy.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, AnalysisError> {
        let poisoned = || AnalysisError::Embedding("Backbone session lock poisoned".to_string());
        let n = self.slots.len();
        let start = self.next.fetch_add(1, Ordering::Relaxed) % n;

        for offset in 0..n {
            match self.slots[(start + offset) % n].try_lock() {
                Ok(mut session) => return Ok(f(&mut session)),
                Err(TryLockError::WouldBlock) => continue,
                Err(TryLockError::Poisoned(_)) => return Err(poisoned()),
            }
        }

        let mut session = self.slots[start].lock().map_err(|_| poisoned())?;
        Ok(f(&mut session))
    }
}

/// Session count for this machine: one per core, capped.
pub fn backbone_session_count() -> usize {
    std::thread::available_parallelism()
        .map_or(1, |n| n.get())
        .clamp(1, MAX_BACKBONE_SESSIONS)
}

// ═══════════════════════════════════════════════════════════
// ONNX backbone, behind `onnx-backbone` feature
// ═══════════════════════════════════════════════════════════

#[cfg(feature = "onnx-backbone")]
mod onnx {
    use super::{
        l2_normalize, to_backbone_input, AnalysisError, FeatureVector, ImageEmbedder, RawImage,
        EMBEDDING_DIM,
    };
    use super::{backbone_session_count, SessionPool};
    use ort::session::Session;
    use std::path::Path;

    /// ResNet-18 feature extractor running on ONNX Runtime.
    ///
    /// `Session::run` requires `&mut self`, so sessions live in a
    /// `SessionPool` and each request borrows one.
    pub struct OnnxBackbone {
        sessions: SessionPool<Session>,
    }

    #[derive(Debug, thiserror::Error)]
    pub enum BackboneError {
        #[error("Backbone model not found: {0}")]
        NotFound(std::path::PathBuf),
        #[error("Backbone initialization failed: {0}")]
        Init(String),
    }

    impl OnnxBackbone {
        /// Load the truncated backbone graph from an `.onnx` file.
        pub fn load(model_path: &Path) -> Result<Self, BackboneError> {
            if !model_path.exists() {
                return Err(BackboneError::NotFound(model_path.to_path_buf()));
            }

            let count = backbone_session_count();
            let sessions = (0..count)
                .map(|_| open_session(model_path))
                .collect::<Result<Vec<_>, _>>()?;
            let sessions = SessionPool::new(sessions)
                .ok_or_else(|| BackboneError::Init("no backbone sessions".to_string()))?;

            tracing::info!(
                path = %model_path.display(),
                sessions = count,
                "ONNX backbone loaded"
            );

            Ok(Self { sessions })
        }

        fn infer(&self, image: &RawImage) -> Result<FeatureVector, AnalysisError> {
            let input = to_backbone_input(image);
            self.sessions.with(|session| run_session(session, &input))?
        }
    }

    fn open_session(model_path: &Path) -> Result<Session, BackboneError> {
        Session::builder()
            .map_err(|e: ort::Error| BackboneError::Init(e.to_string()))?
            .with_intra_threads(2)
            .map_err(|e: ort::Error| BackboneError::Init(e.to_string()))?
            .commit_from_file(model_path)
            .map_err(|e: ort::Error| BackboneError::Init(format!("ONNX load failed: {e}")))
    }

    fn run_session(
        session: &mut Session,
        input: &ndarray::Array4<f32>,
    ) -> Result<FeatureVector, AnalysisError> {
        use ort::value::TensorRef;

        let input_tensor = TensorRef::from_array_view(input)
            .map_err(|e| AnalysisError::Embedding(e.to_string()))?;

        let outputs = session
            .run(ort::inputs![input_tensor])
            .map_err(|e| AnalysisError::Embedding(format!("ONNX inference failed: {e}")))?;

        // Output shape: [1, 512] or [1, 512, 1, 1] (avgpool without flatten)
        let (shape, output_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| AnalysisError::Embedding(format!("Output extraction: {e}")))?;

        let elements: i64 = shape.iter().product();
        if shape.first().copied() != Some(1) || elements as usize != EMBEDDING_DIM {
            return Err(AnalysisError::Embedding(format!(
                "Unexpected output shape: {shape:?}, expected [1, {EMBEDDING_DIM}]"
            )));
        }

        let mut embedding = output_data.to_vec();
        l2_normalize(&mut embedding);
        Ok(embedding)
    }

    impl ImageEmbedder for OnnxBackbone {
        fn embed(&self, image: &RawImage) -> Result<FeatureVector, AnalysisError> {
            self.infer(image)
        }

        fn dimension(&self) -> usize {
            EMBEDDING_DIM
        }

        fn device(&self) -> &'static str {
            "cpu"
        }
    }
}

#[cfg(feature = "onnx-backbone")]
pub use onnx::{BackboneError, OnnxBackbone};

// ═══════════════════════════════════════════════════════════
// Reference embedder: deterministic stand-in
// ═══════════════════════════════════════════════════════════

/// Pooling grid per channel for the reference embedder.
const REFERENCE_GRID: usize = 4;
const REFERENCE_SEED: u64 = 0x0A7E_3D0C;

/// Deterministic embedder with the backbone's exact contract.
///
/// Average-pools the normalised input tensor on a 4×4 grid per channel and
/// projects the 48 pooled values to 512 dimensions with a fixed seeded
/// matrix. Used by tests, and as the placeholder backbone of colour-ratio
/// deployments, which never embed. Its vectors are not interchangeable
/// with ResNet-18 embeddings, so it never serves an embedding artifact.
pub struct ReferenceEmbedder {
    projection: Vec<[f32; 3 * REFERENCE_GRID * REFERENCE_GRID]>,
}

impl ReferenceEmbedder {
    pub fn new() -> Self {
        let mut rng = StdRng::seed_from_u64(REFERENCE_SEED);
        let projection = (0..EMBEDDING_DIM)
            .map(|_| {
                let mut row = [0.0f32; 3 * REFERENCE_GRID * REFERENCE_GRID];
                for w in row.iter_mut() {
                    *w = rng.gen_range(-1.0f32..1.0);
                }
                row
            })
            .collect();
        Self { projection }
    }

    fn pooled(input: &Array4<f32>) -> [f32; 3 * REFERENCE_GRID * REFERENCE_GRID] {
        let size = INPUT_SIZE as usize;
        let cell = size / REFERENCE_GRID;
        let mut pooled = [0.0f32; 3 * REFERENCE_GRID * REFERENCE_GRID];
        for c in 0..3 {
            for gy in 0..REFERENCE_GRID {
                for gx in 0..REFERENCE_GRID {
                    let mut sum = 0.0f32;
                    for y in gy * cell..(gy + 1) * cell {
                        for x in gx * cell..(gx + 1) * cell {
                            sum += input[[0, c, y, x]];
                        }
                    }
                    pooled[(c * REFERENCE_GRID + gy) * REFERENCE_GRID + gx] =
                        sum / (cell * cell) as f32;
                }
            }
        }
        pooled
    }
}

impl Default for ReferenceEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageEmbedder for ReferenceEmbedder {
    fn embed(&self, image: &RawImage) -> Result<FeatureVector, AnalysisError> {
        let pooled = Self::pooled(&to_backbone_input(image));
        let mut embedding: Vec<f32> = self
            .projection
            .iter()
            .map(|row| {
                // ReLU, as the real backbone's pooled activations are non-negative
                row.iter()
                    .zip(pooled.iter())
                    .map(|(w, p)| w * p)
                    .sum::<f32>()
                    .max(0.0)
            })
            .collect();
        l2_normalize(&mut embedding);
        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIM
    }

    fn device(&self) -> &'static str {
        "reference"
    }
}
