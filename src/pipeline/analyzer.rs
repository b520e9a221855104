//! Request-level analysis: uploads → hemoglobin estimate.
//!
//! Each image is decoded, oriented and reduced to a feature vector on its
//! own; the vectors are averaged and the mean goes through the artifact
//! once. Compute-bound: callers on an async runtime should run `analyze`
//! on a blocking thread.

use std::sync::Arc;

use tracing::{info, warn};

use super::aggregate::{aggregate, ReconcilePolicy};
use super::decode::{decode, orient_landscape};
use super::embedding::ImageEmbedder;
use super::predict::Predictor;
use super::strategy::FeatureStrategy;
use super::{AnalysisError, AnalysisOutcome, FeatureVector, ImageUpload};
use crate::model::Artifact;

/// Images beyond this count are ignored.
pub const MAX_IMAGES: usize = 3;

/// Shared, read-only analysis pipeline for the loaded artifact.
pub struct Analyzer {
    predictor: Predictor,
    embedder: Arc<dyn ImageEmbedder>,
    strategy: FeatureStrategy,
    reconcile: ReconcilePolicy,
}

impl Analyzer {
    /// Resolve the feature strategy for `artifact` and wire the pipeline.
    pub fn new(
        artifact: Arc<Artifact>,
        embedder: Arc<dyn ImageEmbedder>,
        reconcile: ReconcilePolicy,
    ) -> Self {
        let strategy = FeatureStrategy::resolve(&artifact);
        Self::with_strategy(artifact, strategy, embedder, reconcile)
    }

    /// Wire the pipeline with an already resolved strategy.
    pub fn with_strategy(
        artifact: Arc<Artifact>,
        strategy: FeatureStrategy,
        embedder: Arc<dyn ImageEmbedder>,
        reconcile: ReconcilePolicy,
    ) -> Self {
        Self {
            predictor: Predictor::new(artifact),
            embedder,
            strategy,
            reconcile,
        }
    }

    pub fn artifact(&self) -> &Artifact {
        self.predictor.artifact()
    }

    pub fn strategy(&self) -> FeatureStrategy {
        self.strategy
    }

    /// Device label of the embedding backbone.
    pub fn device(&self) -> &'static str {
        self.embedder.device()
    }

    /// Analyze up to `MAX_IMAGES` uploads, in order.
    pub fn analyze(&self, mut uploads: Vec<ImageUpload>) -> Result<AnalysisOutcome, AnalysisError> {
        if uploads.is_empty() {
            return Err(AnalysisError::NoInput);
        }
        if uploads.len() > MAX_IMAGES {
            warn!(
                received = uploads.len(),
                used = MAX_IMAGES,
                "Too many images, extra uploads ignored"
            );
            uploads.truncate(MAX_IMAGES);
        }

        let mut vectors: Vec<FeatureVector> = Vec::with_capacity(uploads.len());
        for (index, upload) in uploads.iter().enumerate() {
            let name = upload.display_name(index);
            let image = orient_landscape(decode(&upload.bytes, &name)?);
            vectors.push(self.strategy.extract(&image, self.embedder.as_ref())?);
        }

        let artifact = self.artifact();
        let features = aggregate(
            &vectors,
            artifact.expected_input_dim(),
            self.reconcile,
            &artifact.name,
        )?;
        let prediction = self.predictor.predict(&features)?;

        info!(
            num_images = vectors.len(),
            hb = prediction.hb,
            is_anemic = prediction.is_anemic,
            strategy = %self.strategy,
            "Analysis complete"
        );
        Ok(AnalysisOutcome::new(prediction, vectors.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::decode::tests::{encode_png, make_test_image};
    use crate::pipeline::embedding::ReferenceEmbedder;
    use image::{imageops, Rgb, RgbImage};
    use std::path::Path;

    fn analyzer(json: &str, reconcile: ReconcilePolicy) -> Analyzer {
        let artifact = Artifact::from_slice(Path::new("hb.json"), json.as_bytes()).unwrap();
        Analyzer::new(
            Arc::new(artifact),
            Arc::new(ReferenceEmbedder::new()),
            reconcile,
        )
    }

    fn constant_model(n: usize, intercept: f32) -> String {
        format!(
            r#"{{"kind":"linear","coefficients":{:?},"intercept":{intercept:?}}}"#,
            vec![0.0f32; n]
        )
    }

    fn upload(name: &str, bytes: Vec<u8>) -> ImageUpload {
        ImageUpload::new(Some(name.to_string()), bytes)
    }

    fn solid_uploads(count: usize) -> Vec<ImageUpload> {
        (0..count)
            .map(|i| upload(&format!("nail{i}.png"), make_test_image(400, 300, [200, 150, 140])))
            .collect()
    }

    #[test]
    fn three_images_below_threshold() {
        let a = analyzer(&constant_model(512, 10.0), ReconcilePolicy::PadWithZeros);
        let out = a.analyze(solid_uploads(3)).unwrap();
        assert_eq!(
            out,
            AnalysisOutcome {
                hb_pred: 10.0,
                is_anemic: 1,
                num_images: 3
            }
        );
    }

    #[test]
    fn no_images_is_rejected_before_any_work() {
        let a = analyzer(&constant_model(512, 10.0), ReconcilePolicy::PadWithZeros);
        assert!(matches!(a.analyze(vec![]), Err(AnalysisError::NoInput)));
    }

    #[test]
    fn undecodable_upload_names_the_file() {
        let a = analyzer(&constant_model(512, 10.0), ReconcilePolicy::PadWithZeros);
        let mut uploads = solid_uploads(1);
        uploads.push(upload("broken.jpg", b"definitely not an image, just text bytes that go on and on and on".to_vec()));
        match a.analyze(uploads) {
            Err(AnalysisError::Decode { file, .. }) => assert_eq!(file, "broken.jpg"),
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[test]
    fn extra_images_are_dropped() {
        let a = analyzer(&constant_model(512, 14.0), ReconcilePolicy::PadWithZeros);
        let out = a.analyze(solid_uploads(5)).unwrap();
        assert_eq!(out.num_images, 3);
        assert_eq!(out.is_anemic, 0);
    }

    #[test]
    fn color_artifact_uses_color_features() {
        let a = analyzer(&constant_model(332, 13.0), ReconcilePolicy::Reject);
        assert_eq!(a.strategy().native_len(), 332);
        let out = a.analyze(solid_uploads(2)).unwrap();
        assert_eq!(out.hb_pred, 13.0);
        assert_eq!(out.num_images, 2);
    }

    #[test]
    fn shorter_features_are_padded_for_wider_models() {
        // Embedding (512) against a 600-wide model
        let a = analyzer(&constant_model(600, 12.0), ReconcilePolicy::PadWithZeros);
        assert_eq!(a.analyze(solid_uploads(1)).unwrap().hb_pred, 12.0);

        let strict = analyzer(&constant_model(600, 12.0), ReconcilePolicy::Reject);
        assert!(matches!(
            strict.analyze(solid_uploads(1)),
            Err(AnalysisError::DimensionMismatch { got: 512, expected: 600, .. })
        ));
    }

    #[test]
    fn wider_features_are_a_configuration_error() {
        let a = analyzer(&constant_model(400, 12.0), ReconcilePolicy::PadWithZeros);
        let err = a.analyze(solid_uploads(1)).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::DimensionMismatch { got: 512, expected: 400, .. }
        ));
        assert!(err.to_string().contains("hb.json"));
    }

    #[test]
    fn portrait_capture_matches_its_landscape_rotation() {
        let landscape = RgbImage::from_fn(400, 300, |x, y| {
            Rgb([(x % 251) as u8, (y % 241) as u8, ((x + y) % 199) as u8])
        });
        // Rotating this portrait frame clockwise restores `landscape`.
        let portrait = imageops::rotate270(&landscape);
        assert_eq!((portrait.width(), portrait.height()), (300, 400));

        let coefficients: Vec<f32> = (0..332).map(|i| (i % 7) as f32 * 0.01).collect();
        let json = format!(
            r#"{{"kind":"linear","coefficients":{coefficients:?},"intercept":9.0}}"#
        );
        let a = analyzer(&json, ReconcilePolicy::Reject);
        let from_portrait = a
            .analyze(vec![upload("p.png", encode_png(&portrait))])
            .unwrap();
        let from_landscape = a
            .analyze(vec![upload("l.png", encode_png(&landscape))])
            .unwrap();
        assert_eq!(from_portrait, from_landscape);
    }
}
