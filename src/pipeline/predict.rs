//! Aggregate vector → hemoglobin estimate + anemia flag.

use std::sync::Arc;

use tracing::debug;

use super::{AnalysisError, Prediction};
use crate::model::{Artifact, FeatureTransform, ModelError, Regressor};

/// Runs the artifact's transform and regressor on one aggregate vector.
#[derive(Debug, Clone)]
pub struct Predictor {
    artifact: Arc<Artifact>,
}

impl Predictor {
    pub fn new(artifact: Arc<Artifact>) -> Self {
        Self { artifact }
    }

    pub fn artifact(&self) -> &Artifact {
        &self.artifact
    }

    /// Transform (if any), regress, then classify with `hb < threshold`.
    pub fn predict(&self, features: &[f32]) -> Result<Prediction, AnalysisError> {
        let transformed;
        let input = match &self.artifact.preprocessor {
            Some(pre) => {
                transformed = pre.apply(features).map_err(to_analysis_error)?;
                transformed.as_slice()
            }
            None => features,
        };

        let hb = self
            .artifact
            .model
            .predict(input)
            .map_err(to_analysis_error)?;
        if !hb.is_finite() {
            return Err(to_analysis_error(ModelError::NonFinite("model")));
        }

        let is_anemic = hb < self.artifact.threshold;
        debug!(hb, threshold = self.artifact.threshold, is_anemic, "Prediction");
        Ok(Prediction { hb, is_anemic })
    }
}

fn to_analysis_error(err: ModelError) -> AnalysisError {
    AnalysisError::Prediction(err.to_string())
}
