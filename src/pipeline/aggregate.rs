//! Collapse per-image feature vectors into one prediction input.

use tracing::warn;

use super::{AnalysisError, FeatureVector};

/// What to do when the aggregated vector is shorter than the regressor expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconcilePolicy {
    /// Append zeros up to the expected length, logging a warning each time.
    #[default]
    PadWithZeros,
    /// Treat any length difference as a configuration error.
    Reject,
}

/// Element-wise mean across images, then reconcile with `expected_len`.
///
/// Longer-than-expected vectors are never truncated.
pub fn aggregate(
    vectors: &[FeatureVector],
    expected_len: usize,
    policy: ReconcilePolicy,
    artifact: &str,
) -> Result<FeatureVector, AnalysisError> {
    let first = vectors.first().ok_or(AnalysisError::NoInput)?;
    let len = first.len();
    if vectors.iter().any(|v| v.len() != len) {
        return Err(AnalysisError::InconsistentFeatures(
            vectors.iter().map(Vec::len).collect(),
        ));
    }

    let count = vectors.len() as f64;
    let mut mean: FeatureVector = (0..len)
        .map(|i| (vectors.iter().map(|v| v[i] as f64).sum::<f64>() / count) as f32)
        .collect();

    let mismatch = || AnalysisError::DimensionMismatch {
        got: len,
        expected: expected_len,
        artifact: artifact.to_string(),
    };
    match (len.cmp(&expected_len), policy) {
        (std::cmp::Ordering::Equal, _) => {}
        (std::cmp::Ordering::Less, ReconcilePolicy::PadWithZeros) => {
            warn!(
                got = len,
                expected = expected_len,
                artifact,
                "Feature vector shorter than model input, zero-padding"
            );
            mean.resize(expected_len, 0.0);
        }
        _ => return Err(mismatch()),
    }
    Ok(mean)
}
