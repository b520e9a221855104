//! Fitted feature transforms applied before the regressor.

use serde::{Deserialize, Serialize};

use super::ModelError;

/// A fitted, stateless mapping from one feature vector to another.
pub trait FeatureTransform: Send + Sync {
    /// Length the transform was fitted on.
    fn input_len(&self) -> usize;
    fn output_len(&self) -> usize;
    fn apply(&self, input: &[f32]) -> Result<Vec<f32>, ModelError>;
}

fn check_len(stage: &'static str, got: usize, expected: usize) -> Result<(), ModelError> {
    if got == expected {
        Ok(())
    } else {
        Err(ModelError::ShapeMismatch {
            stage,
            got,
            expected,
        })
    }
}

// ═══════════════════════════════════════════════════════════
// Standard scaler
// ═══════════════════════════════════════════════════════════

/// `(x - mean) / scale`, per feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f32>,
    pub scale: Vec<f32>,
}

impl StandardScaler {
    pub fn validate(&self) -> Result<(), String> {
        if self.mean.len() != self.scale.len() {
            return Err(format!(
                "standard_scaler: mean has {} entries, scale has {}",
                self.mean.len(),
                self.scale.len()
            ));
        }
        if let Some(i) = self.scale.iter().position(|&s| s == 0.0 || !s.is_finite()) {
            return Err(format!("standard_scaler: scale[{i}] must be finite and non-zero"));
        }
        Ok(())
    }
}

impl FeatureTransform for StandardScaler {
    fn input_len(&self) -> usize {
        self.mean.len()
    }

    fn output_len(&self) -> usize {
        self.mean.len()
    }

    fn apply(&self, input: &[f32]) -> Result<Vec<f32>, ModelError> {
        check_len("standard_scaler", input.len(), self.mean.len())?;
        Ok(input
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(&x, (&m, &s))| (x - m) / s)
            .collect())
    }
}

// ═══════════════════════════════════════════════════════════
// PCA projection
// ═══════════════════════════════════════════════════════════

/// Project centred input onto fitted principal axes.
///
/// `components` is `n_components × n_features`, row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pca {
    pub mean: Vec<f32>,
    pub components: Vec<Vec<f32>>,
}

impl Pca {
    pub fn validate(&self) -> Result<(), String> {
        if self.components.is_empty() {
            return Err("pca: no components".to_string());
        }
        if let Some(i) = self
            .components
            .iter()
            .position(|row| row.len() != self.mean.len())
        {
            return Err(format!(
                "pca: component {i} has {} entries, mean has {}",
                self.components[i].len(),
                self.mean.len()
            ));
        }
        Ok(())
    }
}

impl FeatureTransform for Pca {
    fn input_len(&self) -> usize {
        self.mean.len()
    }

    fn output_len(&self) -> usize {
        self.components.len()
    }

    fn apply(&self, input: &[f32]) -> Result<Vec<f32>, ModelError> {
        check_len("pca", input.len(), self.mean.len())?;
        let centred: Vec<f64> = input
            .iter()
            .zip(&self.mean)
            .map(|(&x, &m)| x as f64 - m as f64)
            .collect();
        Ok(self
            .components
            .iter()
            .map(|row| {
                row.iter()
                    .zip(&centred)
                    .map(|(&w, &c)| w as f64 * c)
                    .sum::<f64>() as f32
            })
            .collect())
    }
}

// ═══════════════════════════════════════════════════════════
// Step pipeline
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformStep {
    StandardScaler(StandardScaler),
    Pca(Pca),
}

impl TransformStep {
    fn as_transform(&self) -> &dyn FeatureTransform {
        match self {
            Self::StandardScaler(s) => s,
            Self::Pca(p) => p,
        }
    }
}

/// Ordered transform steps, e.g. scaler then PCA.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    pub steps: Vec<TransformStep>,
}

impl Preprocessor {
    /// Check every step and that consecutive steps agree on lengths.
    pub fn validate(&self) -> Result<(), String> {
        if self.steps.is_empty() {
            return Err("preprocessor has no steps".to_string());
        }
        for step in &self.steps {
            match step {
                TransformStep::StandardScaler(s) => s.validate()?,
                TransformStep::Pca(p) => p.validate()?,
            }
        }
        for (i, pair) in self.steps.windows(2).enumerate() {
            let (out, next_in) = (pair[0].as_transform().output_len(), pair[1].as_transform().input_len());
            if out != next_in {
                return Err(format!(
                    "step {i} outputs {out} features but step {} expects {next_in}",
                    i + 1
                ));
            }
        }
        Ok(())
    }

    /// Output length of the PCA step, if the pipeline has one.
    pub fn pca_components(&self) -> Option<usize> {
        self.steps.iter().find_map(|step| match step {
            TransformStep::Pca(p) => Some(p.output_len()),
            TransformStep::StandardScaler(_) => None,
        })
    }
}

impl FeatureTransform for Preprocessor {
    fn input_len(&self) -> usize {
        self.steps
            .first()
            .map(|s| s.as_transform().input_len())
            .unwrap_or(0)
    }

    fn output_len(&self) -> usize {
        self.steps
            .last()
            .map(|s| s.as_transform().output_len())
            .unwrap_or(0)
    }

    fn apply(&self, input: &[f32]) -> Result<Vec<f32>, ModelError> {
        let mut current = input.to_vec();
        for step in &self.steps {
            current = step.as_transform().apply(&current)?;
        }
        if current.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::NonFinite("preprocessor"));
        }
        Ok(current)
    }
}
