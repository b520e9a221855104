//! Scalar regressors: linear model and additive tree ensembles.

use serde::{Deserialize, Serialize};

use super::ModelError;

pub trait Regressor: Send + Sync {
    /// Input length the model was fitted on, when it declares one.
    fn input_len(&self) -> Option<usize>;
    fn predict(&self, input: &[f32]) -> Result<f32, ModelError>;
}

// ═══════════════════════════════════════════════════════════
// Linear
// ═══════════════════════════════════════════════════════════

/// `intercept + Σ coefficients[i] · x[i]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub coefficients: Vec<f32>,
    pub intercept: f32,
}

impl Regressor for LinearModel {
    fn input_len(&self) -> Option<usize> {
        Some(self.coefficients.len())
    }

    fn predict(&self, input: &[f32]) -> Result<f32, ModelError> {
        if input.len() != self.coefficients.len() {
            return Err(ModelError::ShapeMismatch {
                stage: "linear",
                got: input.len(),
                expected: self.coefficients.len(),
            });
        }
        let dot: f64 = input
            .iter()
            .zip(&self.coefficients)
            .map(|(&x, &w)| x as f64 * w as f64)
            .sum();
        Ok((dot + self.intercept as f64) as f32)
    }
}

// ═══════════════════════════════════════════════════════════
// Tree ensemble
// ═══════════════════════════════════════════════════════════

/// A node in a regression tree. Children are indices into the same tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f32,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f32,
    },
}

/// Flat regression tree; node 0 is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    pub nodes: Vec<TreeNode>,
}

impl RegressionTree {
    /// Children must point forward so traversal always terminates.
    fn validate(&self, n_features: Option<usize>) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            if let TreeNode::Split {
                feature,
                left,
                right,
                ..
            } = node
            {
                for child in [*left, *right] {
                    if child <= idx || child >= self.nodes.len() {
                        return Err(format!("node {idx} has invalid child index {child}"));
                    }
                }
                if let Some(n) = n_features {
                    if *feature >= n {
                        return Err(format!(
                            "node {idx} splits on feature {feature}, model has {n}"
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// Walk from the root: left when `x[feature] <= threshold`.
    pub fn predict(&self, input: &[f32]) -> Result<f32, ModelError> {
        let mut idx = 0usize;
        loop {
            match self.nodes.get(idx) {
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let value = input.get(*feature).copied().ok_or(ModelError::ShapeMismatch {
                        stage: "tree_ensemble",
                        got: input.len(),
                        expected: feature + 1,
                    })?;
                    idx = if value <= *threshold { *left } else { *right };
                }
                Some(TreeNode::Leaf { value }) => return Ok(*value),
                None => return Err(ModelError::Malformed(format!("dangling node index {idx}"))),
            }
        }
    }

}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeAggregation {
    /// Gradient boosting: `base_score + learning_rate · Σ leaves`.
    #[default]
    Sum,
    /// Random forest: `base_score + learning_rate · mean(leaves)`.
    Mean,
}

fn one() -> f32 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEnsemble {
    pub trees: Vec<RegressionTree>,
    #[serde(default)]
    pub aggregation: TreeAggregation,
    #[serde(default)]
    pub base_score: f32,
    #[serde(default = "one")]
    pub learning_rate: f32,
    #[serde(default)]
    pub n_features: Option<usize>,
}

impl TreeEnsemble {
    pub fn validate(&self) -> Result<(), String> {
        if self.trees.is_empty() {
            return Err("tree_ensemble has no trees".to_string());
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(self.n_features)
                .map_err(|e| format!("tree {i}: {e}"))?;
        }
        Ok(())
    }
}

impl Regressor for TreeEnsemble {
    fn input_len(&self) -> Option<usize> {
        self.n_features
    }

    fn predict(&self, input: &[f32]) -> Result<f32, ModelError> {
        if let Some(n) = self.n_features {
            if input.len() != n {
                return Err(ModelError::ShapeMismatch {
                    stage: "tree_ensemble",
                    got: input.len(),
                    expected: n,
                });
            }
        }
        let mut total = 0.0f64;
        for tree in &self.trees {
            total += tree.predict(input)? as f64;
        }
        if self.aggregation == TreeAggregation::Mean {
            total /= self.trees.len().max(1) as f64;
        }
        Ok((self.base_score as f64 + self.learning_rate as f64 * total) as f32)
    }
}

// ═══════════════════════════════════════════════════════════
// Model selection
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Model {
    Linear(LinearModel),
    TreeEnsemble(TreeEnsemble),
}

impl Model {
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Linear(m) if m.coefficients.is_empty() => {
                Err("linear model has no coefficients".to_string())
            }
            Self::Linear(_) => Ok(()),
            Self::TreeEnsemble(t) => t.validate(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Linear(_) => "linear",
            Self::TreeEnsemble(_) => "tree_ensemble",
        }
    }

    fn as_regressor(&self) -> &dyn Regressor {
        match self {
            Self::Linear(m) => m,
            Self::TreeEnsemble(t) => t,
        }
    }
}

impl Regressor for Model {
    fn input_len(&self) -> Option<usize> {
        self.as_regressor().input_len()
    }

    fn predict(&self, input: &[f32]) -> Result<f32, ModelError> {
        self.as_regressor().predict(input)
    }
}
