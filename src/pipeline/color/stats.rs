//! Order statistics over one colour channel.

/// Added to every ratio denominator.
pub const RATIO_EPSILON: f64 = 1e-6;

/// Sorted copy of a channel's samples with cached moments.
#[derive(Debug, Clone)]
pub struct ChannelStats {
    sorted: Vec<f32>,
    mean: f64,
    std: f64,
}

impl ChannelStats {
    /// Build from raw samples. Callers guarantee at least one sample.
    pub fn new(mut values: Vec<f32>) -> Self {
        debug_assert!(!values.is_empty());
        let n = values.len().max(1) as f64;
        let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n;
        let var = values
            .iter()
            .map(|&v| {
                let d = v as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / n;
        values.sort_by(f32::total_cmp);
        Self {
            sorted: values,
            mean,
            std: var.sqrt(),
        }
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Population standard deviation.
    pub fn std(&self) -> f64 {
        self.std
    }

    pub fn median(&self) -> f64 {
        self.percentile(50.0)
    }

    /// Percentile `p` in [0, 100], linearly interpolated between closest ranks.
    pub fn percentile(&self, p: f64) -> f64 {
        percentile_sorted(&self.sorted, p)
    }
}

/// Linear-interpolation percentile over an ascending slice.
pub fn percentile_sorted(sorted: &[f32], p: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0] as f64,
        n => {
            let rank = (p.clamp(0.0, 100.0) / 100.0) * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let lo_val = sorted[lo] as f64;
            let hi_val = sorted[hi] as f64;
            lo_val + (hi_val - lo_val) * (rank - lo as f64)
        }
    }
}

/// `numerator / (denominator + ε)`.
pub fn ratio(numerator: f64, denominator: f64) -> f64 {
    numerator / (denominator + RATIO_EPSILON)
}
