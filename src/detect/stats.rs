use crate::detect::DetectError;

/// A sample population of durations for statistical comparison.
#[derive(Debug, Clone)]
pub struct Samples {
    values: Vec<f64>,
}

impl Samples {
    pub fn new(mut values: Vec<f64>) -> Self {
        values.retain(|v| v.is_finite());
        values.sort_by(f64::total_cmp);
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    /// Population variance.
    pub fn variance(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let mean = self.mean();
        let sum_sq_diff: f64 = self.values.iter().map(|&x| (x - mean).powi(2)).sum();
        sum_sq_diff / self.values.len() as f64
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Quantile with linear interpolation between closest ranks, `q` in [0, 1].
    pub fn quantile(&self, q: f64) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        let pos = q.clamp(0.0, 1.0) * (self.values.len() - 1) as f64;
        let lo = pos.floor() as usize;
        let hi = pos.ceil() as usize;
        let frac = pos - lo as f64;
        Some(self.values[lo] + (self.values[hi] - self.values[lo]) * frac)
    }

    /// First and third quartiles.
    pub fn quartiles(&self) -> Option<(f64, f64)> {
        Some((self.quantile(0.25)?, self.quantile(0.75)?))
    }

    /// Z = (value - mean) / std_dev. Zero when the population has no spread.
    pub fn z_score(&self, value: f64, min_samples: usize) -> Result<f64, DetectError> {
        if self.values.len() < min_samples {
            return Err(DetectError::InsufficientBaseline {
                needed: min_samples,
                have: self.values.len(),
            });
        }
        let std = self.std_dev();
        if std == 0.0 {
            return Ok(0.0);
        }
        Ok((value - self.mean()) / std)
    }
}
