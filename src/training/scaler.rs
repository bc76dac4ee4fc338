//! Per-feature standardization fitted on the training rows.

use serde::{Deserialize, Serialize};

use crate::common::error::{DefectError, DefectResult};
use crate::data::domain::{FeatureVector, N_FEATURES};

/// A feature vector after standardization, in schema order.
pub type ScaledRow = [f64; N_FEATURES];

/// Standard deviations below this are treated as zero variance.
pub const MIN_STD: f64 = 1e-10;

/// Fitted mean and standard deviation per feature. Immutable after `fit`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scaler {
    mean: [f64; N_FEATURES],
    std: [f64; N_FEATURES],
}

impl Scaler {
    /// Compute per-feature mean and population standard deviation.
    ///
    /// A zero-variance feature gets a standard deviation of `1.0`, so it is
    /// centred but not scaled.
    pub fn fit(rows: &[FeatureVector]) -> DefectResult<Self> {
        if rows.is_empty() {
            return Err(DefectError::invalid("cannot fit scaler on zero rows"));
        }
        let n = rows.len() as f64;

        let mut mean = [0.0; N_FEATURES];
        for row in rows {
            for (m, x) in mean.iter_mut().zip(row.to_array()) {
                *m += x;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let mut std = [0.0; N_FEATURES];
        for row in rows {
            for ((s, x), m) in std.iter_mut().zip(row.to_array()).zip(mean) {
                *s += (x - m) * (x - m);
            }
        }
        for s in &mut std {
            *s = (*s / n).sqrt();
            if *s < MIN_STD {
                *s = 1.0;
            }
        }

        Ok(Self { mean, std })
    }

    pub fn transform(&self, v: &FeatureVector) -> ScaledRow {
        let raw = v.to_array();
        std::array::from_fn(|j| (raw[j] - self.mean[j]) / self.std[j])
    }

    pub fn transform_all(&self, rows: &[FeatureVector]) -> Vec<ScaledRow> {
        rows.iter().map(|r| self.transform(r)).collect()
    }

    pub fn mean(&self) -> &[f64; N_FEATURES] {
        &self.mean
    }

    pub fn std(&self) -> &[f64; N_FEATURES] {
        &self.std
    }

    /// Reject states that could not have come out of `fit`.
    pub(crate) fn check(&self) -> Result<(), String> {
        let finite = self.mean.iter().chain(&self.std).all(|x| x.is_finite());
        if !finite {
            return Err("scaler contains non-finite statistics".into());
        }
        if self.std.iter().any(|s| *s < MIN_STD) {
            return Err("scaler contains a zero standard deviation".into());
        }
        Ok(())
    }
}
