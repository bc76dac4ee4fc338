//! Model quality metrics and batch risk classification.

use serde::{Deserialize, Serialize};

/// Hold-out quality of a fitted scaler/model pair.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvalReport {
    pub n_rows: usize,
    pub r2: f64,
    pub mae: f64,
    pub rmse: f64,
}

/// Dashboard risk band for a predicted defect rate.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskBand {
    Good,
    Warning,
    Danger,
}

impl RiskBand {
    /// Upper bound (exclusive) of the `Good` band, in percent.
    pub const GOOD_BELOW: f64 = 5.0;
    /// Upper bound (exclusive) of the `Warning` band, in percent.
    pub const WARNING_BELOW: f64 = 10.0;

    pub fn classify(defect_pct: f64) -> Self {
        if defect_pct < Self::GOOD_BELOW {
            RiskBand::Good
        } else if defect_pct < Self::WARNING_BELOW {
            RiskBand::Warning
        } else {
            RiskBand::Danger
        }
    }
}

/// Aggregate over the predictions of one batch request.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub good: usize,
    pub warning: usize,
    pub danger: usize,
}
