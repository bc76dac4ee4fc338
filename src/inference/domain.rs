//! Domain definitions for predictions and service status reporting.

use serde::{Deserialize, Serialize};

use crate::data::domain::{Feature, FeatureVector};
use crate::evaluation::domain::{EvalReport, RiskBand};
use crate::training::domain::ModelMeta;

/// Lower bound of a reported defect probability, in percent.
pub const MIN_PROBABILITY: f64 = 0.0;
/// Upper bound of a reported defect probability, in percent.
pub const MAX_PROBABILITY: f64 = 100.0;

/// Name reported for the estimator family.
pub const MODEL_TYPE: &str = "RandomForestRegressor";
/// Name of the predicted quantity.
pub const TARGET_NAME: &str = "defect_probability";

/// Format a generated batch id from a 1-based position.
pub fn generated_batch_id(position: usize) -> String {
    format!("BATCH_{position:05}")
}

/// Clamp a raw model output into the reported range.
pub fn clamp_probability(raw: f64) -> f64 {
    raw.clamp(MIN_PROBABILITY, MAX_PROBABILITY)
}

/// One prediction in a batch response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub batch_id: String,
    pub defect_probability: f64,
    pub risk_band: RiskBand,
    /// Inputs after defaults were applied.
    #[serde(flatten)]
    pub features: FeatureVector,
    /// ISO-8601 time the prediction was computed.
    pub timestamp: String,
}

/// Lifecycle of the prediction service.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Uninitialized,
    Ready,
}

/// How `initialize` reached the ready state.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum InitOutcome {
    Loaded,
    Trained,
    AlreadyReady,
}

/// Result of a completed retrain.
#[derive(Clone, Debug, PartialEq)]
pub struct RetrainOutcome {
    pub meta: ModelMeta,
    /// `None` when hold-out scoring failed after the new pair was installed.
    pub report: Option<EvalReport>,
}

/// Health report; never mutates service state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Health {
    pub status: ServiceState,
    pub model_loaded: bool,
}

/// Static description of the model plus the provenance of the active pair.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model_type: String,
    pub features: Vec<String>,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_estimators: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

impl ModelInfo {
    pub fn describe() -> Self {
        Self {
            model_type: MODEL_TYPE.to_string(),
            features: Feature::names().into_iter().map(String::from).collect(),
            target: TARGET_NAME.to_string(),
            n_estimators: None,
            fingerprint: None,
            last_updated: None,
        }
    }
}
