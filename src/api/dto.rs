//! Request and response bodies of the HTTP-style interface.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::evaluation::domain::{BatchSummary, EvalReport};
use crate::inference::domain::{ModelInfo, PredictionRecord, ServiceState};

/// `POST /predict/batch` body. A missing `batch_data` behaves like an empty one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredictBatchRequest {
    #[serde(default)]
    pub batch_data: Vec<Value>,
}

/// Successful `POST /predict/batch` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictBatchResponse {
    pub success: bool,
    pub message: String,
    pub predictions: Vec<PredictionRecord>,
    pub summary: BatchSummary,
}

/// Response of `POST /model/retrain` and of every failed request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
    /// Stable error code, present on failures only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<EvalReport>,
}

impl MessageResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            code: None,
            fingerprint: None,
            metrics: None,
        }
    }

    pub fn error(message: impl Into<String>, code: u32) -> Self {
        Self {
            success: false,
            message: message.into(),
            code: Some(code),
            fingerprint: None,
            metrics: None,
        }
    }
}

/// `GET /model/info` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfoResponse {
    pub success: bool,
    #[serde(flatten)]
    pub info: ModelInfo,
}

/// `GET /health` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ServiceState,
    pub timestamp: String,
    pub model_loaded: bool,
}
