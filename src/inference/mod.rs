//! Inference domain: the prediction service and its result types.

pub mod domain;
pub mod service;

pub use domain::{Health, InitOutcome, ModelInfo, PredictionRecord, RetrainOutcome, ServiceState};
pub use service::PredictionService;
