//! Transport-agnostic handlers for the four endpoints.
//!
//! Each handler takes the service (and the raw request body where there is
//! one) and returns a status code with a JSON body, so any HTTP stack can
//! mount them. No handler panics or leaves the service in a new state on
//! failure.

use serde::Serialize;
use serde_json::Value;

use crate::common::error::{DefectError, DefectResult, ErrorCode};
use crate::common::time;
use crate::data::domain::RawRecord;
use crate::evaluation::service::summarize;
use crate::inference::service::PredictionService;
use crate::training::domain::ArtifactRepo;

use super::dto::{
    HealthResponse, MessageResponse, ModelInfoResponse, PredictBatchRequest,
    PredictBatchResponse,
};

/// A status code and JSON body ready to be written to the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: u16,
    pub body: Value,
}

impl Reply {
    fn json<T: Serialize>(status: u16, body: &T) -> Self {
        match serde_json::to_value(body) {
            Ok(body) => Self { status, body },
            Err(e) => Self::failure(&DefectError::inference(format!("response encoding: {e}"))),
        }
    }

    fn failure(err: &DefectError) -> Self {
        let code = err.code();
        let body = MessageResponse::error(err.to_string(), code as u32);
        Self {
            status: code.http_status(),
            body: serde_json::to_value(body).unwrap_or(Value::Null),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ErrorCode::Ok.http_status()
    }
}

fn parse_batch(body: &str) -> DefectResult<Vec<RawRecord>> {
    let request: PredictBatchRequest = serde_json::from_str(body)
        .map_err(|e| DefectError::invalid(format!("request body is not a batch object: {e}")))?;
    request
        .batch_data
        .into_iter()
        .enumerate()
        .map(|(i, value)| RawRecord::from_value(value).map_err(|e| DefectError::record(i + 1, e)))
        .collect()
}

/// `POST /predict/batch`
pub fn predict_batch<R: ArtifactRepo>(service: &PredictionService<R>, body: &str) -> Reply {
    let predictions = match parse_batch(body).and_then(|records| service.predict_batch(&records)) {
        Ok(predictions) => predictions,
        Err(err) => return Reply::failure(&err),
    };
    let summary = summarize(predictions.iter().map(|p| p.defect_probability));
    Reply::json(
        200,
        &PredictBatchResponse {
            success: true,
            message: format!("predicted {} batches", predictions.len()),
            predictions,
            summary,
        },
    )
}

/// `POST /model/retrain`
pub fn retrain<R: ArtifactRepo>(service: &PredictionService<R>) -> Reply {
    match service.retrain() {
        Ok(outcome) => {
            let mut body = MessageResponse::ok("model retrained");
            body.fingerprint = Some(outcome.meta.fingerprint);
            body.metrics = outcome.report;
            Reply::json(200, &body)
        }
        Err(err) => Reply::failure(&err),
    }
}

/// `GET /model/info`
pub fn model_info<R: ArtifactRepo>(service: &PredictionService<R>) -> Reply {
    Reply::json(
        200,
        &ModelInfoResponse {
            success: true,
            info: service.model_info(),
        },
    )
}

/// `GET /health`
pub fn health<R: ArtifactRepo>(service: &PredictionService<R>) -> Reply {
    let health = service.health();
    Reply::json(
        200,
        &HealthResponse {
            status: health.status,
            timestamp: time::now_iso(),
            model_loaded: health.model_loaded,
        },
    )
}
