//! The prediction service: owns the active scaler/model pair, brings it up
//! from storage or training, and serves batch predictions against it.
//!
//! The active pair lives behind a single `Arc` that is replaced wholesale on
//! retrain. Readers clone the `Arc` and release the lock before doing any
//! work, so an in-flight batch keeps using the pair it started with.

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;

use tracing::{info, warn};

use crate::common::config::AppCfg;
use crate::common::error::{DefectError, DefectResult};
use crate::common::log::elapsed_ms;
use crate::common::time;
use crate::data::domain::RawRecord;
use crate::evaluation::domain::RiskBand;
use crate::evaluation::service as evaluation;
use crate::training::domain::{ArtifactRepo, ModelSnapshot};
use crate::training::repo_fs::FsArtifactRepo;
use crate::training::service::TrainingPipeline;

use super::domain::{
    clamp_probability, generated_batch_id, Health, InitOutcome, ModelInfo, PredictionRecord,
    RetrainOutcome, ServiceState,
};

pub struct PredictionService<R> {
    repo: R,
    pipeline: TrainingPipeline,
    active: RwLock<Option<Arc<ModelSnapshot>>>,
    /// Serialises initialization and retraining.
    writer: Mutex<()>,
}

impl PredictionService<FsArtifactRepo> {
    /// Service persisting to the configured model directory.
    pub fn from_cfg(cfg: &AppCfg) -> Self {
        Self::new(
            FsArtifactRepo::from_cfg(cfg),
            TrainingPipeline::new(cfg.train_config()),
        )
    }
}

impl<R: ArtifactRepo> PredictionService<R> {
    /// A service in the `Uninitialized` state.
    pub fn new(repo: R, pipeline: TrainingPipeline) -> Self {
        Self {
            repo,
            pipeline,
            active: RwLock::new(None),
            writer: Mutex::new(()),
        }
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    pub fn pipeline(&self) -> &TrainingPipeline {
        &self.pipeline
    }

    pub fn state(&self) -> ServiceState {
        if self.current().is_some() {
            ServiceState::Ready
        } else {
            ServiceState::Uninitialized
        }
    }

    /// The active pair, or `NotReady` before initialization completes.
    pub fn snapshot(&self) -> DefectResult<Arc<ModelSnapshot>> {
        self.current().ok_or(DefectError::NotReady)
    }

    fn current(&self) -> Option<Arc<ModelSnapshot>> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn install(&self, snapshot: ModelSnapshot) {
        let next = Arc::new(snapshot);
        *self.active.write().unwrap_or_else(PoisonError::into_inner) = Some(next);
    }

    /// Load the persisted pair, training and persisting a new one if none
    /// exists. On error the service stays `Uninitialized`.
    pub fn initialize(&self) -> DefectResult<InitOutcome> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if self.current().is_some() {
            return Ok(InitOutcome::AlreadyReady);
        }

        let start = Instant::now();
        let (snapshot, outcome) = match self.repo.load()? {
            Some(snapshot) => (snapshot, InitOutcome::Loaded),
            None => {
                info!(ev = "artifacts_not_found", "no persisted model, training a new one");
                let snapshot = self.pipeline.train_and_persist(&self.repo)?;
                (snapshot, InitOutcome::Trained)
            }
        };

        info!(
            ev = "service_ready",
            fingerprint = %snapshot.meta.fingerprint,
            outcome = ?outcome,
            dur_ms = elapsed_ms(start),
            "prediction service initialized"
        );
        self.install(snapshot);
        Ok(outcome)
    }

    /// Retrain with the service's own pipeline.
    pub fn retrain(&self) -> DefectResult<RetrainOutcome> {
        self.retrain_with(&self.pipeline)
    }

    /// Fit and persist a new pair, then swap it in. If fitting or persisting
    /// fails the previous pair (if any) stays active.
    pub fn retrain_with(&self, pipeline: &TrainingPipeline) -> DefectResult<RetrainOutcome> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let start = Instant::now();

        let snapshot = match pipeline.train_and_persist(&self.repo) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(ev = "retrain_failed", code = err.code() as u32, error = %err);
                return Err(err);
            }
        };
        let meta = snapshot.meta.clone();
        self.install(snapshot);
        info!(
            ev = "model_swapped",
            fingerprint = %meta.fingerprint,
            dur_ms = elapsed_ms(start),
            "retrained model is now active"
        );

        let report = match self.snapshot().and_then(|s| evaluation::evaluate_holdout(&s)) {
            Ok(report) => Some(report),
            Err(err) => {
                warn!(ev = "holdout_failed", error = %err);
                None
            }
        };
        Ok(RetrainOutcome { meta, report })
    }

    /// Predict every record of a batch against one consistent pair.
    ///
    /// Any record failing conversion or inference rejects the whole batch.
    pub fn predict_batch(&self, records: &[RawRecord]) -> DefectResult<Vec<PredictionRecord>> {
        if records.is_empty() {
            warn!(ev = "batch_rejected", reason = "empty");
            return Err(DefectError::invalid("batch_data is empty"));
        }
        let snapshot = self.snapshot()?;
        let start = Instant::now();

        let result = records
            .iter()
            .enumerate()
            .map(|(i, record)| {
                predict_record(&snapshot, i + 1, record).map_err(|e| DefectError::record(i + 1, e))
            })
            .collect::<DefectResult<Vec<_>>>();

        match &result {
            Ok(predictions) => info!(
                ev = "batch_predicted",
                records = predictions.len(),
                fingerprint = %snapshot.meta.fingerprint,
                dur_ms = elapsed_ms(start),
                "batch predicted"
            ),
            Err(err) => warn!(
                ev = "batch_rejected",
                code = err.code() as u32,
                error = %err,
                "batch rejected"
            ),
        }
        result
    }

    pub fn model_info(&self) -> ModelInfo {
        let mut info = ModelInfo::describe();
        if let Some(snapshot) = self.current() {
            info.n_estimators = Some(snapshot.model.n_estimators());
            info.fingerprint = Some(snapshot.meta.fingerprint.clone());
            info.last_updated = Some(time::iso(&snapshot.meta.trained_at));
        }
        info
    }

    pub fn health(&self) -> Health {
        let status = self.state();
        Health {
            status,
            model_loaded: status == ServiceState::Ready,
        }
    }
}

fn predict_record(
    snapshot: &ModelSnapshot,
    position: usize,
    record: &RawRecord,
) -> DefectResult<PredictionRecord> {
    let features = record.features()?;
    let probability = clamp_probability(snapshot.predict(&features)?);
    Ok(PredictionRecord {
        batch_id: record
            .batch_id()
            .unwrap_or_else(|| generated_batch_id(position)),
        defect_probability: probability,
        risk_band: RiskBand::classify(probability),
        features,
        timestamp: time::now_iso(),
    })
}
