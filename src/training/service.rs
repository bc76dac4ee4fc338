//! Training pipeline: generate the dataset, fit scaler and model together and
//! hand the pair to an artifact repository.

use std::time::Instant;

use tracing::info;

use crate::common::error::{DefectError, DefectResult};
use crate::common::log::elapsed_ms;
use crate::common::time;
use crate::data::domain::TrainingDataset;
use crate::data::service as data_service;

use super::domain::{ArtifactRepo, ModelMeta, ModelSnapshot, TrainConfig};
use super::forest::DefectModel;
use super::scaler::Scaler;

/// Fits a fresh scaler/model pair for a fixed configuration.
#[derive(Clone, Debug, Default)]
pub struct TrainingPipeline {
    cfg: TrainConfig,
}

impl TrainingPipeline {
    pub fn new(cfg: TrainConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &TrainConfig {
        &self.cfg
    }

    /// The synthetic training set for this configuration's size and seed.
    pub fn generate_dataset(&self) -> TrainingDataset {
        data_service::generate_dataset(self.cfg.n_samples, self.cfg.seed)
    }

    /// Generate the dataset and fit on it.
    pub fn fit(&self) -> DefectResult<ModelSnapshot> {
        let dataset = self.generate_dataset();
        self.fit_dataset(&dataset)
    }

    /// Fit the scaler on raw rows, then the model on the scaled rows.
    pub fn fit_dataset(&self, dataset: &TrainingDataset) -> DefectResult<ModelSnapshot> {
        if dataset.is_empty() {
            return Err(DefectError::invalid("training dataset is empty"));
        }
        let start = Instant::now();
        let trained_at = time::now_utc();

        let scaler = Scaler::fit(&dataset.rows)?;
        let scaled = scaler.transform_all(&dataset.rows);
        let model = DefectModel::fit(
            &scaled,
            &dataset.targets,
            self.cfg.n_estimators,
            self.cfg.tree_params(),
            self.cfg.seed,
        )?;

        let meta = ModelMeta {
            fingerprint: self.cfg.fingerprint(&trained_at),
            trained_at,
            config: self.cfg,
        };
        info!(
            ev = "model_trained",
            fingerprint = %meta.fingerprint,
            rows = dataset.len(),
            n_estimators = model.n_estimators(),
            dur_ms = elapsed_ms(start),
            "fitted scaler and defect model"
        );
        Ok(ModelSnapshot {
            scaler,
            model,
            meta,
        })
    }

    /// Write the pair through `repo`. Errors are returned, never swallowed.
    pub fn persist<R>(&self, repo: &R, snapshot: &ModelSnapshot) -> DefectResult<()>
    where
        R: ArtifactRepo + ?Sized,
    {
        repo.persist(snapshot)
    }

    /// `fit` followed by `persist`; the snapshot is only returned once stored.
    pub fn train_and_persist<R>(&self, repo: &R) -> DefectResult<ModelSnapshot>
    where
        R: ArtifactRepo + ?Sized,
    {
        let snapshot = self.fit()?;
        self.persist(repo, &snapshot)?;
        Ok(snapshot)
    }
}
