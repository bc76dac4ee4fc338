//! Domain types for model training and the artifacts it produces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::error::{DefectError, DefectResult};
use crate::common::ids::SimpleHash;
use crate::data::domain::FeatureVector;

use super::forest::{DefectModel, TreeParams};
use super::scaler::Scaler;

/// Parameters of one training run.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainConfig {
    pub n_samples: usize,
    pub seed: u64,
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub max_features: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        let tree = TreeParams::default();
        Self {
            n_samples: 1000,
            seed: 42,
            n_estimators: 100,
            max_depth: tree.max_depth,
            max_features: tree.max_features,
            min_samples_split: tree.min_samples_split,
            min_samples_leaf: tree.min_samples_leaf,
        }
    }
}

impl TrainConfig {
    pub fn tree_params(&self) -> TreeParams {
        TreeParams {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
            max_features: self.max_features,
        }
    }

    /// Identify a run by its parameters and start time.
    pub fn fingerprint(&self, trained_at: &DateTime<Utc>) -> String {
        let opt = |v: Option<usize>| v.map_or(u64::MAX, |v| v as u64).to_le_bytes();
        SimpleHash::new()
            .chain(&(self.n_samples as u64).to_le_bytes())
            .chain(&self.seed.to_le_bytes())
            .chain(&(self.n_estimators as u64).to_le_bytes())
            .chain(&opt(self.max_depth))
            .chain(&opt(self.max_features))
            .chain(&(self.min_samples_split as u64).to_le_bytes())
            .chain(&(self.min_samples_leaf as u64).to_le_bytes())
            .chain(&trained_at.timestamp_nanos_opt().unwrap_or_default().to_le_bytes())
            .finish_hex()
    }
}

/// Provenance of a fitted scaler/model pair.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelMeta {
    pub fingerprint: String,
    pub trained_at: DateTime<Utc>,
    pub config: TrainConfig,
}

/// A scaler and the model fitted against its output, always used together.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelSnapshot {
    pub scaler: Scaler,
    pub model: DefectModel,
    pub meta: ModelMeta,
}

impl ModelSnapshot {
    /// Unclamped defect rate for one batch.
    pub fn predict(&self, features: &FeatureVector) -> DefectResult<f64> {
        let scaled = self.scaler.transform(features);
        let raw = self.model.predict(&scaled)?;
        if raw.is_finite() {
            Ok(raw)
        } else {
            Err(DefectError::inference("model produced a non-finite prediction"))
        }
    }
}

/// Storage for the persisted scaler/model pair.
pub trait ArtifactRepo: Send + Sync {
    /// Write both artifacts. A write interrupted part way may leave a torn
    /// pair behind, which `load` must report as absent.
    fn persist(&self, snapshot: &ModelSnapshot) -> DefectResult<()>;

    /// Read both artifacts. `Ok(None)` means no usable pair is stored: none
    /// was persisted yet, or the two halves come from different runs.
    fn load(&self) -> DefectResult<Option<ModelSnapshot>>;
}
