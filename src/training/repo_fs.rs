//! Filesystem repository for the scaler and model artifacts.
//!
//! Each artifact is a 4 byte magic tag, a little-endian `u16` format version
//! and a bincode payload. Files are written to a temporary sibling and renamed
//! into place. Both files carry the training fingerprint; a pair whose
//! fingerprints disagree loads as missing so the caller retrains.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::common::config::AppCfg;
use crate::common::error::{DefectError, DefectResult};
use crate::common::log::elapsed_ms;

use super::domain::{ArtifactRepo, ModelMeta, ModelSnapshot};
use super::forest::DefectModel;
use super::scaler::Scaler;

pub const SCALER_FILE: &str = "scaler.bin";
pub const MODEL_FILE: &str = "defect_prediction_model.bin";

const SCALER_MAGIC: &[u8; 4] = b"DPSC";
const MODEL_MAGIC: &[u8; 4] = b"DPMD";
const FORMAT_VERSION: u16 = 1;
const HEADER_LEN: usize = 6;

#[derive(Serialize, Deserialize)]
struct ScalerArtifact {
    fingerprint: String,
    scaler: Scaler,
}

#[derive(Serialize, Deserialize)]
struct ModelArtifact {
    meta: ModelMeta,
    model: DefectModel,
}

/// Persist artifacts under a single directory.
#[derive(Clone, Debug)]
pub struct FsArtifactRepo {
    root: PathBuf,
}

impl FsArtifactRepo {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_cfg(cfg: &AppCfg) -> Self {
        Self::new(&cfg.model_dir)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scaler_path(&self) -> PathBuf {
        self.root.join(SCALER_FILE)
    }

    pub fn model_path(&self) -> PathBuf {
        self.root.join(MODEL_FILE)
    }
}

fn encode<T: Serialize>(magic: &[u8; 4], value: &T, path: &Path) -> DefectResult<Vec<u8>> {
    let payload = bincode::serialize(value)
        .map_err(|e| DefectError::artifact(path, format!("encode failed: {e}")))?;
    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(magic);
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

fn decode<T: DeserializeOwned>(magic: &[u8; 4], bytes: &[u8], path: &Path) -> DefectResult<T> {
    if bytes.len() < HEADER_LEN || &bytes[..4] != magic {
        return Err(DefectError::artifact(path, "unrecognised artifact header"));
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != FORMAT_VERSION {
        return Err(DefectError::artifact(
            path,
            format!("unsupported format version {version}"),
        ));
    }
    bincode::deserialize(&bytes[HEADER_LEN..])
        .map_err(|e| DefectError::artifact(path, format!("decode failed: {e}")))
}

fn staged_path(path: &Path) -> PathBuf {
    path.with_extension("bin.tmp")
}

fn write_staged(staged: &Path, bytes: &[u8]) -> DefectResult<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(staged)
        .map_err(|e| DefectError::io(staged, e))?;
    file.write_all(bytes)
        .and_then(|_| file.sync_all())
        .map_err(|e| DefectError::io(staged, e))
}

fn rename(from: &Path, to: &Path) -> DefectResult<()> {
    fs::rename(from, to).map_err(|e| DefectError::io(to, e))
}

/// Best-effort removal of a staged file left behind by a failed write.
fn discard(staged: &Path) {
    match fs::remove_file(staged) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(ev = "staged_cleanup_failed", path = %staged.display(), error = %e),
    }
}

/// `Ok(None)` when the file does not exist.
fn read_optional(path: &Path) -> DefectResult<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(DefectError::io(path, e)),
    }
}

impl ArtifactRepo for FsArtifactRepo {
    fn persist(&self, snapshot: &ModelSnapshot) -> DefectResult<()> {
        let start = Instant::now();
        fs::create_dir_all(&self.root).map_err(|e| DefectError::io(&self.root, e))?;

        let scaler_path = self.scaler_path();
        let model_path = self.model_path();
        let scaler_bytes = encode(
            SCALER_MAGIC,
            &ScalerArtifact {
                fingerprint: snapshot.meta.fingerprint.clone(),
                scaler: snapshot.scaler.clone(),
            },
            &scaler_path,
        )?;
        let model_bytes = encode(
            MODEL_MAGIC,
            &ModelArtifact {
                meta: snapshot.meta.clone(),
                model: snapshot.model.clone(),
            },
            &model_path,
        )?;

        let staged_scaler = staged_path(&scaler_path);
        let staged_model = staged_path(&model_path);
        let written = write_staged(&staged_scaler, &scaler_bytes)
            .and_then(|_| write_staged(&staged_model, &model_bytes))
            .and_then(|_| rename(&staged_scaler, &scaler_path))
            .and_then(|_| rename(&staged_model, &model_path));
        if let Err(err) = written {
            discard(&staged_scaler);
            discard(&staged_model);
            warn!(
                ev = "artifacts_save_failed",
                dir = %self.root.display(),
                code = err.code() as u32,
                error = %err,
                "persisting scaler and model failed"
            );
            return Err(err);
        }

        info!(
            ev = "artifacts_saved",
            dir = %self.root.display(),
            fingerprint = %snapshot.meta.fingerprint,
            bytes = scaler_bytes.len() + model_bytes.len(),
            dur_ms = elapsed_ms(start),
            "persisted scaler and model"
        );
        Ok(())
    }

    fn load(&self) -> DefectResult<Option<ModelSnapshot>> {
        let start = Instant::now();
        let scaler_path = self.scaler_path();
        let model_path = self.model_path();

        let (Some(scaler_bytes), Some(model_bytes)) =
            (read_optional(&scaler_path)?, read_optional(&model_path)?)
        else {
            debug!(ev = "artifacts_missing", dir = %self.root.display());
            return Ok(None);
        };

        let scaler: ScalerArtifact = decode(SCALER_MAGIC, &scaler_bytes, &scaler_path)?;
        let model: ModelArtifact = decode(MODEL_MAGIC, &model_bytes, &model_path)?;

        // Torn pair from a write interrupted between the two renames.
        if scaler.fingerprint != model.meta.fingerprint {
            warn!(
                ev = "artifacts_mismatched",
                dir = %self.root.display(),
                scaler = %scaler.fingerprint,
                model = %model.meta.fingerprint,
                "scaler and model come from different runs, treating as missing"
            );
            return Ok(None);
        }
        scaler
            .scaler
            .check()
            .map_err(|reason| DefectError::artifact(&scaler_path, reason))?;
        model
            .model
            .check()
            .map_err(|reason| DefectError::artifact(&model_path, reason))?;

        info!(
            ev = "artifacts_loaded",
            dir = %self.root.display(),
            fingerprint = %model.meta.fingerprint,
            dur_ms = elapsed_ms(start),
            "loaded scaler and model"
        );
        Ok(Some(ModelSnapshot {
            scaler: scaler.scaler,
            model: model.model,
            meta: model.meta,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::domain::FeatureVector;
    use crate::training::domain::TrainConfig;
    use crate::training::service::TrainingPipeline;

    fn small_snapshot(seed: u64) -> ModelSnapshot {
        TrainingPipeline::new(TrainConfig {
            n_samples: 120,
            n_estimators: 4,
            seed,
            ..TrainConfig::default()
        })
        .fit()
        .unwrap()
    }

    #[test]
    fn empty_directory_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FsArtifactRepo::new(dir.path().join("models"));
        assert!(repo.load().unwrap().is_none());
    }

    #[test]
    fn persist_creates_the_directory_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FsArtifactRepo::new(dir.path().join("nested").join("models"));
        let snapshot = small_snapshot(42);

        repo.persist(&snapshot).unwrap();
        assert!(repo.scaler_path().exists());
        assert!(repo.model_path().exists());

        let loaded = repo.load().unwrap().unwrap();
        assert_eq!(loaded, snapshot);
        let probe = FeatureVector::default();
        assert_eq!(
            loaded.predict(&probe).unwrap(),
            snapshot.predict(&probe).unwrap()
        );
    }

    #[test]
    fn half_a_pair_counts_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FsArtifactRepo::new(dir.path());
        repo.persist(&small_snapshot(1)).unwrap();
        fs::remove_file(repo.model_path()).unwrap();
        assert!(repo.load().unwrap().is_none());
    }

    #[test]
    fn mismatched_pair_loads_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FsArtifactRepo::new(dir.path());
        repo.persist(&small_snapshot(1)).unwrap();
        let first_scaler = fs::read(repo.scaler_path()).unwrap();
        repo.persist(&small_snapshot(2)).unwrap();
        fs::write(repo.scaler_path(), first_scaler).unwrap();

        assert!(repo.load().unwrap().is_none());

        let fresh = small_snapshot(3);
        repo.persist(&fresh).unwrap();
        assert_eq!(repo.load().unwrap().unwrap().meta, fresh.meta);
    }

    fn staged_files(dir: &Path) -> Vec<PathBuf> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.to_string_lossy().ends_with(".tmp"))
            .collect()
    }

    #[test]
    fn failed_rename_removes_staged_files() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FsArtifactRepo::new(dir.path());
        // A non-empty directory in place of the model file makes its rename fail.
        fs::create_dir_all(repo.model_path().join("occupied")).unwrap();

        let err = repo.persist(&small_snapshot(1)).unwrap_err();
        assert!(matches!(err, DefectError::Io { .. }), "{err}");
        assert!(staged_files(dir.path()).is_empty());
    }

    #[test]
    fn successful_persist_leaves_no_staged_files() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FsArtifactRepo::new(dir.path());
        repo.persist(&small_snapshot(1)).unwrap();
        assert!(staged_files(dir.path()).is_empty());
    }

    #[test]
    fn corrupt_artifact_is_a_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FsArtifactRepo::new(dir.path());
        repo.persist(&small_snapshot(1)).unwrap();
        fs::write(repo.model_path(), b"not a model").unwrap();

        let err = repo.load().unwrap_err();
        assert_eq!(err.code(), crate::common::error::ErrorCode::Persistence);
    }

    #[test]
    fn unwritable_root_fails_loudly() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("models");
        fs::write(&blocker, b"a file, not a directory").unwrap();
        let repo = FsArtifactRepo::new(&blocker);

        let err = repo.persist(&small_snapshot(1)).unwrap_err();
        assert!(matches!(err, DefectError::Io { .. }), "{err}");
    }
}
