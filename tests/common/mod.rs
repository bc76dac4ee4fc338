//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use defect_predict::training::domain::{ArtifactRepo, ModelSnapshot, TrainConfig};
use defect_predict::{DefectError, DefectResult, TrainingPipeline};

/// In-memory artifact store with optional slow and failing writes.
#[derive(Default)]
pub struct MemoryRepo {
    stored: Mutex<Option<ModelSnapshot>>,
    persist_delay: Option<Duration>,
    fail_writes: AtomicBool,
}

impl MemoryRepo {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            persist_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn stored_fingerprint(&self) -> Option<String> {
        self.stored
            .lock()
            .unwrap()
            .as_ref()
            .map(|s| s.meta.fingerprint.clone())
    }
}

impl ArtifactRepo for MemoryRepo {
    fn persist(&self, snapshot: &ModelSnapshot) -> DefectResult<()> {
        if let Some(delay) = self.persist_delay {
            std::thread::sleep(delay);
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DefectError::artifact("memory", "writes disabled"));
        }
        *self.stored.lock().unwrap() = Some(snapshot.clone());
        Ok(())
    }

    fn load(&self) -> DefectResult<Option<ModelSnapshot>> {
        Ok(self.stored.lock().unwrap().clone())
    }
}

/// A pipeline small enough to fit in well under a second.
pub fn small_pipeline(seed: u64) -> TrainingPipeline {
    TrainingPipeline::new(TrainConfig {
        n_samples: 150,
        n_estimators: 6,
        seed,
        ..TrainConfig::default()
    })
}
