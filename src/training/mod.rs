//! Training domain: scaler and forest fitting, the training pipeline and
//! artifact persistence.

pub mod domain;
pub mod forest;
pub mod repo_fs;
pub mod scaler;
pub mod service;

pub use domain::{ArtifactRepo, ModelMeta, ModelSnapshot, TrainConfig};
pub use forest::{DefectModel, TreeParams};
pub use repo_fs::FsArtifactRepo;
pub use scaler::Scaler;
pub use service::TrainingPipeline;
