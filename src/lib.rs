// lib.rs - defect-rate prediction core
pub mod api;
pub mod common;
pub mod data;
pub mod evaluation;
pub mod inference;
pub mod training;

pub use common::config::AppCfg;
pub use common::error::{DefectError, DefectResult, ErrorCode};
pub use data::domain::{FeatureVector, RawRecord};
pub use inference::service::PredictionService;
pub use training::repo_fs::FsArtifactRepo;
pub use training::service::TrainingPipeline;

/// Read configuration from the environment, install logging and bring up a
/// ready service backed by the configured model directory.
pub fn bootstrap() -> DefectResult<PredictionService<FsArtifactRepo>> {
    let cfg = AppCfg::load()?;
    common::log::init(&cfg.log_filter);
    let service = PredictionService::from_cfg(&cfg);
    service.initialize()?;
    Ok(service)
}
