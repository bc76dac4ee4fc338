//! Runtime configuration loaded from the environment.
//!
//! TODO: Merge values from a key=value file once deployments outgrow plain env vars.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use tracing_subscriber::EnvFilter;

use crate::common::error::{DefectError, DefectResult};
use crate::training::domain::TrainConfig;

/// Snapshot of configuration values consumed by the core.
#[derive(Clone, Debug)]
pub struct AppCfg {
    pub model_dir: PathBuf,
    pub n_samples: usize,
    pub seed: u64,
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub max_features: Option<usize>,
    pub log_filter: String,
}

impl Default for AppCfg {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("./models"),
            n_samples: 1000,
            seed: 42,
            n_estimators: 100,
            max_depth: None,
            max_features: None,
            log_filter: "info".to_string(),
        }
    }
}

impl AppCfg {
    /// Create a configuration snapshot from the process environment.
    pub fn load() -> DefectResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a snapshot from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> DefectResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let cfg = Self {
            model_dir: lookup("DEFECT_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_dir),
            n_samples: parse_or(&lookup, "DEFECT_N_SAMPLES", defaults.n_samples)?,
            seed: parse_or(&lookup, "DEFECT_SEED", defaults.seed)?,
            n_estimators: parse_or(&lookup, "DEFECT_N_ESTIMATORS", defaults.n_estimators)?,
            max_depth: parse_opt(&lookup, "DEFECT_MAX_DEPTH")?,
            max_features: parse_opt(&lookup, "DEFECT_MAX_FEATURES")?,
            log_filter: lookup("DEFECT_LOG").unwrap_or(defaults.log_filter),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn with_model_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.model_dir = dir.into();
        self
    }

    fn validate(&self) -> DefectResult<()> {
        if self.n_samples == 0 {
            return Err(DefectError::Config("DEFECT_N_SAMPLES must be positive".into()));
        }
        if self.n_estimators == 0 {
            return Err(DefectError::Config(
                "DEFECT_N_ESTIMATORS must be positive".into(),
            ));
        }
        if self.max_features == Some(0) {
            return Err(DefectError::Config(
                "DEFECT_MAX_FEATURES must be positive".into(),
            ));
        }
        EnvFilter::try_new(&self.log_filter).map_err(|e| {
            DefectError::Config(format!(
                "DEFECT_LOG={:?} is not a valid filter: {e}",
                self.log_filter
            ))
        })?;
        Ok(())
    }

    /// Training parameters derived from this snapshot.
    pub fn train_config(&self) -> TrainConfig {
        TrainConfig {
            n_samples: self.n_samples,
            seed: self.seed,
            n_estimators: self.n_estimators,
            max_depth: self.max_depth,
            max_features: self.max_features,
            ..TrainConfig::default()
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> DefectResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    Ok(parse_opt(lookup, key)?.unwrap_or(default))
}

fn parse_opt<F, T>(lookup: &F, key: &str) -> DefectResult<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| DefectError::Config(format!("{key}={raw:?} is not a valid number"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_env_is_empty() {
        let cfg = AppCfg::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.model_dir, PathBuf::from("./models"));
        assert_eq!(cfg.n_samples, 1000);
        assert_eq!(cfg.seed, 42);
        assert_eq!(cfg.n_estimators, 100);
        assert_eq!(cfg.max_depth, None);
        assert_eq!(cfg.log_filter, "info");
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = AppCfg::from_lookup(lookup(&[
            ("DEFECT_MODEL_DIR", "/tmp/m"),
            ("DEFECT_N_ESTIMATORS", " 25 "),
            ("DEFECT_MAX_DEPTH", "8"),
        ]))
        .unwrap();
        assert_eq!(cfg.model_dir, PathBuf::from("/tmp/m"));
        assert_eq!(cfg.n_estimators, 25);
        assert_eq!(cfg.max_depth, Some(8));

        let train = cfg.train_config();
        assert_eq!(train.n_estimators, 25);
        assert_eq!(train.max_depth, Some(8));
        assert_eq!(train.seed, 42);
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let err = AppCfg::from_lookup(lookup(&[("DEFECT_SEED", "forty-two")])).unwrap_err();
        assert!(matches!(err, DefectError::Config(_)));

        let err = AppCfg::from_lookup(lookup(&[("DEFECT_N_ESTIMATORS", "0")])).unwrap_err();
        assert!(matches!(err, DefectError::Config(_)));
    }

    #[test]
    fn log_filter_is_validated() {
        let cfg = AppCfg::from_lookup(lookup(&[("DEFECT_LOG", "warn,defect_predict=debug")]))
            .unwrap();
        assert_eq!(cfg.log_filter, "warn,defect_predict=debug");

        let err = AppCfg::from_lookup(lookup(&[("DEFECT_LOG", "defect_predict=loud")]))
            .unwrap_err();
        assert!(matches!(err, DefectError::Config(_)), "{err}");
    }
}
