//! Data domain: the batch feature schema, client records and dataset producers.

pub mod domain;
pub mod service;

pub use domain::{Feature, FeatureVector, RawRecord, TrainingDataset, N_FEATURES};
