//! Evaluation: hold-out scoring of trained models and batch risk summaries.

pub mod domain;
pub mod service;

pub use domain::{BatchSummary, EvalReport, RiskBand};
