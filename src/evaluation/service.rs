//! Scoring of fitted models and summaries of prediction batches.

use tracing::info;

use crate::common::error::{DefectError, DefectResult};
use crate::data::domain::TrainingDataset;
use crate::data::service as data_service;
use crate::training::domain::ModelSnapshot;

use super::domain::{BatchSummary, EvalReport, RiskBand};

/// The hold-out set is the training size divided by this.
const HOLDOUT_DIVISOR: usize = 5;

/// Score `snapshot` against a labelled dataset.
pub fn evaluate(snapshot: &ModelSnapshot, dataset: &TrainingDataset) -> DefectResult<EvalReport> {
    if dataset.is_empty() {
        return Err(DefectError::invalid("evaluation dataset is empty"));
    }
    let predictions = dataset
        .rows
        .iter()
        .map(|row| snapshot.predict(row))
        .collect::<DefectResult<Vec<_>>>()?;

    let n = dataset.len() as f64;
    let mean_y = dataset.targets.iter().sum::<f64>() / n;
    let mut abs_err = 0.0;
    let mut sq_err = 0.0;
    let mut sq_tot = 0.0;
    for (pred, actual) in predictions.iter().zip(&dataset.targets) {
        abs_err += (pred - actual).abs();
        sq_err += (pred - actual).powi(2);
        sq_tot += (actual - mean_y).powi(2);
    }
    let r2 = if sq_tot > 0.0 { 1.0 - sq_err / sq_tot } else { 0.0 };

    Ok(EvalReport {
        n_rows: dataset.len(),
        r2,
        mae: abs_err / n,
        rmse: (sq_err / n).sqrt(),
    })
}

/// Score `snapshot` on fresh synthetic rows drawn with the next seed.
pub fn evaluate_holdout(snapshot: &ModelSnapshot) -> DefectResult<EvalReport> {
    let cfg = &snapshot.meta.config;
    let n = (cfg.n_samples / HOLDOUT_DIVISOR).max(1);
    let holdout = data_service::generate_dataset(n, cfg.seed.wrapping_add(1));
    let report = evaluate(snapshot, &holdout)?;
    info!(
        ev = "holdout_scored",
        fingerprint = %snapshot.meta.fingerprint,
        rows = report.n_rows,
        r2 = report.r2,
        mae = report.mae,
        "scored model on hold-out rows"
    );
    Ok(report)
}

/// Summarise the defect probabilities of one batch.
pub fn summarize<I>(probabilities: I) -> BatchSummary
where
    I: IntoIterator<Item = f64>,
{
    let mut summary = BatchSummary {
        min: f64::INFINITY,
        max: f64::NEG_INFINITY,
        ..BatchSummary::default()
    };
    let mut total = 0.0;
    for p in probabilities {
        summary.count += 1;
        total += p;
        summary.min = summary.min.min(p);
        summary.max = summary.max.max(p);
        match RiskBand::classify(p) {
            RiskBand::Good => summary.good += 1,
            RiskBand::Warning => summary.warning += 1,
            RiskBand::Danger => summary.danger += 1,
        }
    }
    if summary.count == 0 {
        return BatchSummary::default();
    }
    summary.mean = total / summary.count as f64;
    summary
}
