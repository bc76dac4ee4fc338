//! Dataset producers: the seeded synthetic generator used for training and
//! CSV ingestion of client batch files.

use std::f64::consts::PI;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;

use crate::common::error::{DefectError, DefectResult};

use super::domain::{Feature, FeatureVector, RawRecord, TrainingDataset, N_FEATURES};

/// Standard deviation of the noise term in the defect formula.
const NOISE_STD: f64 = 0.02;
/// Baseline defect rate in percent.
const BASELINE_PCT: f64 = 5.0;
/// Upper bound of the synthetic defect rate in percent.
const MAX_SYNTHETIC_PCT: f64 = 20.0;

/// Draw one standard normal sample using the Box-Muller transform.
fn standard_normal(rng: &mut StdRng) -> f64 {
    // 1 - [0, 1) keeps u1 away from zero so ln(u1) stays finite.
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

/// Ground-truth defect rate for one batch given its noise draw.
pub fn defect_rate(v: &FeatureVector, noise: f64) -> f64 {
    let signal: f64 = Feature::ALL
        .iter()
        .map(|&f| {
            let (mean, std) = f.distribution();
            f.defect_weight() * (v.get(f) - mean) / std
        })
        .sum();
    ((signal + noise) * 100.0 + BASELINE_PCT).clamp(0.0, MAX_SYNTHETIC_PCT)
}

/// Generate `n` synthetic rows from a fixed seed.
///
/// Each feature column is drawn in full before the next one, followed by the
/// noise column, so a given `(n, seed)` always yields the same dataset.
pub fn generate_dataset(n: usize, seed: u64) -> TrainingDataset {
    let mut rng = StdRng::seed_from_u64(seed);

    let mut columns = [(); N_FEATURES].map(|_| Vec::with_capacity(n));
    for feature in Feature::ALL {
        let (mean, std) = feature.distribution();
        let column = &mut columns[feature.index()];
        for _ in 0..n {
            column.push(mean + std * standard_normal(&mut rng));
        }
    }

    let mut rows = Vec::with_capacity(n);
    let mut targets = Vec::with_capacity(n);
    for i in 0..n {
        let row = FeatureVector::from_array(std::array::from_fn(|j| columns[j][i]));
        let noise = NOISE_STD * standard_normal(&mut rng);
        targets.push(defect_rate(&row, noise));
        rows.push(row);
    }

    TrainingDataset {
        rows,
        targets,
        seed,
    }
}

/// Read a CSV batch file into raw records.
pub fn read_csv_records(path: &Path) -> DefectResult<Vec<RawRecord>> {
    let file = File::open(path).map_err(|e| DefectError::io(path, e))?;
    parse_csv_records(file)
}

/// Parse CSV text with a header row into raw records.
///
/// Cells are kept as strings so numeric coercion happens in exactly one
/// place; empty cells are treated as absent fields.
pub fn parse_csv_records<R: Read>(reader: R) -> DefectResult<Vec<RawRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| DefectError::invalid(format!("failed to read csv header: {e}")))?
        .clone();

    let mut records = Vec::new();
    for (line, result) in reader.records().enumerate() {
        let row = result.map_err(|e| {
            DefectError::invalid(format!("failed to read csv row {}: {e}", line + 2))
        })?;
        let record = headers
            .iter()
            .zip(row.iter())
            .filter(|(_, cell)| !cell.is_empty())
            .fold(RawRecord::new(), |rec, (key, cell)| {
                rec.with(key, Value::String(cell.to_string()))
            });
        records.push(record);
    }
    Ok(records)
}
