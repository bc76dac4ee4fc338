//! Batch measurement types: the fixed feature schema, raw client records and
//! the training dataset.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::common::error::{DefectError, DefectResult};

/// Number of features in the model's input contract.
pub const N_FEATURES: usize = 7;

/// One measured property of a production batch.
///
/// Variant order is the column order used by the scaler and the model.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Feature {
    ParticleSizeD50,
    PrecursorRoomTemp,
    PrecursorRoomHumidity,
    PrecursorProcessingTimeMin,
    Conductivity,
    Temperature,
    Humidity,
}

impl Feature {
    pub const ALL: [Feature; N_FEATURES] = [
        Feature::ParticleSizeD50,
        Feature::PrecursorRoomTemp,
        Feature::PrecursorRoomHumidity,
        Feature::PrecursorProcessingTimeMin,
        Feature::Conductivity,
        Feature::Temperature,
        Feature::Humidity,
    ];

    /// Wire name of the feature.
    pub fn name(self) -> &'static str {
        match self {
            Feature::ParticleSizeD50 => "particle_size_d50",
            Feature::PrecursorRoomTemp => "precursor_room_temp",
            Feature::PrecursorRoomHumidity => "precursor_room_humidity",
            Feature::PrecursorProcessingTimeMin => "precursor_processing_time_min",
            Feature::Conductivity => "conductivity",
            Feature::Temperature => "temperature",
            Feature::Humidity => "humidity",
        }
    }

    /// Value substituted when a record omits the feature.
    pub fn default_value(self) -> f64 {
        match self {
            Feature::ParticleSizeD50 => 150.0,
            Feature::PrecursorRoomTemp => 45.0,
            Feature::PrecursorRoomHumidity => 50.0,
            Feature::PrecursorProcessingTimeMin => 120.0,
            Feature::Conductivity => 85.0,
            Feature::Temperature => 25.0,
            Feature::Humidity => 50.0,
        }
    }

    /// Mean and standard deviation of the synthetic training distribution.
    pub fn distribution(self) -> (f64, f64) {
        match self {
            Feature::ParticleSizeD50 => (150.0, 20.0),
            Feature::PrecursorRoomTemp => (45.0, 5.0),
            Feature::PrecursorRoomHumidity => (50.0, 10.0),
            Feature::PrecursorProcessingTimeMin => (120.0, 15.0),
            Feature::Conductivity => (85.0, 10.0),
            Feature::Temperature => (25.0, 3.0),
            Feature::Humidity => (50.0, 8.0),
        }
    }

    /// Weight of the normalised deviation in the ground-truth defect formula.
    pub fn defect_weight(self) -> f64 {
        match self {
            Feature::ParticleSizeD50 => 0.10,
            Feature::PrecursorRoomTemp => 0.05,
            Feature::PrecursorRoomHumidity => 0.03,
            Feature::PrecursorProcessingTimeMin => 0.02,
            Feature::Conductivity => -0.05,
            Feature::Temperature => 0.02,
            Feature::Humidity => 0.01,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|f| f.name()).collect()
    }
}

/// Measurements of one batch in schema order.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub particle_size_d50: f64,
    pub precursor_room_temp: f64,
    pub precursor_room_humidity: f64,
    pub precursor_processing_time_min: f64,
    pub conductivity: f64,
    pub temperature: f64,
    pub humidity: f64,
}

impl Default for FeatureVector {
    fn default() -> Self {
        Self::from_array(Feature::ALL.map(Feature::default_value))
    }
}

impl FeatureVector {
    pub fn from_array(values: [f64; N_FEATURES]) -> Self {
        Self {
            particle_size_d50: values[0],
            precursor_room_temp: values[1],
            precursor_room_humidity: values[2],
            precursor_processing_time_min: values[3],
            conductivity: values[4],
            temperature: values[5],
            humidity: values[6],
        }
    }

    pub fn to_array(&self) -> [f64; N_FEATURES] {
        [
            self.particle_size_d50,
            self.precursor_room_temp,
            self.precursor_room_humidity,
            self.precursor_processing_time_min,
            self.conductivity,
            self.temperature,
            self.humidity,
        ]
    }

    pub fn get(&self, feature: Feature) -> f64 {
        self.to_array()[feature.index()]
    }
}

/// A client supplied batch record: an arbitrary JSON object whose known keys
/// are coerced when the record is resolved.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(Map<String, Value>);

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a JSON value, rejecting anything that is not an object.
    pub fn from_value(value: Value) -> DefectResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(DefectError::invalid(format!(
                "batch record must be an object, got {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Resolve all features, substituting defaults only for absent keys.
    pub fn features(&self) -> DefectResult<FeatureVector> {
        let mut values = [0.0; N_FEATURES];
        for feature in Feature::ALL {
            values[feature.index()] = match self.0.get(feature.name()) {
                None => feature.default_value(),
                Some(value) => coerce(feature, value)?,
            };
        }
        Ok(FeatureVector::from_array(values))
    }

    /// Client supplied batch identifier, if any. `null` counts as absent.
    pub fn batch_id(&self) -> Option<String> {
        match self.0.get("batch_id")? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

impl From<Map<String, Value>> for RawRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<FeatureVector> for RawRecord {
    fn from(v: FeatureVector) -> Self {
        Feature::ALL
            .iter()
            .fold(RawRecord::new(), |rec, f| rec.with(f.name(), v.get(*f)))
    }
}

fn coerce(feature: Feature, value: &Value) -> DefectResult<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|v| v.is_finite())
        .ok_or_else(|| DefectError::Conversion {
            field: feature.name(),
            value: value.to_string(),
        })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Synthetic rows with their ground-truth defect rate.
#[derive(Clone, Debug, PartialEq)]
pub struct TrainingDataset {
    pub rows: Vec<FeatureVector>,
    pub targets: Vec<f64>,
    pub seed: u64,
}

impl TrainingDataset {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
