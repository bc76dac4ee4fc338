//! Error handling primitives shared across the core.
//!
//! Every failure path ends in a [`DefectError`]; callers that need a stable,
//! machine readable classification use [`DefectError::code`].

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Stable error codes surfaced to API callers.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorCode {
    /// Success code used as a sentinel.
    Ok = 0,
    /// Input failed validation (empty batch, non-object record).
    Validation = 1,
    /// A present field could not be coerced to a number.
    Conversion = 2,
    /// Scaler or model invocation failed.
    Inference = 3,
    /// Artifact read or write failed.
    Persistence = 4,
    /// The service has not finished initialization.
    NotReady = 5,
    /// Configuration could not be parsed.
    Config = 6,
}

impl ErrorCode {
    /// HTTP status used when the code is reported through the API layer.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorCode::Ok => 200,
            ErrorCode::Validation => 400,
            ErrorCode::NotReady => 503,
            ErrorCode::Conversion
            | ErrorCode::Inference
            | ErrorCode::Persistence
            | ErrorCode::Config => 500,
        }
    }
}

/// Canonical error type for the core.
#[derive(Debug, Error)]
pub enum DefectError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("field `{field}` is not numeric: {value}")]
    Conversion { field: &'static str, value: String },

    #[error("inference failed: {0}")]
    Inference(String),

    /// A single record of a batch failed; the whole batch is rejected.
    #[error("record {index} rejected: {source}")]
    RecordFailed {
        index: usize,
        #[source]
        source: Box<DefectError>,
    },

    #[error("io failed at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("artifact at {} is unusable: {reason}", path.display())]
    Artifact { path: PathBuf, reason: String },

    #[error("model is not ready")]
    NotReady,

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result alias used throughout the crate.
pub type DefectResult<T> = Result<T, DefectError>;

impl DefectError {
    /// Validation helper.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Inference helper.
    pub fn inference(msg: impl Into<String>) -> Self {
        Self::Inference(msg.into())
    }

    /// IO helper binding the failing path.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Corrupt or mismatched artifact helper.
    pub fn artifact(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Artifact {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Wrap a per-record failure with its 1-based position in the batch.
    pub fn record(index: usize, source: DefectError) -> Self {
        Self::RecordFailed {
            index,
            source: Box::new(source),
        }
    }

    /// Stable classification of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            DefectError::Validation(_) => ErrorCode::Validation,
            DefectError::Conversion { .. } => ErrorCode::Conversion,
            DefectError::Inference(_) | DefectError::RecordFailed { .. } => ErrorCode::Inference,
            DefectError::Io { .. } | DefectError::Artifact { .. } => ErrorCode::Persistence,
            DefectError::NotReady => ErrorCode::NotReady,
            DefectError::Config(_) => ErrorCode::Config,
        }
    }

    /// True when the underlying cause is a missing file.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DefectError::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}
