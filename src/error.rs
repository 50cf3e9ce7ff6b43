use thiserror::Error;

use crate::core::PropertyError;
use crate::telemetry::TelemetryError;

#[derive(Debug, Error)]
pub enum RoiError {
    #[error("no input to process")]
    NoInputData,

    #[error("invalid sweep range: {0}")]
    InvalidRange(String),

    #[error("invalid financing parameters: {0}")]
    InvalidParams(String),

    #[error("invalid property on row {row}: {source}")]
    InvalidProperty {
        row: usize,
        #[source]
        source: PropertyError,
    },

    #[error("invalid CSV input: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
}
