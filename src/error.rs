use thiserror::Error;

use crate::models::{Mode, TerrainKind};

pub type Result<T> = std::result::Result<T, DatasetError>;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Parquet read error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Unknown split strategy: {0}")]
    UnknownStrategy(String),

    #[error("Split strategy test={test} and val={val} is not implemented")]
    UnsupportedStrategyCombination { test: String, val: String },

    #[error("Split strategy test={test} and val={val} is not referenced")]
    UnreferencedStrategyCombination { test: String, val: String },

    #[error("Station list '{list}' is required by the configured split strategy")]
    MissingStationList { list: String },

    #[error("Source '{source_name}' yields {actual} elements, sample index has {expected}")]
    LengthMismatch {
        source_name: String,
        expected: usize,
        actual: usize,
    },

    #[error("No {kind} tile for station '{station}'")]
    MissingTile { station: String, kind: TerrainKind },

    #[error("Tile for station '{station}' has shape {rows}x{cols}, cannot crop {crop}x{crop}")]
    TileShape {
        station: String,
        rows: usize,
        cols: usize,
        crop: usize,
    },

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Anchor station '{anchor}' not selected after {attempts} attempts")]
    AnchorNotSelected { anchor: String, attempts: usize },

    #[error("Mode {0} has not been prepared")]
    ModeNotPrepared(Mode),

    #[error("Missing required data: {0}")]
    MissingData(String),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),
}
