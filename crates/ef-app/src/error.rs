//! Error types for the ef-app service layer.

use std::path::PathBuf;

/// Application error type wrapping the pipeline crates' errors behind one
/// interface for the CLI.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Failed to read settings file: {path}")]
    SettingsFileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write settings file: {path}")]
    SettingsFileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Settings validation failed: {0}")]
    Validation(String),

    #[error("Requested {requested} realizations, but only {available} are in {path}")]
    NotEnoughRealizations {
        requested: usize,
        available: usize,
        path: PathBuf,
    },

    #[error("Download failed: {0}")]
    Download(String),

    #[error("File {file} is not part of record {record}; available: {available:?}")]
    FileNotInRecord {
        record: String,
        file: String,
        available: Vec<String>,
    },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Inflow error: {0}")]
    Inflow(String),

    #[error("Batch run error: {0}")]
    Batch(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for ef-app operations.
pub type AppResult<T> = Result<T, AppError>;

impl From<ef_store::StoreError> for AppError {
    fn from(err: ef_store::StoreError) -> Self {
        AppError::Store(err.to_string())
    }
}

impl From<ef_inflow::InflowError> for AppError {
    fn from(err: ef_inflow::InflowError) -> Self {
        AppError::Inflow(err.to_string())
    }
}

impl From<ef_batch::BatchError> for AppError {
    fn from(err: ef_batch::BatchError) -> Self {
        AppError::Batch(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Download(err.to_string())
    }
}
