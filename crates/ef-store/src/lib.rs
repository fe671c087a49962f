//! ef-store: ensemble collections and their container files.

pub mod collection;
pub mod container;
pub mod hash;

pub use collection::{EnsembleCollection, Orientation};
pub use container::{
    extract_realization, list_keys, list_realizations, read, write, CONTAINER_EXT,
};
pub use hash::{content_hash, file_sha256};

use std::path::PathBuf;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("JSON encoding error: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Non-finite value {value} in {key}/{label} at row {row}")]
    NonFinite {
        key: String,
        label: String,
        row: usize,
        value: f64,
    },

    #[error("Table error: {0}")]
    Table(#[from] ef_core::EfError),

    #[error("Key not found: {key}")]
    KeyNotFound { key: String },

    #[error("Duplicate key: {key}")]
    DuplicateKey { key: String },

    #[error("Column labels of {key} differ from the rest of the collection")]
    LabelMismatch { key: String },

    #[error("Invalid date {value:?} in group {key}")]
    InvalidDate { key: String, value: String },

    #[error("Unsupported container format {format} version {version}")]
    UnsupportedFormat { format: String, version: u32 },

    #[error("Collection is empty")]
    Empty,
}

impl StoreError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
