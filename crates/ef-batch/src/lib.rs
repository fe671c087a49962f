//! ef-batch: partition an ensemble across workers, run the simulation engine
//! batch by batch, and combine the per-batch artifacts.
//!
//! Run phases:
//! 1. plan (configuration errors surface here, before any file is touched)
//! 2. stale artifact cleanup by the coordinator
//! 3. one worker per shard, batches in sequence
//! 4. manifest, combine, cleanup

pub mod combine;
pub mod coordinator;
pub mod engine;
pub mod manifest;
pub mod naming;
pub mod plan;
pub mod result_sets;
pub mod runner;

pub use combine::{combine_artifacts, combine_directory, CombineReport};
pub use coordinator::{run_ensemble, RunConfig, RunSummary};
pub use engine::{EngineError, SimulationConfig, SimulationEngine, SimulationModel};
pub use manifest::{ArtifactEntry, FailureEntry, RunManifest};
pub use naming::{ArtifactNames, FileKind};
pub use plan::{Batch, BatchKey, BatchPlan, WorkerShard};
pub use result_sets::ResultSetCatalog;
pub use runner::{
    BatchFailure, BatchReport, BatchRunner, BatchTiming, ShardReport, StageTotals,
};

use std::path::PathBuf;

pub type BatchResult<T> = Result<T, BatchError>;

#[derive(thiserror::Error, Debug)]
pub enum BatchError {
    #[error("Requested {requested} realizations, but only {available} are available")]
    NotEnoughRealizations { requested: usize, available: usize },

    #[error("Worker count must be at least 1")]
    NoWorkers,

    #[error("Realizations per batch must be at least 1")]
    EmptyBatchSize,

    #[error("Unknown result set: {name}")]
    UnknownResultSet { name: String },

    #[error("Realization {id} appears in more than one batch artifact ({path})")]
    DuplicateRealization { id: String, path: PathBuf },

    #[error("Engine output for batch {key} does not match its realizations: {detail}")]
    OutputMismatch { key: BatchKey, detail: String },

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Failed to build worker pool: {0}")]
    WorkerPool(String),

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

    #[error("Store error: {0}")]
    Store(#[from] ef_store::StoreError),
}

impl BatchError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        BatchError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
