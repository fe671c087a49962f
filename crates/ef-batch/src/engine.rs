//! The simulation engine seam.
//!
//! The runner only needs three things from an engine: build a model scoped to
//! a set of realizations, persist the model definition next to the artifact,
//! and run once for the whole batch, returning the requested parameters.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use ef_core::RealizationId;
use ef_store::EnsembleCollection;
use serde::{Deserialize, Serialize};

/// Model configuration for one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub ensemble: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Container with the catchment inflow the model reads.
    pub inflow_source: PathBuf,
    /// Exactly the batch's realization ids.
    pub realizations: Vec<RealizationId>,
}

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("Model build failed: {0}")]
    Build(String),

    #[error("Simulation failed: {0}")]
    Run(String),

    #[error("Realization {id} not found in {source_path}")]
    MissingRealization { id: String, source_path: PathBuf },

    #[error("No dates between {start} and {end}")]
    EmptyWindow { start: NaiveDate, end: NaiveDate },

    #[error("Unknown parameter: {name}")]
    UnknownParameter { name: String },

    #[error("I/O error on {path}: {message}")]
    Io { path: PathBuf, message: String },
}

pub trait SimulationEngine: Sync {
    type Model: SimulationModel;

    fn build(&self, config: &SimulationConfig) -> Result<Self::Model, EngineError>;
}

pub trait SimulationModel {
    /// Every parameter the model can export, in model order.
    fn parameter_names(&self) -> Vec<String>;

    fn write_definition(&self, path: &Path) -> Result<(), EngineError>;

    /// Run the whole simulation once and return the requested parameters.
    ///
    /// The result may be keyed by realization or by parameter. Exactly the
    /// parameters in `export` are returned, in that order; an empty list
    /// yields tables without columns.
    fn run(&mut self, export: &[String]) -> Result<EnsembleCollection, EngineError>;
}
