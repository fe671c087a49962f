//! Shared application service layer for the ensemble streamflow pipeline.
//!
//! Each stage of the pipeline is one service function taking the immutable
//! [`Settings`]. The CLI is a thin layer over these functions.

pub mod download_service;
pub mod error;
pub mod inflow_service;
pub mod settings;
pub mod simulate_service;
pub mod summary_service;

pub use download_service::{
    download_record, select_files, RecordClient, RecordFile, RecordMetadata, ZenodoClient,
};
pub use error::{AppError, AppResult};
pub use inflow_service::{derive_catchment_inflow, first_realizations, predict_inflows, StageSummary};
pub use settings::{load_settings, save_settings, DownloadSettings, Settings, DEFAULT_REALIZATIONS};
pub use simulate_service::{combine_batches, simulate};
pub use summary_service::{summarize, summarize_file, EnsembleSummary, SummaryOptions};
