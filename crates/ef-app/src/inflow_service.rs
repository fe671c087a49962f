//! Catchment inflow and predicted inflow preparation.

use std::path::{Path, PathBuf};

use ef_core::timing::Timer;
use ef_core::RealizationId;
use ef_inflow::{derive_ensemble, predict_ensemble, Ar1Predictor, DEFAULT_LEADS};
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::settings::Settings;

/// What a preparation stage wrote.
#[derive(Debug, Clone, PartialEq)]
pub struct StageSummary {
    pub available: usize,
    pub realizations: usize,
    /// Top-level keys in the written container.
    pub groups: usize,
    pub output: PathBuf,
    pub elapsed_s: f64,
}

/// The first `n` realization ids stored in `path`.
pub fn first_realizations(path: &Path, n: usize) -> AppResult<(Vec<RealizationId>, usize)> {
    let mut ids = ef_store::list_realizations(path)?;
    let available = ids.len();
    info!(
        path = %path.display(),
        available,
        requested = n,
        "found realizations"
    );
    if n > available {
        return Err(AppError::NotEnoughRealizations {
            requested: n,
            available,
            path: path.to_path_buf(),
        });
    }
    ids.truncate(n);
    Ok((ids, available))
}

/// Derive catchment inflow for the first `n` gauge-flow realizations and
/// write it node-oriented to the input directory.
pub fn derive_catchment_inflow(settings: &Settings, n: usize) -> AppResult<StageSummary> {
    let timer = Timer::start("catchment inflow");
    let gauge_path = settings.gage_flow_path();
    let (ids, available) = first_realizations(&gauge_path, n)?;

    let gauge = ef_store::read(&gauge_path)?.select_realizations(&ids)?;
    let inflow = derive_ensemble(&gauge, &settings.catchment_options())?;

    let output = settings.catchment_inflow_path();
    ef_store::write(&output, &inflow)?;
    Ok(StageSummary {
        available,
        realizations: ids.len(),
        groups: inflow.len(),
        output,
        elapsed_s: timer.stop_and_log(),
    })
}

/// Predict 1-4 day ahead inflows for the first `n` catchment-inflow
/// realizations and write them realization-oriented to the input directory.
pub fn predict_inflows(settings: &Settings, n: usize) -> AppResult<StageSummary> {
    let timer = Timer::start("predicted inflow");
    let inflow_path = settings.catchment_inflow_path();
    let (ids, available) = first_realizations(&inflow_path, n)?;

    let inflow = ef_store::read(&inflow_path)?;
    let predicted = predict_ensemble(&inflow, &ids, &Ar1Predictor, &DEFAULT_LEADS)?;

    let output = settings.predicted_inflow_path();
    ef_store::write(&output, &predicted)?;
    Ok(StageSummary {
        available,
        realizations: ids.len(),
        groups: predicted.len(),
        output,
        elapsed_s: timer.stop_and_log(),
    })
}
