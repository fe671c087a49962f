//! Batched simulation and output combination.

use ef_batch::{combine_directory, run_ensemble, CombineReport, RunSummary};
use ef_sim::RoutingEngine;
use tracing::info;

use crate::error::AppResult;
use crate::inflow_service::first_realizations;
use crate::settings::Settings;

/// Simulate the first `n` catchment-inflow realizations in batches.
///
/// `workers` overrides the configured worker count.
pub fn simulate(settings: &Settings, n: usize, workers: Option<usize>) -> AppResult<RunSummary> {
    let config = settings.run_config(workers);
    let (ids, _) = first_realizations(&config.inflow_source, n)?;
    let engine = RoutingEngine::new(settings.topology());
    Ok(run_ensemble(&engine, &config, &ids, n)?)
}

/// Combine the batch artifacts left in the output directory, then remove
/// them. Used after an interrupted run.
pub fn combine_batches(settings: &Settings) -> AppResult<CombineReport> {
    let names = settings.run_config(None).artifact_names();
    let report = combine_directory(&names, &settings.output_path())?;
    let removed = names.remove_intermediate()?;
    info!(files = removed, "removed intermediate batch files");
    Ok(report)
}
