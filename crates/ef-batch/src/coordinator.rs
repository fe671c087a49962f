//! Run coordination: plan, clean, fan out, combine.
//!
//! Workers are the threads of a dedicated pool sized to the worker count. The
//! coordinator finishes stale cleanup before the pool starts, and the pool's
//! broadcast returns only after every worker has finished its shard, so both
//! phase boundaries are joins rather than filesystem polling.

use std::fs;
use std::path::PathBuf;

use chrono::{NaiveDate, SecondsFormat, Utc};
use ef_core::timing::Timer;
use ef_core::RealizationId;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::combine::{combine_artifacts, CombineReport};
use crate::engine::SimulationEngine;
use crate::manifest::{ArtifactEntry, FailureEntry, RunManifest};
use crate::naming::ArtifactNames;
use crate::plan::BatchPlan;
use crate::result_sets::ResultSetCatalog;
use crate::runner::{BatchRunner, ShardReport, StageTotals};
use crate::{BatchError, BatchResult};

/// Everything a batched run needs; immutable for the run's duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub ensemble: String,
    /// Directory for batch artifacts, model definitions and the manifest.
    pub output_dir: PathBuf,
    /// Final combined container.
    pub output_file: PathBuf,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub inflow_source: PathBuf,
    pub workers: usize,
    pub realizations_per_batch: usize,
    pub results_sets: Vec<String>,
    #[serde(default)]
    pub catalog: ResultSetCatalog,
}

impl RunConfig {
    pub fn artifact_names(&self) -> ArtifactNames {
        ArtifactNames::new(&self.output_dir, &self.ensemble)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub plan_fingerprint: String,
    pub stale_removed: usize,
    pub shards: Vec<ShardReport>,
    pub combine: CombineReport,
    pub elapsed_s: f64,
}

impl RunSummary {
    pub fn num_successful(&self) -> usize {
        self.shards.iter().map(ShardReport::num_successful).sum()
    }

    pub fn num_failed(&self) -> usize {
        self.shards.iter().map(ShardReport::num_failed).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.num_failed() == 0 && self.combine.is_complete()
    }

    /// Stage times summed over every worker.
    pub fn stage_totals(&self) -> StageTotals {
        let mut totals = StageTotals::default();
        for shard in &self.shards {
            totals.merge(&shard.stage_totals());
        }
        totals
    }
}

/// Simulate the first `n` of `available` realizations and combine the
/// results into `config.output_file`.
///
/// Configuration errors are returned before any file is touched. Failed
/// batches do not make the run fail; they show up in the summary and leave
/// the combined container partial.
#[instrument(skip_all, fields(ensemble = %config.ensemble, n = n, workers = config.workers))]
pub fn run_ensemble<E: SimulationEngine>(
    engine: &E,
    config: &RunConfig,
    available: &[RealizationId],
    n: usize,
) -> BatchResult<RunSummary> {
    let timer = Timer::start("ensemble run");
    let plan = BatchPlan::new(available, n, config.workers, config.realizations_per_batch)?;
    config.catalog.check(&config.results_sets)?;
    let fingerprint = plan.fingerprint()?;
    info!(
        available = available.len(),
        batches = plan.expected_batch_count(),
        fingerprint = %fingerprint,
        "batch plan ready"
    );

    let names = config.artifact_names();
    fs::create_dir_all(&config.output_dir).map_err(|e| BatchError::io(&config.output_dir, e))?;
    let stale_removed = names.remove_stale()?;
    if stale_removed > 0 {
        info!(files = stale_removed, "removed stale batch files");
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(plan.workers())
        .thread_name(|i| format!("ensemble-worker-{i}"))
        .build()
        .map_err(|e| BatchError::WorkerPool(e.to_string()))?;
    let runner = BatchRunner::new(engine, config);
    let shards: Vec<ShardReport> = pool.broadcast(|ctx| match plan.shard(ctx.index()) {
        Some(shard) => runner.run_shard(shard),
        None => ShardReport {
            worker: ctx.index(),
            ..ShardReport::default()
        },
    });

    let manifest = RunManifest {
        ensemble: config.ensemble.clone(),
        plan_fingerprint: fingerprint.clone(),
        expected_batches: plan.expected_batch_count(),
        expected_keys: plan.batch_keys(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        artifacts: shards
            .iter()
            .flat_map(|s| s.reports.iter().map(ArtifactEntry::from))
            .collect(),
        failures: shards
            .iter()
            .flat_map(|s| s.failures.iter().map(FailureEntry::from))
            .collect(),
    };
    manifest.save(&names.manifest_path())?;
    if !manifest.failures.is_empty() {
        warn!(failed = manifest.failures.len(), "some batches failed");
    }

    let combine = combine_artifacts(
        &manifest.artifacts,
        &manifest.expected_keys,
        &config.output_file,
    )?;
    let removed = names.remove_intermediate()?;
    info!(files = removed, "removed intermediate batch files");

    let summary = RunSummary {
        plan_fingerprint: fingerprint,
        stale_removed,
        shards,
        combine,
        elapsed_s: timer.stop(),
    };
    info!(
        num_successful = summary.num_successful(),
        num_failed = summary.num_failed(),
        realizations = summary.combine.realizations,
        batch_time_s = summary.stage_totals().total_s(),
        elapsed_s = summary.elapsed_s,
        "ensemble run finished"
    );
    Ok(summary)
}
