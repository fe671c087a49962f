//! Batch execution on one worker.
//!
//! A batch is all-or-nothing: either the engine output is verified and the
//! artifact renamed into place, or the batch is reported failed and no
//! artifact exists. Failed batches are not retried and do not stop the
//! remaining batches of the shard.

use std::path::PathBuf;

use ef_core::timing::{Accumulated, Timer};
use ef_core::RealizationId;
use ef_store::{EnsembleCollection, Orientation};
use tracing::{info, instrument, warn};

use crate::coordinator::RunConfig;
use crate::engine::{SimulationConfig, SimulationEngine, SimulationModel};
use crate::naming::ArtifactNames;
use crate::plan::{Batch, BatchKey, WorkerShard};
use crate::{BatchError, BatchResult};

/// Wall-clock seconds spent in each stage of a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BatchTiming {
    pub build_s: f64,
    pub run_s: f64,
    pub save_s: f64,
}

impl BatchTiming {
    pub fn total_s(&self) -> f64 {
        self.build_s + self.run_s + self.save_s
    }
}

/// Per-stage time summed over successful batches.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StageTotals {
    pub build: Accumulated,
    pub run: Accumulated,
    pub save: Accumulated,
}

impl StageTotals {
    pub fn record(&mut self, timing: &BatchTiming) {
        self.build.record(timing.build_s);
        self.run.record(timing.run_s);
        self.save.record(timing.save_s);
    }

    pub fn merge(&mut self, other: &StageTotals) {
        self.build.merge(&other.build);
        self.run.merge(&other.run);
        self.save.merge(&other.save);
    }

    pub fn total_s(&self) -> f64 {
        self.build.total_s + self.run.total_s + self.save.total_s
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub key: BatchKey,
    pub realizations: Vec<RealizationId>,
    pub artifact: PathBuf,
    pub checksum: String,
    pub exported: usize,
    pub timing: BatchTiming,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchFailure {
    pub key: BatchKey,
    pub realizations: Vec<RealizationId>,
    pub message: String,
}

/// Outcome of one worker's shard.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ShardReport {
    pub worker: usize,
    pub reports: Vec<BatchReport>,
    pub failures: Vec<BatchFailure>,
}

impl ShardReport {
    pub fn num_successful(&self) -> usize {
        self.reports.len()
    }

    pub fn num_failed(&self) -> usize {
        self.failures.len()
    }

    pub fn stage_totals(&self) -> StageTotals {
        let mut totals = StageTotals::default();
        for report in &self.reports {
            totals.record(&report.timing);
        }
        totals
    }
}

pub struct BatchRunner<'a, E> {
    engine: &'a E,
    config: &'a RunConfig,
    names: ArtifactNames,
}

impl<'a, E: SimulationEngine> BatchRunner<'a, E> {
    pub fn new(engine: &'a E, config: &'a RunConfig) -> Self {
        Self {
            engine,
            config,
            names: config.artifact_names(),
        }
    }

    pub fn names(&self) -> &ArtifactNames {
        &self.names
    }

    fn simulation_config(&self, batch: &Batch) -> SimulationConfig {
        SimulationConfig {
            ensemble: self.config.ensemble.clone(),
            start_date: self.config.start_date,
            end_date: self.config.end_date,
            inflow_source: self.config.inflow_source.clone(),
            realizations: batch.realizations.clone(),
        }
    }

    /// Run every batch of a shard in order.
    #[instrument(skip_all, fields(worker = shard.worker))]
    pub fn run_shard(&self, shard: &WorkerShard) -> ShardReport {
        let mut out = ShardReport {
            worker: shard.worker,
            ..ShardReport::default()
        };
        for batch in &shard.batches {
            match self.run_batch(batch) {
                Ok(report) => out.reports.push(report),
                Err(failure) => out.failures.push(failure),
            }
        }
        let totals = out.stage_totals();
        info!(
            num_successful = out.num_successful(),
            num_failed = out.num_failed(),
            build_avg_s = totals.build.average_s(),
            run_avg_s = totals.run.average_s(),
            save_avg_s = totals.save.average_s(),
            "worker finished"
        );
        out
    }

    pub fn run_batch(&self, batch: &Batch) -> Result<BatchReport, BatchFailure> {
        info!(
            worker = batch.key.worker,
            batch = batch.key.batch,
            realizations = batch.realizations.len(),
            "running batch"
        );
        self.try_run_batch(batch).map_err(|e| {
            warn!(batch = %batch.key, error = %e, "batch failed");
            BatchFailure {
                key: batch.key,
                realizations: batch.realizations.clone(),
                message: e.to_string(),
            }
        })
    }

    fn try_run_batch(&self, batch: &Batch) -> BatchResult<BatchReport> {
        let mut timing = BatchTiming::default();

        let timer = Timer::start("build");
        let sim_config = self.simulation_config(batch);
        let mut model = self.engine.build(&sim_config)?;
        model.write_definition(&self.names.model_path(batch.key))?;
        let export = self
            .config
            .catalog
            .resolve(&model.parameter_names(), &self.config.results_sets)?;
        timing.build_s = timer.stop_and_log();

        let timer = Timer::start("run");
        let output = model.run(&export)?;
        timing.run_s = timer.stop_and_log();

        let timer = Timer::start("save");
        let output = order_by_batch(batch, output)?;
        let artifact = self.names.artifact_path(batch.key);
        ef_store::write(&artifact, &output)?;
        let checksum = ef_store::file_sha256(&artifact)?;
        timing.save_s = timer.stop_and_log();

        info!(
            batch = %batch.key,
            exported = export.len(),
            total_s = timing.total_s(),
            "batch complete"
        );
        Ok(BatchReport {
            key: batch.key,
            realizations: batch.realizations.clone(),
            artifact,
            checksum,
            exported: export.len(),
            timing,
        })
    }
}

/// Re-key engine output by realization, in the batch's id order.
///
/// Fails unless the output holds exactly the batch's realizations.
fn order_by_batch(batch: &Batch, output: EnsembleCollection) -> BatchResult<EnsembleCollection> {
    let by_realization = match output.orientation() {
        Orientation::ByRealization => output,
        Orientation::ByNode => output.pivot()?,
    };
    if by_realization.len() != batch.realizations.len() {
        return Err(BatchError::OutputMismatch {
            key: batch.key,
            detail: format!(
                "expected {} realizations, engine returned {}",
                batch.realizations.len(),
                by_realization.len()
            ),
        });
    }

    let mut ordered = EnsembleCollection::new(Orientation::ByRealization);
    for id in &batch.realizations {
        let table = by_realization
            .get(id.as_str())
            .ok_or_else(|| BatchError::OutputMismatch {
                key: batch.key,
                detail: format!("realization {id} missing from engine output"),
            })?;
        ordered.insert(id.as_str(), table.clone())?;
    }
    Ok(ordered)
}
