//! Gauge flow -> local catchment inflow.
//!
//! Gauge flows at a node include everything that passed through the nodes
//! upstream of it. The local catchment inflow is the gauge flow minus the
//! gauge flows of the immediate upstream nodes. Results can be negative where
//! gauge error or aggregation mismatch exceeds the local contribution; they
//! are kept as-is.

use chrono::NaiveDate;
use ef_core::{SeriesTable, DEFAULT_INDEX_NAME};
use ef_store::{EnsembleCollection, Orientation};
use rayon::prelude::*;
use tracing::{debug, info, instrument};

use crate::topology::UpstreamMap;
use crate::{InflowError, InflowResult};

#[derive(Debug, Clone)]
pub struct CatchmentOptions {
    /// First day of the ensemble; tables are re-indexed daily from here.
    pub start_date: NaiveDate,
    /// Downstream node injected as a zero column and dropped from the output.
    pub reference_node: String,
    pub topology: UpstreamMap,
}

impl CatchmentOptions {
    pub fn new(start_date: NaiveDate) -> Self {
        Self {
            start_date,
            reference_node: "delTrenton".to_string(),
            topology: UpstreamMap::delaware_river_basin(),
        }
    }
}

/// Derive one realization's catchment inflow table from its gauge flows.
///
/// Subtraction always reads the original gauge flows, so the result does not
/// depend on the order in which nodes are visited.
pub fn derive_catchment_inflow(
    gauge: &SeriesTable,
    options: &CatchmentOptions,
) -> InflowResult<SeriesTable> {
    let mut flows = gauge.clone();
    match flows.column_mut(&options.reference_node) {
        Some(values) => values.fill(0.0),
        None => flows.push_constant(options.reference_node.clone(), 0.0)?,
    }
    flows.rebase_daily(options.start_date)?;

    let mut local = SeriesTable::new(flows.dates().to_vec()).with_index_name(DEFAULT_INDEX_NAME);
    for (node, values) in flows.columns() {
        if node == options.reference_node || node == DEFAULT_INDEX_NAME {
            continue;
        }
        let mut inflow = values.to_vec();
        for upstream in options.topology.upstream_of(node) {
            let upstream_flow =
                flows
                    .column(upstream)
                    .ok_or_else(|| InflowError::MissingUpstream {
                        node: node.to_string(),
                        upstream: upstream.clone(),
                    })?;
            for (q, u) in inflow.iter_mut().zip(upstream_flow) {
                *q -= u;
            }
        }
        local.push_column(node, inflow)?;
    }
    Ok(local)
}

/// Derive catchment inflow for every realization and re-key by node.
///
/// Input tables may be in either orientation; the result is node-oriented,
/// each node table holding one column per realization in input order.
#[instrument(skip_all, fields(realizations = tracing::field::Empty))]
pub fn derive_ensemble(
    gauge: &EnsembleCollection,
    options: &CatchmentOptions,
) -> InflowResult<EnsembleCollection> {
    options.topology.validate()?;
    let by_realization = match gauge.orientation() {
        Orientation::ByRealization => gauge.clone(),
        Orientation::ByNode => gauge.pivot()?,
    };
    tracing::Span::current().record("realizations", by_realization.len());

    let derived: Vec<(String, SeriesTable)> = by_realization
        .iter()
        .collect::<Vec<_>>()
        .into_par_iter()
        .map(|(key, table)| {
            debug!(realization = key, "deriving catchment inflow");
            derive_catchment_inflow(table, options)
                .map(|t| (key.to_string(), t))
                .map_err(|e| InflowError::Realization {
                    realization: key.to_string(),
                    source: Box::new(e),
                })
        })
        .collect::<InflowResult<_>>()?;

    let mut local = EnsembleCollection::new(Orientation::ByRealization);
    for (key, table) in derived {
        local.insert(key, table)?;
    }

    info!("reorganizing catchment inflow by node");
    Ok(local.pivot()?)
}
