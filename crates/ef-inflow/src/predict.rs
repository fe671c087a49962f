//! Short-horizon predicted inflows.
//!
//! Release decisions at downstream flow targets depend on inflows one to four
//! days ahead. Predictions are generated once per realization before the
//! simulation so the engine can read them instead of forecasting in-loop.

use ef_core::{RealizationId, SeriesTable};
use ef_store::{EnsembleCollection, Orientation, StoreError};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::{InflowError, InflowResult};

/// Forecast horizons used by the downstream flow-target logic.
pub const DEFAULT_LEADS: [usize; 4] = [1, 2, 3, 4];

/// Produces predicted inflow columns from a (date x node) inflow table.
pub trait InflowPredictor: Sync {
    /// Output has the input's dates and one column per (node, lead), named
    /// with [`lead_label`]. Row `t` holds the prediction for `t + lead` made
    /// with data up to `t`.
    fn predict(&self, inflow: &SeriesTable, leads: &[usize]) -> InflowResult<SeriesTable>;
}

pub fn lead_label(node: &str, lead: usize) -> String {
    format!("{node}_lead{lead}")
}

/// First-order autoregressive predictor fitted per column.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ar1Predictor;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Ar1Fit {
    mean: f64,
    phi: f64,
}

impl Ar1Predictor {
    fn fit(values: &[f64]) -> Ar1Fit {
        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return Ar1Fit {
                mean: f64::NAN,
                phi: 0.0,
            };
        }
        let mean = finite.iter().sum::<f64>() / finite.len() as f64;

        let variance: f64 = finite.iter().map(|v| (v - mean).powi(2)).sum();
        let covariance: f64 = values
            .windows(2)
            .filter(|w| w[0].is_finite() && w[1].is_finite())
            .map(|w| (w[1] - mean) * (w[0] - mean))
            .sum();

        let phi = if variance > 0.0 {
            (covariance / variance).clamp(-1.0, 1.0)
        } else {
            0.0
        };
        Ar1Fit { mean, phi }
    }
}

impl InflowPredictor for Ar1Predictor {
    fn predict(&self, inflow: &SeriesTable, leads: &[usize]) -> InflowResult<SeriesTable> {
        if let Some(&lead) = leads.iter().find(|&&l| l == 0) {
            return Err(InflowError::InvalidLead { lead });
        }
        let mut out =
            SeriesTable::new(inflow.dates().to_vec()).with_index_name(inflow.index_name());
        for (node, values) in inflow.columns() {
            let fit = Self::fit(values);
            for &lead in leads {
                let decay = fit.phi.powi(lead as i32);
                let predicted = values
                    .iter()
                    .map(|x| fit.mean + decay * (x - fit.mean))
                    .collect();
                out.push_column(lead_label(node, lead), predicted)?;
            }
        }
        Ok(out)
    }
}

/// Predict inflows for the given realizations.
///
/// `inflow` is a catchment inflow ensemble in either orientation. The result
/// is realization-oriented, one table per requested id in the given order.
pub fn predict_ensemble<P: InflowPredictor>(
    inflow: &EnsembleCollection,
    realizations: &[RealizationId],
    predictor: &P,
    leads: &[usize],
) -> InflowResult<EnsembleCollection> {
    let by_realization = match inflow.orientation() {
        Orientation::ByRealization => inflow.clone(),
        Orientation::ByNode => inflow.pivot()?,
    };

    let tables = realizations
        .iter()
        .map(|id| {
            by_realization
                .get(id.as_str())
                .map(|t| (id, t))
                .ok_or_else(|| StoreError::KeyNotFound { key: id.to_string() }.into())
        })
        .collect::<InflowResult<Vec<_>>>()?;

    info!(realizations = tables.len(), leads = ?leads, "predicting inflows");
    let predicted: Vec<(String, SeriesTable)> = tables
        .into_par_iter()
        .map(|(id, table)| {
            debug!(realization = %id, "predicting realization");
            predictor
                .predict(table, leads)
                .map(|t| (id.to_string(), t))
                .map_err(|e| InflowError::Realization {
                    realization: id.to_string(),
                    source: Box::new(e),
                })
        })
        .collect::<InflowResult<_>>()?;

    let mut out = EnsembleCollection::new(Orientation::ByRealization);
    for (key, table) in predicted {
        out.insert(key, table)?;
    }
    Ok(out)
}
