//! Ensemble summaries of simulation output.
//!
//! For every realization the selected columns are summed into one series,
//! smoothed with a trailing rolling mean and optionally expressed as a
//! percentage of the ensemble maximum. Each date is then summarized across
//! realizations by its mean and 10th/90th percentiles.

use std::path::Path;

use chrono::NaiveDate;
use ef_store::{EnsembleCollection, Orientation};
use tracing::info;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryOptions {
    pub columns: Vec<String>,
    /// Rolling mean window in days; 1 disables smoothing.
    pub window: usize,
    /// Scale to percent of the largest value across the ensemble.
    pub percent: bool,
}

impl SummaryOptions {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            window: 7,
            percent: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleSummary {
    pub dates: Vec<NaiveDate>,
    pub mean: Vec<f64>,
    pub q10: Vec<f64>,
    pub q90: Vec<f64>,
    pub realizations: usize,
}

pub fn summarize(
    collection: &EnsembleCollection,
    options: &SummaryOptions,
) -> AppResult<EnsembleSummary> {
    if options.columns.is_empty() {
        return Err(AppError::InvalidInput("no columns selected".to_string()));
    }
    if options.window == 0 {
        return Err(AppError::InvalidInput("window must be at least 1 day".to_string()));
    }
    let by_realization = match collection.orientation() {
        Orientation::ByRealization => collection.clone(),
        Orientation::ByNode => collection.pivot()?,
    };
    let Some((_, first)) = by_realization.iter().next() else {
        return Err(AppError::InvalidInput("ensemble is empty".to_string()));
    };
    let dates = first.dates().to_vec();

    let mut series = Vec::with_capacity(by_realization.len());
    for (id, table) in by_realization.iter() {
        first.check_aligned(table).map_err(|e| {
            AppError::InvalidInput(format!("realization {id} is not aligned: {e}"))
        })?;
        let mut total = vec![0.0; table.len()];
        for column in &options.columns {
            let values = table.column(column).ok_or_else(|| {
                AppError::InvalidInput(format!("column {column} missing from realization {id}"))
            })?;
            for (t, v) in total.iter_mut().zip(values) {
                *t += v;
            }
        }
        series.push(rolling_mean(&total, options.window));
    }

    if options.percent {
        let max = series
            .iter()
            .flatten()
            .copied()
            .filter(|v| v.is_finite())
            .fold(f64::NEG_INFINITY, f64::max);
        if max.is_finite() && max != 0.0 {
            for v in series.iter_mut().flatten() {
                *v = *v / max * 100.0;
            }
        }
    }

    let mut out = EnsembleSummary {
        dates,
        mean: Vec::new(),
        q10: Vec::new(),
        q90: Vec::new(),
        realizations: series.len(),
    };
    for t in 0..out.dates.len() {
        let mut row: Vec<f64> = series
            .iter()
            .map(|s| s[t])
            .filter(|v| !v.is_nan())
            .collect();
        row.sort_by(f64::total_cmp);
        out.mean.push(mean(&row));
        out.q10.push(quantile(&row, 0.1));
        out.q90.push(quantile(&row, 0.9));
    }
    Ok(out)
}

/// Trailing mean over `window` values; the first `window - 1` entries are NaN.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if window == 0 {
        return out;
    }
    for end in window..=values.len() {
        let slice = &values[end - window..end];
        out[end - 1] = slice.iter().sum::<f64>() / window as f64;
    }
    out
}

fn mean(sorted: &[f64]) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    sorted.iter().sum::<f64>() / sorted.len() as f64
}

/// Linear-interpolated quantile of sorted, NaN-free values.
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
        }
    }
}

impl EnsembleSummary {
    /// `date,mean,q10,q90`, with empty fields where a value is undefined.
    pub fn to_csv(&self) -> String {
        let field = |v: f64| if v.is_finite() { v.to_string() } else { String::new() };
        let mut csv = String::from("date,mean,q10,q90\n");
        for (i, date) in self.dates.iter().enumerate() {
            csv.push_str(&format!(
                "{},{},{},{}\n",
                date.format("%Y-%m-%d"),
                field(self.mean[i]),
                field(self.q10[i]),
                field(self.q90[i])
            ));
        }
        csv
    }
}

/// Summarize a container file.
pub fn summarize_file(path: &Path, options: &SummaryOptions) -> AppResult<EnsembleSummary> {
    let collection = ef_store::read(path)?;
    let summary = summarize(&collection, options)?;
    info!(
        path = %path.display(),
        realizations = summary.realizations,
        days = summary.dates.len(),
        "ensemble summarized"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ef_core::SeriesTable;
    use proptest::prelude::*;

    fn ensemble(values: &[[f64; 4]]) -> EnsembleCollection {
        let mut c = EnsembleCollection::new(Orientation::ByRealization);
        for (i, v) in values.iter().enumerate() {
            let table = SeriesTable::daily(NaiveDate::from_ymd_opt(2017, 10, 1).unwrap(), 4)
                .unwrap()
                .with_column("cannonsville", v.to_vec())
                .unwrap()
                .with_column("pepacton", vec![1.0; 4])
                .unwrap();
            c.insert(i.to_string(), table).unwrap();
        }
        c
    }

    #[test]
    fn rolling_mean_leaves_warmup_rows_undefined() {
        let out = rolling_mean(&[1.0, 2.0, 3.0, 4.0], 3);
        assert!(out[0].is_nan() && out[1].is_nan());
        assert_eq!(&out[2..], [2.0, 3.0]);
        assert_eq!(rolling_mean(&[5.0, 6.0], 1), [5.0, 6.0]);
    }

    #[test]
    fn quantiles_interpolate_linearly() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(quantile(&sorted, 0.5), 3.0);
        assert!((quantile(&sorted, 0.1) - 1.4).abs() < 1e-12);
        assert!((quantile(&sorted, 0.9) - 4.6).abs() < 1e-12);
        assert!(quantile(&[], 0.5).is_nan());
    }

    #[test]
    fn summary_sums_columns_then_aggregates() {
        let c = ensemble(&[[1.0, 1.0, 1.0, 1.0], [3.0, 3.0, 3.0, 3.0]]);
        let mut options = SummaryOptions::new(vec!["cannonsville".into(), "pepacton".into()]);
        options.window = 2;
        let s = summarize(&c, &options).unwrap();

        assert_eq!(s.realizations, 2);
        assert!(s.mean[0].is_nan());
        assert_eq!(s.mean[1], 3.0);
        assert!((s.q10[1] - 2.2).abs() < 1e-12);
        assert!((s.q90[1] - 3.8).abs() < 1e-12);
    }

    #[test]
    fn percent_scales_to_ensemble_maximum() {
        let c = ensemble(&[[1.0, 2.0, 3.0, 4.0], [2.0, 2.0, 2.0, 2.0]]);
        let options = SummaryOptions {
            columns: vec!["cannonsville".into()],
            window: 1,
            percent: true,
        };
        let s = summarize(&c, &options).unwrap();
        assert_eq!(s.mean[3], 75.0);
        assert_eq!(s.q90[3], 95.0);
    }

    #[test]
    fn csv_has_header_and_blank_undefined_values() {
        let c = ensemble(&[[1.0, 2.0, 3.0, 4.0]]);
        let mut options = SummaryOptions::new(vec!["cannonsville".into()]);
        options.window = 2;
        let csv = summarize(&c, &options).unwrap().to_csv();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "date,mean,q10,q90");
        assert_eq!(lines[1], "2017-10-01,,,");
        assert_eq!(lines[2], "2017-10-02,1.5,1.5,1.5");
    }

    #[test]
    fn realizations_of_different_length_are_rejected() {
        let start = NaiveDate::from_ymd_opt(2017, 10, 1).unwrap();
        let mut c = EnsembleCollection::new(Orientation::ByRealization);
        c.insert(
            "0",
            SeriesTable::daily(start, 3)
                .unwrap()
                .with_column("cannonsville", vec![1.0, 2.0, 3.0])
                .unwrap(),
        )
        .unwrap();
        c.insert(
            "1",
            SeriesTable::daily(start, 2)
                .unwrap()
                .with_column("cannonsville", vec![1.0, 2.0])
                .unwrap(),
        )
        .unwrap();
        let mut options = SummaryOptions::new(vec!["cannonsville".into()]);
        options.window = 1;
        assert!(matches!(summarize(&c, &options), Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn unknown_column_is_rejected() {
        let c = ensemble(&[[1.0; 4]]);
        let options = SummaryOptions::new(vec!["delMontague".into()]);
        assert!(matches!(summarize(&c, &options), Err(AppError::InvalidInput(_))));
    }

    proptest! {
        #[test]
        fn quantile_band_contains_values_range(mut values in prop::collection::vec(-1.0e6_f64..1.0e6, 1..40)) {
            values.sort_by(f64::total_cmp);
            let lo = quantile(&values, 0.1);
            let hi = quantile(&values, 0.9);
            let eps = 1e-6;
            prop_assert!(values[0] - eps <= lo && lo <= hi + eps);
            prop_assert!(hi <= values[values.len() - 1] + eps);
        }
    }
}
