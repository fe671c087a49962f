//! Date-indexed tables of daily series.
//!
//! A [`SeriesTable`] holds one row per day and one column per label. Depending
//! on the collection it lives in, labels are node names (one table per
//! realization) or realization ids (one table per node).

use chrono::{Days, NaiveDate};

use crate::error::{EfError, EfResult};

/// Canonical name of the date index.
pub const DEFAULT_INDEX_NAME: &str = "datetime";

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesTable {
    index_name: String,
    dates: Vec<NaiveDate>,
    labels: Vec<String>,
    columns: Vec<Vec<f64>>,
}

impl SeriesTable {
    /// Create an empty table over the given dates.
    pub fn new(dates: Vec<NaiveDate>) -> Self {
        Self {
            index_name: DEFAULT_INDEX_NAME.to_string(),
            dates,
            labels: Vec::new(),
            columns: Vec::new(),
        }
    }

    /// Create an empty table over `len` consecutive days starting at `start`.
    pub fn daily(start: NaiveDate, len: usize) -> EfResult<Self> {
        Ok(Self::new(daily_range(start, len)?))
    }

    pub fn with_index_name(mut self, name: impl Into<String>) -> Self {
        self.index_name = name.into();
        self
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn set_index_name(&mut self, name: impl Into<String>) {
        self.index_name = name.into();
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Number of rows (days).
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.labels.len()
    }

    pub fn has_column(&self, label: &str) -> bool {
        self.position(label).is_some()
    }

    fn position(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    /// Append a column. Its length must match the date index.
    pub fn push_column(&mut self, label: impl Into<String>, values: Vec<f64>) -> EfResult<()> {
        let label = label.into();
        if values.len() != self.dates.len() {
            return Err(EfError::ColumnLength {
                label,
                len: values.len(),
                expected: self.dates.len(),
            });
        }
        if self.has_column(&label) {
            return Err(EfError::DuplicateLabel { label });
        }
        self.labels.push(label);
        self.columns.push(values);
        Ok(())
    }

    /// Builder form of [`SeriesTable::push_column`].
    pub fn with_column(mut self, label: impl Into<String>, values: Vec<f64>) -> EfResult<Self> {
        self.push_column(label, values)?;
        Ok(self)
    }

    /// Append a column holding `value` on every row.
    pub fn push_constant(&mut self, label: impl Into<String>, value: f64) -> EfResult<()> {
        let len = self.dates.len();
        self.push_column(label, vec![value; len])
    }

    pub fn column(&self, label: &str) -> Option<&[f64]> {
        self.position(label).map(|i| self.columns[i].as_slice())
    }

    pub fn column_mut(&mut self, label: &str) -> Option<&mut [f64]> {
        self.position(label).map(|i| self.columns[i].as_mut_slice())
    }

    /// Remove a column and return its values.
    pub fn drop_column(&mut self, label: &str) -> EfResult<Vec<f64>> {
        let i = self.position(label).ok_or_else(|| EfError::UnknownColumn {
            label: label.to_string(),
        })?;
        self.labels.remove(i);
        Ok(self.columns.remove(i))
    }

    /// Iterate `(label, values)` in column order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.labels
            .iter()
            .zip(&self.columns)
            .map(|(l, c)| (l.as_str(), c.as_slice()))
    }

    /// Replace the date index, keeping the values.
    pub fn set_dates(&mut self, dates: Vec<NaiveDate>) -> EfResult<()> {
        if dates.len() != self.dates.len() {
            return Err(EfError::IndexLength {
                expected: self.dates.len(),
                found: dates.len(),
            });
        }
        self.dates = dates;
        Ok(())
    }

    /// Re-base the index to consecutive days starting at `start`.
    pub fn rebase_daily(&mut self, start: NaiveDate) -> EfResult<()> {
        self.dates = daily_range(start, self.dates.len())?;
        Ok(())
    }

    /// New table holding only `labels`, in the requested order.
    pub fn select<S: AsRef<str>>(&self, labels: &[S]) -> EfResult<SeriesTable> {
        let mut out = SeriesTable::new(self.dates.clone()).with_index_name(&self.index_name);
        for label in labels {
            let label = label.as_ref();
            let values = self.column(label).ok_or_else(|| EfError::UnknownColumn {
                label: label.to_string(),
            })?;
            out.push_column(label, values.to_vec())?;
        }
        Ok(out)
    }

    /// New table restricted to rows with `start <= date <= end`.
    pub fn slice_dates(&self, start: NaiveDate, end: NaiveDate) -> SeriesTable {
        let rows: Vec<usize> = self
            .dates
            .iter()
            .enumerate()
            .filter(|(_, d)| **d >= start && **d <= end)
            .map(|(i, _)| i)
            .collect();
        SeriesTable {
            index_name: self.index_name.clone(),
            dates: rows.iter().map(|&i| self.dates[i]).collect(),
            labels: self.labels.clone(),
            columns: self
                .columns
                .iter()
                .map(|c| rows.iter().map(|&i| c[i]).collect())
                .collect(),
        }
    }

    /// Check that `other` shares this table's date index.
    pub fn check_aligned(&self, other: &SeriesTable) -> EfResult<()> {
        if self.dates.len() != other.dates.len() {
            return Err(EfError::IndexLength {
                expected: self.dates.len(),
                found: other.dates.len(),
            });
        }
        match self.dates.iter().zip(&other.dates).find(|(a, b)| a != b) {
            Some((a, b)) => Err(EfError::DateMismatch {
                expected: *a,
                found: *b,
            }),
            None => Ok(()),
        }
    }
}

/// `len` consecutive days starting at `start`.
pub fn daily_range(start: NaiveDate, len: usize) -> EfResult<Vec<NaiveDate>> {
    (0..len as u64)
        .map(|offset| {
            start
                .checked_add_days(Days::new(offset))
                .ok_or(EfError::DateOverflow { start, days: len })
        })
        .collect()
}
