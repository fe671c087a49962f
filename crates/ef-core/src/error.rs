use chrono::NaiveDate;
use thiserror::Error;

pub type EfResult<T> = Result<T, EfError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EfError {
    #[error("Column {label} has {len} values but the index has {expected} dates")]
    ColumnLength {
        label: String,
        len: usize,
        expected: usize,
    },

    #[error("Duplicate column label: {label}")]
    DuplicateLabel { label: String },

    #[error("Unknown column: {label}")]
    UnknownColumn { label: String },

    #[error("Date index mismatch: expected {expected}, found {found}")]
    DateMismatch { expected: NaiveDate, found: NaiveDate },

    #[error("Date index length mismatch (expected={expected}, found={found})")]
    IndexLength { expected: usize, found: usize },

    #[error("{days} days from {start} run past the supported calendar")]
    DateOverflow { start: NaiveDate, days: usize },

    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },
}
