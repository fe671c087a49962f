//! ef-core: shared foundation for the ensemble pipeline.
//!
//! Contains:
//! - ids (realization identifiers)
//! - table (date-indexed series tables)
//! - timing (wall-clock stopwatches for stage reporting)
//! - error (shared error types)

pub mod error;
pub mod ids;
pub mod table;
pub mod timing;

// Re-exports: nice ergonomics for downstream crates
pub use error::{EfError, EfResult};
pub use ids::*;
pub use table::*;
