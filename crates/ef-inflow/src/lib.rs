//! ef-inflow: catchment inflow derivation and inflow prediction.

pub mod catchment;
pub mod predict;
pub mod topology;

pub use catchment::{derive_catchment_inflow, derive_ensemble, CatchmentOptions};
pub use predict::{lead_label, predict_ensemble, Ar1Predictor, InflowPredictor, DEFAULT_LEADS};
pub use topology::UpstreamMap;

pub type InflowResult<T> = Result<T, InflowError>;

#[derive(thiserror::Error, Debug)]
pub enum InflowError {
    #[error("Node {node} lists upstream node {upstream}, which is missing from the table")]
    MissingUpstream { node: String, upstream: String },

    #[error("Node {node} lists itself as upstream")]
    SelfUpstream { node: String },

    #[error("Upstream map contains a cycle through {node}")]
    Cycle { node: String },

    #[error("Realization {realization}: {source}")]
    Realization {
        realization: String,
        #[source]
        source: Box<InflowError>,
    },

    #[error("Invalid lead time: {lead}")]
    InvalidLead { lead: usize },

    #[error("Table error: {0}")]
    Table(#[from] ef_core::EfError),

    #[error("Store error: {0}")]
    Store(#[from] ef_store::StoreError),
}
