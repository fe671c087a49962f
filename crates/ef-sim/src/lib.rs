//! ef-sim: a daily flow-routing engine for batched ensemble runs.
//!
//! The engine reads catchment inflow for a batch of realizations and routes
//! it down the river network without lag or losses: the flow leaving a node
//! is its local inflow plus the flow leaving each immediate upstream node.
//!
//! Exported parameters:
//! - `catchment_<node>` for every node with a local inflow column
//! - `link_<node>` for every node of the network, in routing order

pub mod routing;

pub use routing::{RoutingDefinition, RoutingEngine, RoutingModel, CATCHMENT_PREFIX, LINK_PREFIX};
