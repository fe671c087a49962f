use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use ef_batch::{EngineError, SimulationConfig, SimulationEngine, SimulationModel};
use ef_core::{RealizationId, SeriesTable};
use ef_inflow::UpstreamMap;
use ef_store::{EnsembleCollection, Orientation};
use serde::Serialize;
use tracing::debug;

pub const CATCHMENT_PREFIX: &str = "catchment_";
pub const LINK_PREFIX: &str = "link_";

#[derive(Debug, Clone, Default)]
pub struct RoutingEngine {
    topology: UpstreamMap,
}

impl RoutingEngine {
    pub fn new(topology: UpstreamMap) -> Self {
        Self { topology }
    }

    pub fn delaware_river_basin() -> Self {
        Self::new(UpstreamMap::delaware_river_basin())
    }

    pub fn topology(&self) -> &UpstreamMap {
        &self.topology
    }
}

impl SimulationEngine for RoutingEngine {
    type Model = RoutingModel;

    fn build(&self, config: &SimulationConfig) -> Result<RoutingModel, EngineError> {
        let inflows = load_batch_inflow(config)?;
        let local_nodes: Vec<String> = inflows
            .first()
            .map(|(_, t)| t.labels().to_vec())
            .unwrap_or_default();
        let routing_order = routing_order(&self.topology, &local_nodes)?;

        debug!(
            realizations = inflows.len(),
            nodes = routing_order.len(),
            "routing model built"
        );
        Ok(RoutingModel {
            config: config.clone(),
            topology: self.topology.clone(),
            local_nodes,
            routing_order,
            inflows,
        })
    }
}

/// Network nodes upstream-first, followed by local-inflow nodes the network
/// does not mention.
fn routing_order(
    topology: &UpstreamMap,
    local_nodes: &[String],
) -> Result<Vec<String>, EngineError> {
    let mut order = topology
        .topological_order()
        .map_err(|e| EngineError::Build(e.to_string()))?;
    let known: HashSet<String> = order.iter().cloned().collect();
    order.extend(local_nodes.iter().filter(|n| !known.contains(*n)).cloned());
    Ok(order)
}

/// Read the batch's realizations from the inflow source, trimmed to the
/// configured window.
fn load_batch_inflow(
    config: &SimulationConfig,
) -> Result<Vec<(RealizationId, SeriesTable)>, EngineError> {
    let source = &config.inflow_source;
    let missing = |id: &str| EngineError::MissingRealization {
        id: id.to_string(),
        source_path: source.clone(),
    };
    let store_err = |e: ef_store::StoreError| EngineError::Build(e.to_string());

    let collection = ef_store::read(source).map_err(store_err)?;
    let by_realization = match collection.orientation() {
        Orientation::ByRealization => collection,
        Orientation::ByNode => {
            let mut selected = EnsembleCollection::new(Orientation::ByNode);
            for (node, table) in collection.iter() {
                let table = table.select(&config.realizations).map_err(|e| match e {
                    ef_core::EfError::UnknownColumn { label } => missing(&label),
                    other => EngineError::Build(other.to_string()),
                })?;
                selected.insert(node, table).map_err(store_err)?;
            }
            selected.pivot().map_err(store_err)?
        }
    };

    config
        .realizations
        .iter()
        .map(|id| {
            let table = by_realization
                .get(id.as_str())
                .ok_or_else(|| missing(id.as_str()))?
                .slice_dates(config.start_date, config.end_date);
            if table.is_empty() {
                return Err(EngineError::EmptyWindow {
                    start: config.start_date,
                    end: config.end_date,
                });
            }
            Ok((id.clone(), table))
        })
        .collect()
}

/// Model definition persisted next to each batch artifact.
#[derive(Debug, Clone, Serialize)]
pub struct RoutingDefinition<'a> {
    pub config: &'a SimulationConfig,
    pub routing_order: &'a [String],
    pub topology: &'a UpstreamMap,
}

#[derive(Debug, Clone)]
pub struct RoutingModel {
    config: SimulationConfig,
    topology: UpstreamMap,
    local_nodes: Vec<String>,
    routing_order: Vec<String>,
    inflows: Vec<(RealizationId, SeriesTable)>,
}

impl RoutingModel {
    pub fn definition(&self) -> RoutingDefinition<'_> {
        RoutingDefinition {
            config: &self.config,
            routing_order: &self.routing_order,
            topology: &self.topology,
        }
    }

    /// Every parameter for one realization.
    fn simulate(&self, inflow: &SeriesTable) -> Result<SeriesTable, EngineError> {
        let rows = inflow.len();
        let mut links: HashMap<&str, Vec<f64>> =
            HashMap::with_capacity(self.routing_order.len());
        for node in &self.routing_order {
            let mut flow = inflow
                .column(node)
                .map(<[f64]>::to_vec)
                .unwrap_or_else(|| vec![0.0; rows]);
            for upstream in self.topology.upstream_of(node) {
                if let Some(up) = links.get(upstream.as_str()) {
                    for (q, u) in flow.iter_mut().zip(up) {
                        *q += u;
                    }
                }
            }
            links.insert(node.as_str(), flow);
        }

        let mut out =
            SeriesTable::new(inflow.dates().to_vec()).with_index_name(inflow.index_name());
        let run_err = |e: ef_core::EfError| EngineError::Run(e.to_string());
        for node in &self.local_nodes {
            if let Some(values) = inflow.column(node) {
                out.push_column(format!("{CATCHMENT_PREFIX}{node}"), values.to_vec())
                    .map_err(run_err)?;
            }
        }
        for node in &self.routing_order {
            if let Some(flow) = links.remove(node.as_str()) {
                out.push_column(format!("{LINK_PREFIX}{node}"), flow)
                    .map_err(run_err)?;
            }
        }
        Ok(out)
    }
}

impl SimulationModel for RoutingModel {
    fn parameter_names(&self) -> Vec<String> {
        self.local_nodes
            .iter()
            .map(|n| format!("{CATCHMENT_PREFIX}{n}"))
            .chain(self.routing_order.iter().map(|n| format!("{LINK_PREFIX}{n}")))
            .collect()
    }

    fn write_definition(&self, path: &Path) -> Result<(), EngineError> {
        let json = serde_json::to_string_pretty(&self.definition())
            .map_err(|e| EngineError::Build(e.to_string()))?;
        fs::write(path, json).map_err(|e| EngineError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    fn run(&mut self, export: &[String]) -> Result<EnsembleCollection, EngineError> {
        let known: HashSet<String> = self.parameter_names().into_iter().collect();
        if let Some(name) = export.iter().find(|n| !known.contains(*n)) {
            return Err(EngineError::UnknownParameter { name: name.clone() });
        }

        let mut out = EnsembleCollection::new(Orientation::ByRealization);
        for (id, inflow) in &self.inflows {
            let table = self
                .simulate(inflow)?
                .select(export)
                .map_err(|e| EngineError::Run(e.to_string()))?;
            out.insert(id.as_str(), table)
                .map_err(|e| EngineError::Run(e.to_string()))?;
        }
        Ok(out)
    }
}
