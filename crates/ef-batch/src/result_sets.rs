//! Named result sets and their resolution to model parameter names.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{BatchError, BatchResult};

/// Set name that selects every model parameter.
pub const ALL: &str = "all";

/// Result-set name -> parameter-name prefixes belonging to that set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultSetCatalog(IndexMap<String, Vec<String>>);

impl Default for ResultSetCatalog {
    fn default() -> Self {
        Self::new()
            .with("major_flow", &["link_"])
            .with("inflow", &["catchment_"])
            .with("res_storage", &["reservoir_"])
            .with("lower_basin_mrf_contributions", &["mrf_trenton_", "mrf_montague_"])
            .with("mrf_target", &["mrf_target_"])
            .with("ibt_diversions", &["delivery_nyc", "delivery_nj"])
            .with("ibt_demands", &["demand_nyc", "demand_nj"])
            .with(
                "nyc_release_components",
                &["mrf_montagueTrenton_", "flood_release_", "spill_"],
            )
    }
}

impl ResultSetCatalog {
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    pub fn with(mut self, name: &str, prefixes: &[&str]) -> Self {
        self.0.insert(
            name.to_string(),
            prefixes.iter().map(|p| p.to_string()).collect(),
        );
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Fail on the first set name the catalog does not know.
    pub fn check<S: AsRef<str>>(&self, sets: &[S]) -> BatchResult<()> {
        for set in sets {
            let set = set.as_ref();
            if set != ALL && !self.0.contains_key(set) {
                return Err(BatchError::UnknownResultSet {
                    name: set.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Parameter names belonging to any of `sets`; all of them when `sets`
    /// contains [`ALL`].
    ///
    /// The result keeps `parameters` order and holds each name once. Sets
    /// matching no parameter contribute nothing, so the result may be empty.
    pub fn resolve<S: AsRef<str>>(
        &self,
        parameters: &[String],
        sets: &[S],
    ) -> BatchResult<Vec<String>> {
        self.check(sets)?;
        let everything = sets.iter().any(|s| s.as_ref() == ALL);
        let prefixes: Vec<&str> = sets
            .iter()
            .filter_map(|s| self.0.get(s.as_ref()))
            .flatten()
            .map(String::as_str)
            .collect();

        let mut seen = HashSet::new();
        Ok(parameters
            .iter()
            .filter(|p| everything || prefixes.iter().any(|prefix| p.starts_with(prefix)))
            .filter(|p| seen.insert(p.as_str()))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parameters() -> Vec<String> {
        [
            "catchment_cannonsville",
            "link_01425000",
            "reservoir_cannonsville",
            "catchment_pepacton",
            "link_delMontague",
            "link_delMontague",
            "demand_nyc",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    #[test]
    fn resolve_keeps_model_order_without_duplicates() {
        let catalog = ResultSetCatalog::default();
        let names = catalog
            .resolve(&parameters(), &["major_flow", "inflow", "major_flow"])
            .unwrap();
        assert_eq!(
            names,
            [
                "catchment_cannonsville",
                "link_01425000",
                "catchment_pepacton",
                "link_delMontague"
            ]
        );
    }

    #[test]
    fn all_resolves_to_every_parameter_once() {
        let catalog = ResultSetCatalog::default();
        let names = catalog.resolve(&parameters(), &["inflow", ALL]).unwrap();
        assert_eq!(
            names,
            [
                "catchment_cannonsville",
                "link_01425000",
                "reservoir_cannonsville",
                "catchment_pepacton",
                "link_delMontague",
                "demand_nyc"
            ]
        );
    }

    #[test]
    fn sets_without_matching_parameters_resolve_to_nothing() {
        let catalog = ResultSetCatalog::default();
        let routed = vec!["catchment_up".to_string(), "link_up".to_string()];
        assert!(catalog.resolve(&routed, &["res_storage"]).unwrap().is_empty());
        assert_eq!(
            catalog.resolve(&routed, &["res_storage", "major_flow"]).unwrap(),
            ["link_up"]
        );
        assert!(catalog.resolve::<&str>(&routed, &[]).unwrap().is_empty());
    }

    #[test]
    fn unknown_set_is_rejected() {
        let catalog = ResultSetCatalog::default();
        let err = catalog.resolve(&parameters(), &["inflow", "evaporation"]);
        assert!(matches!(
            err,
            Err(BatchError::UnknownResultSet { name }) if name == "evaporation"
        ));
    }

    #[test]
    fn catalog_deserializes_from_a_plain_map() {
        let catalog: ResultSetCatalog =
            serde_json::from_str(r#"{"flows": ["link_"], "local": ["catchment_"]}"#).unwrap();
        assert_eq!(catalog.names().collect::<Vec<_>>(), ["flows", "local"]);
        assert_eq!(
            catalog.resolve(&parameters(), &["local"]).unwrap(),
            ["catchment_cannonsville", "catchment_pepacton"]
        );
    }
}
