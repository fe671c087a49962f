//! Pipeline settings: one immutable value passed to every stage.
//!
//! Settings are read from YAML. Every field has a default, so a settings file
//! only needs the values it changes:
//!
//! ```yaml
//! ensemble: obs_pub_nhmv10_BC_ObsScaled_ensemble
//! output_dir: ./pywrdrb_outputs
//! realizations_per_batch: 5
//! results_sets: [major_flow, res_storage]
//! ```

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use ef_batch::{ResultSetCatalog, RunConfig};
use ef_inflow::{CatchmentOptions, UpstreamMap};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

pub const GAGE_FLOW_FILE: &str = "gage_flow_mgd.ens.json";
pub const CATCHMENT_INFLOW_FILE: &str = "catchment_inflow_mgd.ens.json";
pub const PREDICTED_INFLOW_FILE: &str = "predicted_inflow_mgd.ens.json";

/// Realization count used when a stage is not given one.
pub const DEFAULT_REALIZATIONS: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Ensemble (inflow type) name; prefixes every run file.
    pub ensemble: String,
    /// Defaults to `./pywrdrb_inputs/<ensemble>`.
    pub input_dir: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub realizations_per_batch: usize,
    /// Defaults to the number of available CPUs.
    pub workers: Option<usize>,
    pub results_sets: Vec<String>,
    pub reference_node: String,
    pub download: DownloadSettings,
    /// Replaces the built-in river network when set.
    pub topology: Option<UpstreamMap>,
    /// Replaces the built-in result-set catalog when set.
    pub result_set_catalog: Option<ResultSetCatalog>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadSettings {
    pub api_base: String,
    pub record_id: String,
    /// Download only this file; every file of the record when unset.
    pub target_file: Option<String>,
    pub download_dir: PathBuf,
    pub attempts: u32,
    pub timeout_s: u64,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            api_base: "https://zenodo.org/api/records".to_string(),
            record_id: "15101164".to_string(),
            target_file: Some("drb_historic_streamflow_ensemble_data.zip".to_string()),
            download_dir: PathBuf::from("."),
            attempts: 3,
            timeout_s: 30,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ensemble: "obs_pub_nhmv10_BC_ObsScaled_ensemble".to_string(),
            input_dir: None,
            output_dir: PathBuf::from("./pywrdrb_outputs"),
            start_date: NaiveDate::from_ymd_opt(1945, 1, 1).unwrap_or(NaiveDate::MIN),
            end_date: NaiveDate::from_ymd_opt(2023, 12, 31).unwrap_or(NaiveDate::MIN),
            realizations_per_batch: 10,
            workers: None,
            results_sets: [
                "major_flow",
                "inflow",
                "res_storage",
                "lower_basin_mrf_contributions",
                "mrf_target",
                "ibt_diversions",
                "ibt_demands",
                "nyc_release_components",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            reference_node: "delTrenton".to_string(),
            download: DownloadSettings::default(),
            topology: None,
            result_set_catalog: None,
        }
    }
}

impl Settings {
    pub fn input_dir(&self) -> PathBuf {
        self.input_dir
            .clone()
            .unwrap_or_else(|| Path::new("./pywrdrb_inputs").join(&self.ensemble))
    }

    pub fn gage_flow_path(&self) -> PathBuf {
        self.input_dir().join(GAGE_FLOW_FILE)
    }

    pub fn catchment_inflow_path(&self) -> PathBuf {
        self.input_dir().join(CATCHMENT_INFLOW_FILE)
    }

    pub fn predicted_inflow_path(&self) -> PathBuf {
        self.input_dir().join(PREDICTED_INFLOW_FILE)
    }

    /// Final combined simulation output.
    pub fn output_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}.{}", self.ensemble, ef_store::CONTAINER_EXT))
    }

    pub fn workers(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    pub fn topology(&self) -> UpstreamMap {
        self.topology
            .clone()
            .unwrap_or_else(UpstreamMap::delaware_river_basin)
    }

    pub fn catalog(&self) -> ResultSetCatalog {
        self.result_set_catalog.clone().unwrap_or_default()
    }

    pub fn catchment_options(&self) -> CatchmentOptions {
        CatchmentOptions {
            start_date: self.start_date,
            reference_node: self.reference_node.clone(),
            topology: self.topology(),
        }
    }

    /// Batched run configuration; `workers` overrides the configured count.
    pub fn run_config(&self, workers: Option<usize>) -> RunConfig {
        RunConfig {
            ensemble: self.ensemble.clone(),
            output_dir: self.output_dir.clone(),
            output_file: self.output_path(),
            start_date: self.start_date,
            end_date: self.end_date,
            inflow_source: self.catchment_inflow_path(),
            workers: workers.unwrap_or_else(|| self.workers()),
            realizations_per_batch: self.realizations_per_batch,
            results_sets: self.results_sets.clone(),
            catalog: self.catalog(),
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.ensemble.is_empty() {
            return Err(AppError::Validation("ensemble name is empty".to_string()));
        }
        if self.start_date > self.end_date {
            return Err(AppError::Validation(format!(
                "start date {} is after end date {}",
                self.start_date, self.end_date
            )));
        }
        if self.realizations_per_batch == 0 {
            return Err(AppError::Validation(
                "realizations_per_batch must be at least 1".to_string(),
            ));
        }
        if self.workers == Some(0) {
            return Err(AppError::Validation("workers must be at least 1".to_string()));
        }
        self.catalog().check(&self.results_sets)?;
        self.topology()
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;
        Ok(())
    }
}

/// Load and validate settings from a YAML file.
pub fn load_settings(path: &Path) -> AppResult<Settings> {
    let content = std::fs::read_to_string(path).map_err(|e| AppError::SettingsFileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    let settings: Settings = serde_yaml::from_str(&content)
        .map_err(|e| AppError::Settings(format!("Failed to parse settings YAML: {}", e)))?;
    settings.validate()?;
    Ok(settings)
}

/// Save settings to a YAML file.
pub fn save_settings(path: &Path, settings: &Settings) -> AppResult<()> {
    let content = serde_yaml::to_string(settings)
        .map_err(|e| AppError::Settings(format!("Failed to serialize settings: {}", e)))?;

    std::fs::write(path, content).map_err(|e| AppError::SettingsFileWrite {
        path: path.to_path_buf(),
        source: e,
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_published_ensemble() {
        let s = Settings::default();
        s.validate().unwrap();
        assert_eq!(
            s.catchment_inflow_path(),
            Path::new("./pywrdrb_inputs/obs_pub_nhmv10_BC_ObsScaled_ensemble")
                .join("catchment_inflow_mgd.ens.json")
        );
        assert_eq!(
            s.output_path(),
            Path::new("./pywrdrb_outputs/obs_pub_nhmv10_BC_ObsScaled_ensemble.ens.json")
        );
        assert_eq!(s.realizations_per_batch, 10);
        assert_eq!(s.results_sets.len(), 8);
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let s: Settings = serde_yaml::from_str(
            "ensemble: test_ens\ninput_dir: /data/in\nworkers: 3\nstart_date: 2000-01-01\n",
        )
        .unwrap();
        assert_eq!(s.ensemble, "test_ens");
        assert_eq!(s.gage_flow_path(), Path::new("/data/in/gage_flow_mgd.ens.json"));
        assert_eq!(s.workers(), 3);
        assert_eq!(s.start_date, NaiveDate::from_ymd_opt(2000, 1, 1).unwrap());
        assert_eq!(s.end_date, NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());
        assert_eq!(s.reference_node, "delTrenton");
    }

    #[test]
    fn run_config_follows_settings() {
        let s = Settings {
            workers: Some(4),
            ..Settings::default()
        };
        let cfg = s.run_config(None);
        assert_eq!(cfg.workers, 4);
        assert_eq!(cfg.inflow_source, s.catchment_inflow_path());
        assert_eq!(s.run_config(Some(2)).workers, 2);
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let reversed = Settings {
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            ..Settings::default()
        };
        assert!(matches!(reversed.validate(), Err(AppError::Validation(_))));

        let unknown_set = Settings {
            results_sets: vec!["groundwater".to_string()],
            ..Settings::default()
        };
        assert!(matches!(unknown_set.validate(), Err(AppError::Batch(_))));

        let cyclic = Settings {
            topology: Some(UpstreamMap::new().with("a", &["b"]).with("b", &["a"])),
            ..Settings::default()
        };
        assert!(matches!(cyclic.validate(), Err(AppError::Validation(_))));
    }
}
