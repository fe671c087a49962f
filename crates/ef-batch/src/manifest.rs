//! Run manifest: the coordinator's record of what the workers produced.

use std::fs;
use std::path::{Path, PathBuf};

use ef_core::RealizationId;
use serde::{Deserialize, Serialize};

use crate::plan::BatchKey;
use crate::runner::{BatchFailure, BatchReport};
use crate::{BatchError, BatchResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub key: BatchKey,
    pub path: PathBuf,
    pub realizations: Vec<RealizationId>,
    /// SHA-256 of the artifact file; `None` skips verification.
    #[serde(default)]
    pub checksum: Option<String>,
}

impl From<&BatchReport> for ArtifactEntry {
    fn from(report: &BatchReport) -> Self {
        Self {
            key: report.key,
            path: report.artifact.clone(),
            realizations: report.realizations.clone(),
            checksum: Some(report.checksum.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureEntry {
    pub key: BatchKey,
    pub realizations: Vec<RealizationId>,
    pub message: String,
}

impl From<&BatchFailure> for FailureEntry {
    fn from(failure: &BatchFailure) -> Self {
        Self {
            key: failure.key,
            realizations: failure.realizations.clone(),
            message: failure.message.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub ensemble: String,
    pub plan_fingerprint: String,
    pub expected_batches: usize,
    /// Every batch key the plan produced, worker-major.
    pub expected_keys: Vec<BatchKey>,
    pub timestamp: String,
    pub artifacts: Vec<ArtifactEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<FailureEntry>,
}

impl RunManifest {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.artifacts.len() == self.expected_batches
    }

    pub fn save(&self, path: &Path) -> BatchResult<()> {
        let json = serde_json::to_string_pretty(self).map_err(|e| BatchError::Json {
            path: path.to_path_buf(),
            source: e,
        })?;
        fs::write(path, json).map_err(|e| BatchError::io(path, e))
    }

    pub fn load(path: &Path) -> BatchResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| BatchError::io(path, e))?;
        serde_json::from_str(&content).map_err(|e| BatchError::Json {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_temp_dir(prefix: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("{}_{}", prefix, nanos))
    }

    #[test]
    fn manifest_save_and_load() {
        let dir = unique_temp_dir("ef_batch_manifest");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("ens_manifest.json");

        let manifest = RunManifest {
            ensemble: "ens".to_string(),
            plan_fingerprint: "abc".to_string(),
            expected_batches: 2,
            expected_keys: vec![BatchKey::new(0, 0), BatchKey::new(1, 0)],
            timestamp: "2024-01-01T00:00:00Z".to_string(),
            artifacts: vec![ArtifactEntry {
                key: BatchKey::new(0, 0),
                path: dir.join("ens_rank0_batch0.ens.json"),
                realizations: vec!["0".into(), "1".into()],
                checksum: Some("ff".to_string()),
            }],
            failures: vec![FailureEntry {
                key: BatchKey::new(1, 0),
                realizations: vec!["2".into()],
                message: "boom".to_string(),
            }],
        };
        manifest.save(&path).unwrap();
        let loaded = RunManifest::load(&path).unwrap();
        assert_eq!(loaded, manifest);
        assert!(!loaded.is_complete());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_manifest_is_an_io_error() {
        let err = RunManifest::load(Path::new("/nonexistent/ens_manifest.json")).unwrap_err();
        assert!(matches!(err, BatchError::Io { .. }));
    }
}
