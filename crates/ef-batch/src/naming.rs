//! File naming for batch artifacts, model definitions and the run manifest.
//!
//! Every name encodes the ensemble and the (worker, batch) key, so concurrent
//! workers never write the same path and stale files of one ensemble can be
//! found without touching another ensemble's files.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::plan::BatchKey;
use crate::{BatchError, BatchResult};

const ARTIFACT_SUFFIX: &str = ".ens.json";
const MODEL_SUFFIX: &str = ".model.json";
const PARTIAL_SUFFIX: &str = ".ens.json.tmp";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Artifact,
    Model,
    /// Temporary file left behind by an interrupted artifact write.
    Partial,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactNames {
    dir: PathBuf,
    ensemble: String,
}

impl ArtifactNames {
    pub fn new(dir: impl Into<PathBuf>, ensemble: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            ensemble: ensemble.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ensemble(&self) -> &str {
        &self.ensemble
    }

    fn stem(&self, key: BatchKey) -> String {
        format!("{}_rank{}_batch{}", self.ensemble, key.worker, key.batch)
    }

    pub fn artifact_path(&self, key: BatchKey) -> PathBuf {
        self.dir.join(format!("{}{ARTIFACT_SUFFIX}", self.stem(key)))
    }

    pub fn model_path(&self, key: BatchKey) -> PathBuf {
        self.dir.join(format!("{}{MODEL_SUFFIX}", self.stem(key)))
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(format!("{}_manifest.json", self.ensemble))
    }

    /// Classify a file name belonging to this ensemble.
    ///
    /// Returns `None` for anything else, including other ensembles whose name
    /// shares a prefix with this one.
    pub fn parse(&self, file_name: &str) -> Option<(BatchKey, FileKind)> {
        let rest = file_name
            .strip_prefix(self.ensemble.as_str())?
            .strip_prefix("_rank")?;
        let (kind, rest) = [
            (FileKind::Partial, PARTIAL_SUFFIX),
            (FileKind::Artifact, ARTIFACT_SUFFIX),
            (FileKind::Model, MODEL_SUFFIX),
        ]
        .into_iter()
        .find_map(|(kind, suffix)| rest.strip_suffix(suffix).map(|r| (kind, r)))?;

        let (worker, batch) = rest.split_once("_batch")?;
        let key = BatchKey::new(parse_index(worker)?, parse_index(batch)?);
        Some((key, kind))
    }

    fn scan(&self) -> BatchResult<Vec<(PathBuf, BatchKey, FileKind)>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut found = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(|e| BatchError::io(&self.dir, e))? {
            let entry = entry.map_err(|e| BatchError::io(&self.dir, e))?;
            let name = entry.file_name();
            if let Some(name) = name.to_str()
                && let Some((key, kind)) = self.parse(name)
            {
                found.push((entry.path(), key, kind));
            }
        }
        found.sort_by_key(|(_, key, _)| *key);
        Ok(found)
    }

    /// Delete every artifact, partial artifact and model file of this
    /// ensemble. Returns the number of files removed.
    pub fn remove_stale(&self) -> BatchResult<usize> {
        let stale = self.scan()?;
        for (path, _, _) in &stale {
            fs::remove_file(path).map_err(|e| BatchError::io(path, e))?;
            debug!(path = %path.display(), "removed stale file");
        }
        Ok(stale.len())
    }

    /// [`Self::remove_stale`] plus the run manifest.
    pub fn remove_intermediate(&self) -> BatchResult<usize> {
        let mut removed = self.remove_stale()?;
        let manifest = self.manifest_path();
        if manifest.exists() {
            fs::remove_file(&manifest).map_err(|e| BatchError::io(&manifest, e))?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Completed artifacts present in the directory, in key order.
    pub fn discover_artifacts(&self) -> BatchResult<Vec<(BatchKey, PathBuf)>> {
        Ok(self
            .scan()?
            .into_iter()
            .filter(|(_, _, kind)| *kind == FileKind::Artifact)
            .map(|(path, key, _)| (key, path))
            .collect())
    }
}

fn parse_index(s: &str) -> Option<usize> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> ArtifactNames {
        ArtifactNames::new("/out", "ens")
    }

    #[test]
    fn paths_encode_worker_and_batch() {
        let n = names();
        let key = BatchKey::new(2, 7);
        assert_eq!(n.artifact_path(key), Path::new("/out/ens_rank2_batch7.ens.json"));
        assert_eq!(n.model_path(key), Path::new("/out/ens_rank2_batch7.model.json"));
        assert_eq!(n.manifest_path(), Path::new("/out/ens_manifest.json"));
    }

    #[test]
    fn parse_recognizes_own_files() {
        let n = names();
        assert_eq!(
            n.parse("ens_rank0_batch3.ens.json"),
            Some((BatchKey::new(0, 3), FileKind::Artifact))
        );
        assert_eq!(
            n.parse("ens_rank11_batch0.model.json"),
            Some((BatchKey::new(11, 0), FileKind::Model))
        );
        assert_eq!(
            n.parse("ens_rank1_batch1.ens.json.tmp"),
            Some((BatchKey::new(1, 1), FileKind::Partial))
        );
    }

    #[test]
    fn parse_ignores_other_files() {
        let n = names();
        assert_eq!(n.parse("ens.ens.json"), None);
        assert_eq!(n.parse("ens_manifest.json"), None);
        assert_eq!(n.parse("ens2_rank0_batch0.ens.json"), None);
        assert_eq!(n.parse("ens_rank0_batch0.ens.json.bak"), None);
        assert_eq!(n.parse("ens_rank+1_batch0.ens.json"), None);
        assert_eq!(n.parse("ens_rankx_batch0.model.json"), None);
    }

    #[test]
    fn missing_directory_has_nothing_stale() {
        let n = ArtifactNames::new(std::env::temp_dir().join("ef_batch_no_such_dir_xyz"), "ens");
        assert_eq!(n.remove_stale().unwrap(), 0);
        assert!(n.discover_artifacts().unwrap().is_empty());
    }
}
