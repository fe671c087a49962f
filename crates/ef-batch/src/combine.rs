//! Merge per-batch artifacts into the final ensemble container.
//!
//! Realization ids are carried over unchanged. Missing or corrupted artifacts
//! make the result partial: they are reported in [`CombineReport::missing`]
//! and the merge goes on with the rest.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use ef_store::{EnsembleCollection, Orientation};
use tracing::{info, instrument, warn};

use crate::manifest::{ArtifactEntry, RunManifest};
use crate::naming::ArtifactNames;
use crate::plan::BatchKey;
use crate::{BatchError, BatchResult};

#[derive(Debug, Clone, PartialEq)]
pub struct CombineReport {
    pub expected: usize,
    pub found: usize,
    /// Expected batches that contributed nothing to the output.
    pub missing: Vec<BatchKey>,
    pub realizations: usize,
    pub output: PathBuf,
}

impl CombineReport {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty() && self.found >= self.expected
    }
}

/// Merge `artifacts` into `output`.
///
/// `expected` is the full list of batch keys the run planned. Artifacts are
/// merged in key order; an artifact that no longer exists, whose checksum
/// changed or whose realizations differ from its entry is skipped. The same
/// realization appearing in two artifacts is an error.
#[instrument(skip_all, fields(output = %output.display()))]
pub fn combine_artifacts(
    artifacts: &[ArtifactEntry],
    expected: &[BatchKey],
    output: &Path,
) -> BatchResult<CombineReport> {
    let mut ordered: Vec<&ArtifactEntry> = artifacts.iter().collect();
    ordered.sort_by_key(|a| a.key);

    let mut combined = EnsembleCollection::new(Orientation::ByRealization);
    let mut merged_keys = HashSet::new();
    for entry in ordered {
        let Some(collection) = load_artifact(entry)? else {
            continue;
        };
        for (id, table) in collection.iter() {
            if combined.contains_key(id) {
                return Err(BatchError::DuplicateRealization {
                    id: id.to_string(),
                    path: entry.path.clone(),
                });
            }
            combined.insert(id, table.clone())?;
        }
        merged_keys.insert(entry.key);
    }

    let missing: Vec<BatchKey> = expected
        .iter()
        .copied()
        .filter(|k| !merged_keys.contains(k))
        .collect();
    let report = CombineReport {
        expected: expected.len(),
        found: merged_keys.len(),
        missing,
        realizations: combined.len(),
        output: output.to_path_buf(),
    };

    if report.found < report.expected {
        warn!(
            expected = report.expected,
            found = report.found,
            missing = ?report.missing,
            "combining a partial ensemble"
        );
    }
    if combined.is_empty() {
        warn!("no batch artifacts to combine; writing an empty container");
    }

    ef_store::write(output, &combined)?;
    info!(
        batches = report.found,
        realizations = report.realizations,
        "combined batch artifacts"
    );
    Ok(report)
}

/// Read one artifact as a realization-keyed collection.
///
/// Returns `Ok(None)` for artifacts that should be counted missing.
fn load_artifact(entry: &ArtifactEntry) -> BatchResult<Option<EnsembleCollection>> {
    let path = &entry.path;
    if !path.exists() {
        warn!(batch = %entry.key, path = %path.display(), "batch artifact not found");
        return Ok(None);
    }
    if let Some(expected) = &entry.checksum {
        let actual = ef_store::file_sha256(path)?;
        if &actual != expected {
            warn!(batch = %entry.key, path = %path.display(), "batch artifact checksum mismatch");
            return Ok(None);
        }
    }

    let collection = ef_store::read(path)?;
    let collection = match collection.orientation() {
        Orientation::ByRealization => collection,
        Orientation::ByNode => collection.pivot()?,
    };
    if !entry.realizations.is_empty() {
        let listed: HashSet<&str> = entry.realizations.iter().map(|r| r.as_str()).collect();
        let stored: HashSet<&str> = collection.keys().collect();
        if listed != stored {
            warn!(
                batch = %entry.key,
                path = %path.display(),
                "batch artifact realizations differ from the manifest"
            );
            return Ok(None);
        }
    }
    Ok(Some(collection))
}

/// Combine whatever the output directory holds for this ensemble.
///
/// With a run manifest present its artifact list and expected keys are used.
/// Otherwise artifacts are discovered by name and the expected count is the
/// number discovered, so incompleteness cannot be detected.
pub fn combine_directory(names: &ArtifactNames, output: &Path) -> BatchResult<CombineReport> {
    let manifest_path = names.manifest_path();
    if manifest_path.exists() {
        let manifest = RunManifest::load(&manifest_path)?;
        info!(
            manifest = %manifest_path.display(),
            artifacts = manifest.artifacts.len(),
            "combining from run manifest"
        );
        return combine_artifacts(&manifest.artifacts, &manifest.expected_keys, output);
    }

    let discovered = names.discover_artifacts()?;
    warn!(
        dir = %names.dir().display(),
        artifacts = discovered.len(),
        "no run manifest; combining discovered artifacts"
    );
    let expected: Vec<BatchKey> = discovered.iter().map(|(key, _)| *key).collect();
    let entries: Vec<ArtifactEntry> = discovered
        .into_iter()
        .map(|(key, path)| ArtifactEntry {
            key,
            path,
            realizations: Vec::new(),
            checksum: None,
        })
        .collect();
    combine_artifacts(&entries, &expected, output)
}
