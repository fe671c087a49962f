//! Container files: the persisted form of an [`EnsembleCollection`].
//!
//! A container is one JSON document holding a format tag, the collection's
//! orientation and one group per key. Each group stores the date vector, the
//! column labels and one dataset per column:
//!
//! ```json
//! {
//!   "format": "ensflow-container",
//!   "version": 1,
//!   "orientation": "by_node",
//!   "groups": {
//!     "delMontague": {
//!       "index_name": "datetime",
//!       "column_labels": ["0", "1"],
//!       "date": ["1945-01-01", "1945-01-02"],
//!       "datasets": { "0": [1.5, 2.0], "1": [null, 3.25] }
//!     }
//!   }
//! }
//! ```
//!
//! NaN is written as `null` and read back as NaN; infinities are rejected so
//! every value that can be written reads back unchanged. Files are
//! written to a temporary sibling and renamed into place, so readers never
//! observe a partially written container.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use ef_core::{RealizationId, SeriesTable};
use indexmap::IndexMap;
use serde::ser::SerializeSeq;
use serde::{Deserialize, Serialize, Serializer};
use tracing::{debug, info};

use crate::collection::{EnsembleCollection, Orientation};
use crate::{StoreError, StoreResult};

/// File extension of container files.
pub const CONTAINER_EXT: &str = "ens.json";

const FORMAT_TAG: &str = "ensflow-container";
const FORMAT_VERSION: u32 = 1;
const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Serialize)]
struct ContainerRef<'a> {
    format: &'static str,
    version: u32,
    orientation: Orientation,
    groups: IndexMap<&'a str, GroupRef<'a>>,
}

#[derive(Serialize)]
struct GroupRef<'a> {
    index_name: &'a str,
    column_labels: &'a [String],
    date: Vec<String>,
    datasets: IndexMap<&'a str, DatasetRef<'a>>,
}

struct DatasetRef<'a>(&'a [f64]);

impl Serialize for DatasetRef<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for v in self.0 {
            if !v.is_nan() {
                seq.serialize_element(v)?;
            } else {
                seq.serialize_element(&Option::<f64>::None)?;
            }
        }
        seq.end()
    }
}

#[derive(Deserialize)]
struct ContainerDoc {
    format: String,
    version: u32,
    orientation: Orientation,
    groups: IndexMap<String, GroupDoc>,
}

#[derive(Deserialize)]
struct GroupDoc {
    #[serde(default = "default_index_name")]
    index_name: String,
    column_labels: Vec<String>,
    date: Vec<String>,
    datasets: IndexMap<String, Vec<Option<f64>>>,
}

fn default_index_name() -> String {
    ef_core::DEFAULT_INDEX_NAME.to_string()
}

/// Write a collection to `path`, replacing any existing file.
///
/// Fails without touching `path` if any value is infinite.
pub fn write(path: &Path, collection: &EnsembleCollection) -> StoreResult<()> {
    check_storable(collection)?;
    let groups = collection
        .iter()
        .map(|(key, table)| {
            let group = GroupRef {
                index_name: table.index_name(),
                column_labels: table.labels(),
                date: table
                    .dates()
                    .iter()
                    .map(|d| d.format(DATE_FORMAT).to_string())
                    .collect(),
                datasets: table
                    .columns()
                    .map(|(label, values)| (label, DatasetRef(values)))
                    .collect(),
            };
            (key, group)
        })
        .collect();
    let doc = ContainerRef {
        format: FORMAT_TAG,
        version: FORMAT_VERSION,
        orientation: collection.orientation(),
        groups,
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }

    let tmp_path = temp_sibling(path);
    let file = fs::File::create(&tmp_path).map_err(|e| StoreError::io(&tmp_path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, &doc).map_err(|e| StoreError::Json {
        path: tmp_path.clone(),
        source: e,
    })?;
    writer.flush().map_err(|e| StoreError::io(&tmp_path, e))?;
    drop(writer);
    fs::rename(&tmp_path, path).map_err(|e| StoreError::io(path, e))?;

    info!(
        path = %path.display(),
        groups = collection.len(),
        orientation = ?collection.orientation(),
        "container written"
    );
    Ok(())
}

/// Read a whole container.
pub fn read(path: &Path) -> StoreResult<EnsembleCollection> {
    let doc = read_doc(path)?;
    let mut collection = EnsembleCollection::new(doc.orientation);
    for (key, group) in doc.groups {
        let table = group_to_table(&key, group)?;
        collection.insert(key, table)?;
    }
    debug!(path = %path.display(), groups = collection.len(), "container read");
    Ok(collection)
}

/// Top-level keys of a container, in stored order.
pub fn list_keys(path: &Path) -> StoreResult<Vec<String>> {
    Ok(read_doc(path)?.groups.into_keys().collect())
}

/// Realization ids present in a container, in stored order.
///
/// Realization-oriented containers key their groups by realization;
/// node-oriented containers list realizations as column labels.
pub fn list_realizations(path: &Path) -> StoreResult<Vec<RealizationId>> {
    let doc = read_doc(path)?;
    let ids = match doc.orientation {
        Orientation::ByRealization => doc.groups.into_keys().map(RealizationId::from).collect(),
        Orientation::ByNode => doc
            .groups
            .into_values()
            .next()
            .map(|g| g.column_labels.into_iter().map(RealizationId::from).collect())
            .unwrap_or_default(),
    };
    Ok(ids)
}

/// Read one realization's (date x node) table.
///
/// For node-oriented containers the table is assembled from the
/// realization's column in every node group.
pub fn extract_realization(path: &Path, id: &RealizationId) -> StoreResult<SeriesTable> {
    let doc = read_doc(path)?;
    match doc.orientation {
        Orientation::ByRealization => {
            let (key, group) = doc
                .groups
                .into_iter()
                .find(|(k, _)| k == id.as_str())
                .ok_or_else(|| StoreError::KeyNotFound {
                    key: id.to_string(),
                })?;
            group_to_table(&key, group)
        }
        Orientation::ByNode => {
            let mut out: Option<SeriesTable> = None;
            for (node, group) in doc.groups {
                let table = group_to_table(&node, group)?;
                let values = table
                    .column(id.as_str())
                    .ok_or_else(|| StoreError::KeyNotFound {
                        key: format!("{node}/{id}"),
                    })?
                    .to_vec();
                let target = out.get_or_insert_with(|| {
                    SeriesTable::new(table.dates().to_vec()).with_index_name(table.index_name())
                });
                target.check_aligned(&table)?;
                target.push_column(node, values)?;
            }
            out.ok_or(StoreError::Empty)
        }
    }
}

fn check_storable(collection: &EnsembleCollection) -> StoreResult<()> {
    for (key, table) in collection.iter() {
        for (label, values) in table.columns() {
            if let Some((row, value)) = values.iter().enumerate().find(|(_, v)| v.is_infinite()) {
                return Err(StoreError::NonFinite {
                    key: key.to_string(),
                    label: label.to_string(),
                    row,
                    value: *value,
                });
            }
        }
    }
    Ok(())
}

fn read_doc(path: &Path) -> StoreResult<ContainerDoc> {
    let bytes = fs::read(path).map_err(|e| StoreError::io(path, e))?;
    let doc: ContainerDoc = serde_json::from_slice(&bytes).map_err(|e| StoreError::Json {
        path: path.to_path_buf(),
        source: e,
    })?;
    if doc.format != FORMAT_TAG || doc.version != FORMAT_VERSION {
        return Err(StoreError::UnsupportedFormat {
            format: doc.format,
            version: doc.version,
        });
    }
    Ok(doc)
}

fn group_to_table(key: &str, mut group: GroupDoc) -> StoreResult<SeriesTable> {
    let dates = group
        .date
        .iter()
        .map(|s| parse_date(key, s))
        .collect::<StoreResult<Vec<_>>>()?;
    let mut table = SeriesTable::new(dates).with_index_name(group.index_name);
    for label in group.column_labels {
        let values = group
            .datasets
            .shift_remove(&label)
            .ok_or_else(|| StoreError::KeyNotFound {
                key: format!("{key}/{label}"),
            })?;
        let values = values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect();
        table.push_column(label, values)?;
    }
    Ok(table)
}

fn parse_date(key: &str, value: &str) -> StoreResult<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .or_else(|_| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").map(|dt| dt.date())
        })
        .map_err(|_| StoreError::InvalidDate {
            key: key.to_string(),
            value: value.to_string(),
        })
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_date_accepts_timestamp_strings() {
        let d = parse_date("g", "1945-01-02 00:00:00").unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(1945, 1, 2).unwrap());
        assert!(matches!(
            parse_date("g", "02/01/1945"),
            Err(StoreError::InvalidDate { .. })
        ));
    }

    #[test]
    fn temp_sibling_keeps_directory() {
        let tmp = temp_sibling(Path::new("/out/ens.ens.json"));
        assert_eq!(tmp, Path::new("/out/ens.ens.json.tmp"));
    }

    #[test]
    fn datasets_write_non_finite_as_null() {
        let values = [1.0, f64::NAN, f64::INFINITY];
        let json = serde_json::to_string(&DatasetRef(&values)).unwrap();
        assert_eq!(json, "[1.0,null,null]");
    }
}
