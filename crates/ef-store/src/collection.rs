//! Keyed collections of series tables.
//!
//! An ensemble is held in one of two orientations:
//!
//! - [`Orientation::ByRealization`]: realization id -> (date x node) table
//! - [`Orientation::ByNode`]: node -> (date x realization) table
//!
//! [`EnsembleCollection::pivot`] converts between them. Both orientations are
//! derived values; nothing is shared between the input and the output.

use ef_core::{EfError, RealizationId, SeriesTable};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{StoreError, StoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    ByRealization,
    ByNode,
}

impl Orientation {
    pub fn flipped(self) -> Self {
        match self {
            Orientation::ByRealization => Orientation::ByNode,
            Orientation::ByNode => Orientation::ByRealization,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleCollection {
    orientation: Orientation,
    tables: IndexMap<String, SeriesTable>,
}

impl EnsembleCollection {
    pub fn new(orientation: Orientation) -> Self {
        Self {
            orientation,
            tables: IndexMap::new(),
        }
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Add a table under a new key.
    ///
    /// Every table in a collection carries the same set of column labels.
    pub fn insert(&mut self, key: impl Into<String>, table: SeriesTable) -> StoreResult<()> {
        let key = key.into();
        if self.tables.contains_key(&key) {
            return Err(StoreError::DuplicateKey { key });
        }
        if let Some((_, first)) = self.tables.first()
            && !same_label_set(first.labels(), table.labels())
        {
            return Err(StoreError::LabelMismatch { key });
        }
        self.tables.insert(key, table);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&SeriesTable> {
        self.tables.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.tables.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SeriesTable)> {
        self.tables.iter().map(|(k, t)| (k.as_str(), t))
    }

    /// Column labels shared by every table (empty for an empty collection).
    pub fn column_labels(&self) -> &[String] {
        self.tables
            .first()
            .map(|(_, t)| t.labels())
            .unwrap_or_default()
    }

    /// Keys read as realization ids. Meaningful for realization-oriented
    /// collections; node-oriented collections carry realization ids as
    /// column labels instead.
    pub fn realization_ids(&self) -> Vec<RealizationId> {
        match self.orientation {
            Orientation::ByRealization => self.keys().map(RealizationId::from).collect(),
            Orientation::ByNode => self
                .column_labels()
                .iter()
                .map(|l| RealizationId::from(l.as_str()))
                .collect(),
        }
    }

    /// Restrict the collection to `ids`, in the given order, keeping its
    /// orientation.
    pub fn select_realizations(&self, ids: &[RealizationId]) -> StoreResult<EnsembleCollection> {
        let mut out = EnsembleCollection::new(self.orientation);
        match self.orientation {
            Orientation::ByRealization => {
                for id in ids {
                    let table = self.get(id.as_str()).ok_or_else(|| StoreError::KeyNotFound {
                        key: id.to_string(),
                    })?;
                    out.insert(id.as_str(), table.clone())?;
                }
            }
            Orientation::ByNode => {
                for (node, table) in &self.tables {
                    let selected = table.select(ids).map_err(|e| match e {
                        EfError::UnknownColumn { label } => StoreError::KeyNotFound {
                            key: format!("{node}/{label}"),
                        },
                        other => other.into(),
                    })?;
                    out.insert(node.clone(), selected)?;
                }
            }
        }
        Ok(out)
    }

    /// Swap the key axis and the column axis.
    ///
    /// All tables must share one date index. New keys follow the column
    /// order of the first table; new columns follow the current key order,
    /// so `c.pivot()?.pivot()?` reproduces `c` when its tables list their
    /// columns in a common order.
    pub fn pivot(&self) -> StoreResult<EnsembleCollection> {
        let mut out = EnsembleCollection::new(self.orientation.flipped());
        let Some((_, first)) = self.tables.first() else {
            return Ok(out);
        };
        for table in self.tables.values() {
            first.check_aligned(table)?;
        }

        for label in first.labels() {
            let mut pivoted =
                SeriesTable::new(first.dates().to_vec()).with_index_name(first.index_name());
            for (key, table) in &self.tables {
                let values = table
                    .column(label)
                    .ok_or_else(|| StoreError::LabelMismatch { key: key.clone() })?;
                pivoted.push_column(key.clone(), values.to_vec())?;
            }
            out.insert(label.clone(), pivoted)?;
        }
        Ok(out)
    }
}

fn same_label_set(a: &[String], b: &[String]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut a: Vec<&String> = a.iter().collect();
    let mut b: Vec<&String> = b.iter().collect();
    a.sort();
    b.sort();
    a == b
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(1945, 1, 1).unwrap()
    }

    fn realization(values: [[f64; 3]; 2]) -> SeriesTable {
        SeriesTable::daily(start(), 3)
            .unwrap()
            .with_column("cannonsville", values[0].to_vec())
            .unwrap()
            .with_column("delMontague", values[1].to_vec())
            .unwrap()
    }

    fn by_realization() -> EnsembleCollection {
        let mut c = EnsembleCollection::new(Orientation::ByRealization);
        c.insert("0", realization([[1.0, 2.0, 3.0], [10.0, 20.0, 30.0]]))
            .unwrap();
        c.insert("1", realization([[4.0, 5.0, 6.0], [40.0, 50.0, 60.0]]))
            .unwrap();
        c.insert("7", realization([[7.0, 8.0, 9.0], [70.0, 80.0, 90.0]]))
            .unwrap();
        c
    }

    #[test]
    fn pivot_rekeys_by_node() {
        let by_node = by_realization().pivot().unwrap();
        assert_eq!(by_node.orientation(), Orientation::ByNode);
        let keys: Vec<&str> = by_node.keys().collect();
        assert_eq!(keys, ["cannonsville", "delMontague"]);

        let montague = by_node.get("delMontague").unwrap();
        assert_eq!(montague.labels(), ["0", "1", "7"]);
        assert_eq!(montague.column("7"), Some(&[70.0, 80.0, 90.0][..]));
        assert_eq!(montague.dates(), by_realization().get("0").unwrap().dates());
    }

    #[test]
    fn select_realizations_in_both_orientations() {
        let ids: Vec<RealizationId> = vec!["7".into(), "0".into()];
        let picked = by_realization().select_realizations(&ids).unwrap();
        assert_eq!(picked.keys().collect::<Vec<_>>(), ["7", "0"]);

        let by_node = by_realization().pivot().unwrap();
        let picked = by_node.select_realizations(&ids).unwrap();
        assert_eq!(picked.orientation(), Orientation::ByNode);
        assert_eq!(picked.get("cannonsville").unwrap().labels(), ["7", "0"]);

        let missing = by_node.select_realizations(&["3".into()]);
        assert!(matches!(missing, Err(StoreError::KeyNotFound { key }) if key == "cannonsville/3"));
    }

    #[test]
    fn pivot_twice_restores_original() {
        let original = by_realization();
        let restored = original.pivot().unwrap().pivot().unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn pivot_rejects_misaligned_dates() {
        let mut c = by_realization();
        let shifted = SeriesTable::daily(start().succ_opt().unwrap(), 3)
            .unwrap()
            .with_column("cannonsville", vec![0.0; 3])
            .unwrap()
            .with_column("delMontague", vec![0.0; 3])
            .unwrap();
        c.insert("9", shifted).unwrap();
        assert!(matches!(c.pivot(), Err(StoreError::Table(_))));
    }

    #[test]
    fn insert_rejects_different_labels() {
        let mut c = by_realization();
        let other = SeriesTable::daily(start(), 3)
            .unwrap()
            .with_column("pepacton", vec![0.0; 3])
            .unwrap();
        assert!(matches!(
            c.insert("2", other),
            Err(StoreError::LabelMismatch { .. })
        ));
        assert!(matches!(
            c.insert("0", realization([[0.0; 3]; 2])),
            Err(StoreError::DuplicateKey { .. })
        ));
    }

    #[test]
    fn realization_ids_follow_orientation() {
        let c = by_realization();
        let ids: Vec<String> = c.realization_ids().iter().map(|r| r.to_string()).collect();
        assert_eq!(ids, ["0", "1", "7"]);
        let by_node_ids = c.pivot().unwrap().realization_ids();
        assert_eq!(by_node_ids, c.realization_ids());
    }
}
