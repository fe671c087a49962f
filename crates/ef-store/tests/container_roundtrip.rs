use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::NaiveDate;
use ef_core::{RealizationId, SeriesTable};
use ef_store::{EnsembleCollection, Orientation, StoreError};

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    dir.push(format!("{}_{}", prefix, nanos));
    dir
}

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(1945, 1, 1).unwrap()
}

fn gauge_ensemble() -> EnsembleCollection {
    let mut c = EnsembleCollection::new(Orientation::ByRealization);
    for (key, scale) in [("0", 1.0), ("1", 2.5), ("12", -0.1)] {
        let table = SeriesTable::daily(start(), 4)
            .unwrap()
            .with_column("cannonsville", vec![0.1 * scale, 1.0 / 3.0, 2.0e-9, 7.0])
            .unwrap()
            .with_column("delLordville", vec![1e12 * scale, 5.5, 6.25, -3.75])
            .unwrap();
        c.insert(key, table).unwrap();
    }
    c
}

#[test]
fn write_read_roundtrip_is_exact() {
    let dir = unique_temp_dir("ef_store_roundtrip");
    let path = dir.join("gage_flow_mgd.ens.json");
    let original = gauge_ensemble();

    ef_store::write(&path, &original).expect("failed to write container");
    let loaded = ef_store::read(&path).expect("failed to read container");

    assert_eq!(loaded.orientation(), Orientation::ByRealization);
    assert_eq!(loaded, original);
    for (key, table) in original.iter() {
        let other = loaded.get(key).unwrap();
        assert_eq!(other.labels(), table.labels());
        assert_eq!(other.dates(), table.dates());
        for (label, values) in table.columns() {
            let read_back = other.column(label).unwrap();
            for (a, b) in values.iter().zip(read_back) {
                assert_eq!(a.to_bits(), b.to_bits());
            }
        }
    }

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn write_overwrites_existing_file() {
    let dir = unique_temp_dir("ef_store_overwrite");
    let path = dir.join("c.ens.json");

    ef_store::write(&path, &gauge_ensemble()).unwrap();
    let mut smaller = EnsembleCollection::new(Orientation::ByRealization);
    smaller
        .insert("5", SeriesTable::daily(start(), 1).unwrap().with_column("a", vec![1.0]).unwrap())
        .unwrap();
    ef_store::write(&path, &smaller).unwrap();

    assert_eq!(ef_store::list_keys(&path).unwrap(), ["5"]);
    assert!(!dir.join("c.ens.json.tmp").exists());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn nan_survives_roundtrip() {
    let dir = unique_temp_dir("ef_store_nan");
    let path = dir.join("nan.ens.json");
    let mut c = EnsembleCollection::new(Orientation::ByRealization);
    c.insert(
        "0",
        SeriesTable::daily(start(), 3)
            .unwrap()
            .with_column("a", vec![1.0, f64::NAN, 3.0])
            .unwrap(),
    )
    .unwrap();

    ef_store::write(&path, &c).unwrap();
    let loaded = ef_store::read(&path).unwrap();
    let values = loaded.get("0").unwrap().column("a").unwrap();
    assert_eq!(values[0], 1.0);
    assert!(values[1].is_nan());
    assert_eq!(values[2], 3.0);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn infinite_values_are_rejected_before_writing() {
    let dir = unique_temp_dir("ef_store_inf");
    let path = dir.join("inf.ens.json");
    let mut c = EnsembleCollection::new(Orientation::ByRealization);
    c.insert(
        "0",
        SeriesTable::daily(start(), 3)
            .unwrap()
            .with_column("a", vec![1.0, 2.0, f64::NEG_INFINITY])
            .unwrap(),
    )
    .unwrap();

    let err = ef_store::write(&path, &c).unwrap_err();
    assert!(matches!(
        err,
        StoreError::NonFinite { ref key, ref label, row: 2, .. } if key == "0" && label == "a"
    ));
    assert!(!path.exists());
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn realizations_listed_in_either_orientation() {
    let dir = unique_temp_dir("ef_store_list");
    let by_real = dir.join("by_real.ens.json");
    let by_node = dir.join("by_node.ens.json");
    let c = gauge_ensemble();
    ef_store::write(&by_real, &c).unwrap();
    ef_store::write(&by_node, &c.pivot().unwrap()).unwrap();

    let expected: Vec<RealizationId> = ["0", "1", "12"].into_iter().map(Into::into).collect();
    assert_eq!(ef_store::list_realizations(&by_real).unwrap(), expected);
    assert_eq!(ef_store::list_realizations(&by_node).unwrap(), expected);
    assert_eq!(
        ef_store::list_keys(&by_node).unwrap(),
        ["cannonsville", "delLordville"]
    );

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn extract_realization_from_node_oriented_file() {
    let dir = unique_temp_dir("ef_store_extract");
    let path = dir.join("catchment.ens.json");
    let c = gauge_ensemble();
    ef_store::write(&path, &c.pivot().unwrap()).unwrap();

    let id = RealizationId::from("1");
    let table = ef_store::extract_realization(&path, &id).unwrap();
    assert_eq!(&table, c.get("1").unwrap());

    let missing = ef_store::extract_realization(&path, &RealizationId::from("99"));
    assert!(matches!(missing, Err(StoreError::KeyNotFound { .. })));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn foreign_document_is_rejected() {
    let dir = unique_temp_dir("ef_store_foreign");
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join("other.ens.json");
    fs::write(
        &path,
        r#"{"format":"something-else","version":1,"orientation":"by_node","groups":{}}"#,
    )
    .unwrap();

    assert!(matches!(
        ef_store::read(&path),
        Err(StoreError::UnsupportedFormat { .. })
    ));

    let _ = fs::remove_dir_all(&dir);
}
