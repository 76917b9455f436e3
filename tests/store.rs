use std::fs;
use std::time::{Duration, SystemTime};

use serde_json::json;
use tempfile::tempdir;

use frc_match_sync::dataset::{Dataset, ReconcileMode, reconcile};
use frc_match_sync::flatten::FlatRow;
use frc_match_sync::store::DatasetStore;
use frc_match_sync::workbook::{column_widths, display_text, exact_f64, write_workbook};

fn sample() -> Dataset {
    let mut red = FlatRow::new();
    red.insert("event_key".to_string(), json!("2025casj"));
    red.insert("match".to_string(), json!("qm 5"));
    red.insert("alliance".to_string(), json!("red"));
    red.insert("bot1".to_string(), json!(254));
    red.insert("bot2".to_string(), serde_json::Value::Null);
    red.insert("coopertitionCriteriaMet".to_string(), json!(false));
    red.insert("bargeDetail".to_string(), json!({"robot1": "Parked"}));
    let mut blue = red.clone();
    blue.insert("alliance".to_string(), json!("blue"));
    blue.insert("bot1".to_string(), json!(971));
    reconcile(Dataset::default(), vec![red, blue], ReconcileMode::Replace)
}

#[test]
fn missing_files_load_as_empty_dataset() {
    let dir = tempdir().expect("tempdir");
    let store = DatasetStore::new(dir.path().join("matches.xlsx"));
    let loaded = store.load().expect("empty load");
    assert!(loaded.is_empty());
    assert!(loaded.columns.is_empty());
    assert!(store.event_keys().expect("keys").is_empty());
}

#[test]
fn save_then_load_returns_the_same_dataset() {
    let dir = tempdir().expect("tempdir");
    let store = DatasetStore::new(dir.path().join("out").join("matches.xlsx"));
    let dataset = sample();

    store.save(&dataset).expect("save");
    assert!(store.workbook_path().exists());
    assert!(store.snapshot_path().exists());
    assert_eq!(store.snapshot_path(), dir.path().join("out").join("matches.json"));

    let loaded = store.load().expect("load");
    assert_eq!(loaded, dataset);
    assert_eq!(store.event_keys().expect("keys"), vec!["2025casj"]);
}

#[test]
fn save_leaves_no_temporary_files() {
    let dir = tempdir().expect("tempdir");
    let store = DatasetStore::new(dir.path().join("matches.xlsx"));
    store.save(&sample()).expect("save");
    store.save(&sample()).expect("overwrite");

    let mut names = fs::read_dir(dir.path())
        .expect("read dir")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().to_string())
        .collect::<Vec<_>>();
    names.sort();
    assert_eq!(names, vec!["matches.json", "matches.xlsx"]);
}

#[test]
fn corrupt_snapshot_is_an_error_not_an_empty_dataset() {
    let dir = tempdir().expect("tempdir");
    let store = DatasetStore::new(dir.path().join("matches.xlsx"));
    fs::write(store.snapshot_path(), "{not json").expect("write");
    assert!(store.load().is_err());
}

#[test]
fn foreign_snapshot_version_is_rejected() {
    let dir = tempdir().expect("tempdir");
    let store = DatasetStore::new(dir.path().join("matches.xlsx"));
    fs::write(
        store.snapshot_path(),
        r#"{"version":99,"saved_at":"","dataset":{"columns":[],"rows":[]}}"#,
    )
    .expect("write");
    let err = store.load().expect_err("version mismatch");
    assert!(err.to_string().contains("snapshot version 99"));
}

#[test]
fn cell_text_and_widths() {
    assert_eq!(display_text(&serde_json::Value::Null), "");
    assert_eq!(display_text(&json!("qm 5")), "qm 5");
    assert_eq!(display_text(&json!(12)), "12");
    assert_eq!(display_text(&json!({"a": 1})), "{\"a\":1}");

    let dataset = sample();
    let widths = column_widths(&dataset);
    let idx = |name: &str| {
        dataset
            .columns
            .iter()
            .position(|c| c == name)
            .expect("column present")
    };
    // Header longer than any value.
    assert_eq!(widths[idx("event_key")], "2025casj".len().max("event_key".len()) + 2);
    assert_eq!(widths[idx("bot2")], "bot2".len() + 2);
    assert_eq!(
        widths[idx("bargeDetail")],
        "{\"robot1\":\"Parked\"}".len() + 2
    );
}

#[test]
fn workbook_without_snapshot_is_read_back() {
    let dir = tempdir().expect("tempdir");
    let store = DatasetStore::new(dir.path().join("matches.xlsx"));
    let dataset = sample();
    store.save(&dataset).expect("save");
    fs::remove_file(store.snapshot_path()).expect("drop snapshot");

    let loaded = store.load().expect("load from workbook");
    assert_eq!(loaded.columns, dataset.columns);
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded.rows[0]["event_key"], json!("2025casj"));
    assert_eq!(loaded.rows[0]["match"], json!("qm 5"));
    assert_eq!(loaded.rows[0]["bot1"], json!(254));
    assert_eq!(loaded.rows[1]["bot1"], json!(971));
    assert_eq!(loaded.rows[1]["alliance"], json!("blue"));
    assert_eq!(loaded.rows[0]["bot2"], serde_json::Value::Null);
    assert_eq!(loaded.rows[0]["coopertitionCriteriaMet"], json!(false));
    assert_eq!(loaded.rows[0]["bargeDetail"], json!("{\"robot1\":\"Parked\"}"));
    assert_eq!(store.event_keys().expect("keys"), vec!["2025casj"]);
}

#[test]
fn workbook_newer_than_snapshot_wins() {
    let dir = tempdir().expect("tempdir");
    let store = DatasetStore::new(dir.path().join("matches.xlsx"));
    store.save(&sample()).expect("save");

    let mut edited = FlatRow::new();
    edited.insert("event_key".to_string(), json!("2025txhou"));
    edited.insert("match".to_string(), json!("qm 1"));
    let edited = reconcile(Dataset::default(), vec![edited], ReconcileMode::Replace);
    write_workbook(store.workbook_path(), &edited).expect("rewrite workbook");
    fs::File::options()
        .write(true)
        .open(store.workbook_path())
        .expect("open workbook")
        .set_modified(SystemTime::now() + Duration::from_secs(60))
        .expect("touch workbook");

    assert_eq!(store.event_keys().expect("keys"), vec!["2025txhou"]);
}

#[test]
fn failed_snapshot_swap_leaves_no_temporaries_or_stale_snapshot() {
    let dir = tempdir().expect("tempdir");
    let store = DatasetStore::new(dir.path().join("matches.xlsx"));
    // A non-empty directory where the snapshot belongs cannot be replaced by a file.
    fs::create_dir_all(store.snapshot_path().join("blocker")).expect("blocker");

    assert!(store.save(&sample()).is_err());
    let names = fs::read_dir(dir.path())
        .expect("read dir")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().to_string())
        .collect::<Vec<_>>();
    assert!(names.iter().all(|name| !name.ends_with(".tmp")), "{names:?}");
    assert!(store.workbook_path().exists());
}

#[test]
fn integers_beyond_f64_precision_are_kept_as_text() {
    let big = serde_json::Number::from(9_007_199_254_740_993_u64);
    assert_eq!(exact_f64(&big), None);
    assert_eq!(exact_f64(&serde_json::Number::from(254)), Some(254.0));
    assert_eq!(exact_f64(&serde_json::Number::from(-(1_i64 << 53))), Some(-9_007_199_254_740_992.0));

    let dir = tempdir().expect("tempdir");
    let store = DatasetStore::new(dir.path().join("matches.xlsx"));
    let mut row = FlatRow::new();
    row.insert("event_key".to_string(), json!("2025casj"));
    row.insert("matchId".to_string(), json!(9_007_199_254_740_993_u64));
    store
        .save(&reconcile(Dataset::default(), vec![row], ReconcileMode::Replace))
        .expect("save");
    fs::remove_file(store.snapshot_path()).expect("drop snapshot");

    let loaded = store.load().expect("load");
    assert_eq!(loaded.rows[0]["matchId"], json!("9007199254740993"));
}
