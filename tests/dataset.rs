use serde_json::{Value, json};

use frc_match_sync::dataset::{
    Dataset, ReconcileMode, UpsertGuard, hold_back_partial_events, reconcile, reorder_columns,
};
use frc_match_sync::fetch::FetchIssue;
use frc_match_sync::flatten::FlatRow;

fn row(event: &str, label: &str, alliance: &str, extra: Value) -> FlatRow {
    let mut row = FlatRow::new();
    row.insert("alliance".to_string(), json!(alliance));
    row.insert("match".to_string(), json!(label));
    row.insert("event_key".to_string(), json!(event));
    if let Value::Object(extra) = extra {
        row.extend(extra);
    }
    row
}

fn pair(event: &str, label: &str) -> Vec<FlatRow> {
    vec![
        row(event, label, "red", json!({"winning_alliance": "red"})),
        row(event, label, "blue", json!({"winning_alliance": "red"})),
    ]
}

fn stored(events: &[(&str, &[&str])]) -> Dataset {
    let mut rows = Vec::new();
    for (event, labels) in events {
        for label in *labels {
            rows.extend(pair(event, label));
        }
    }
    reconcile(Dataset::default(), rows, ReconcileMode::Replace)
}

fn status_issue(event: &str) -> FetchIssue {
    FetchIssue::Status {
        event_key: event.to_string(),
        status: 500,
        body: String::new(),
    }
}

#[test]
fn replace_keeps_only_incoming_rows() {
    let existing = stored(&[("2025a", &["qm 1", "qm 2"]), ("2025b", &["qm 1"])]);
    let incoming = pair("2025c", "qm 7");
    let merged = reconcile(existing, incoming.clone(), ReconcileMode::Replace);
    assert_eq!(merged.rows, incoming);
    assert_eq!(merged.event_keys(), vec!["2025c"]);
}

#[test]
fn replace_ignores_existing_columns() {
    let mut existing = stored(&[("2025a", &["qm 1"])]);
    existing.columns.push("legacy_column".to_string());
    let merged = reconcile(existing, pair("2025c", "qm 7"), ReconcileMode::Replace);
    assert!(!merged.columns.contains(&"legacy_column".to_string()));
}

#[test]
fn upsert_replaces_whole_events_and_keeps_others() {
    let existing = stored(&[("2025a", &["qm 1", "qm 2", "qm 3"]), ("2025b", &["qm 1"])]);
    let b_rows_before = existing
        .rows
        .iter()
        .filter(|r| r["event_key"] == json!("2025b"))
        .cloned()
        .collect::<Vec<_>>();

    // Re-fetch of 2025a only returns one match; all three stored matches go.
    let incoming = vec![
        row("2025a", "qm 1", "red", json!({"winning_alliance": "blue", "rp": 1})),
        row("2025a", "qm 1", "blue", json!({"winning_alliance": "blue", "rp": 3})),
    ];
    let merged = reconcile(existing, incoming.clone(), ReconcileMode::Upsert);

    let a_rows = merged
        .rows
        .iter()
        .filter(|r| r["event_key"] == json!("2025a"))
        .cloned()
        .collect::<Vec<_>>();
    assert_eq!(a_rows, incoming);

    let b_rows = merged
        .rows
        .iter()
        .filter(|r| r["event_key"] == json!("2025b"))
        .cloned()
        .collect::<Vec<_>>();
    assert_eq!(b_rows, b_rows_before);
    assert_eq!(merged.len(), 4);
}

#[test]
fn upsert_keeps_one_row_per_event_match_alliance() {
    let existing = stored(&[("2025a", &["qm 1", "qm 2"])]);
    let merged = reconcile(existing, pair("2025a", "qm 1"), ReconcileMode::Upsert);
    let merged = reconcile(merged, pair("2025a", "qm 1"), ReconcileMode::Upsert);
    assert_eq!(merged.len(), 2);
}

#[test]
fn upsert_appends_new_columns_after_existing_ones() {
    let existing = stored(&[("2025a", &["qm 1"])]);
    let incoming = vec![row("2025b", "qm 1", "red", json!({"coralPoints": 12}))];
    let merged = reconcile(existing, incoming, ReconcileMode::Upsert);
    assert_eq!(
        merged.columns,
        vec!["event_key", "match", "winning_alliance", "alliance", "coralPoints"]
    );
    assert_eq!(merged.rows[0].get("coralPoints"), None);
    assert_eq!(merged.rows[2].get("coralPoints"), Some(&json!(12)));
}

#[test]
fn upsert_with_empty_batch_is_a_no_op() {
    let existing = stored(&[("2025a", &["qm 1"])]);
    let merged = reconcile(existing.clone(), Vec::new(), ReconcileMode::Upsert);
    assert_eq!(merged, existing);
}

#[test]
fn upsert_into_empty_dataset() {
    let merged = reconcile(Dataset::default(), pair("2025a", "qm 1"), ReconcileMode::Upsert);
    assert_eq!(merged.len(), 2);
    assert_eq!(merged.columns[..3], ["event_key", "match", "winning_alliance"]);
}

#[test]
fn pinned_columns_lead_in_fixed_order() {
    let columns = ["alliance", "winning_alliance", "bot1", "match", "event_key", "rp"]
        .map(String::from)
        .to_vec();
    assert_eq!(
        reorder_columns(columns),
        vec!["event_key", "match", "winning_alliance", "alliance", "bot1", "rp"]
    );
}

#[test]
fn absent_pinned_columns_are_skipped() {
    let columns = ["bot1", "match", "rp"].map(String::from).to_vec();
    assert_eq!(reorder_columns(columns), vec!["match", "bot1", "rp"]);
}

#[test]
fn event_keys_are_sorted_and_unique() {
    let dataset = stored(&[("2025b", &["qm 1"]), ("2025a", &["qm 1", "qm 2"])]);
    assert_eq!(dataset.event_keys(), vec!["2025a", "2025b"]);
}

#[test]
fn guard_off_passes_rows_through() {
    let existing = stored(&[("2025a", &["qm 1", "qm 2"])]);
    let incoming = pair("2025a", "qm 1");
    let (rows, held) = hold_back_partial_events(
        &existing,
        incoming.clone(),
        &[status_issue("2025a")],
        UpsertGuard::Off,
    );
    assert_eq!(rows, incoming);
    assert!(held.is_empty());
}

#[test]
fn guard_keeps_stored_rows_of_partially_fetched_events() {
    let existing = stored(&[("2025a", &["qm 1", "qm 2"]), ("2025b", &["qm 1"])]);
    let mut incoming = pair("2025a", "qm 1");
    incoming.extend(pair("2025b", "qm 1"));
    incoming.extend(pair("2025c", "qm 1"));
    let issues = [status_issue("2025a"), status_issue("2025c")];

    let (rows, held) =
        hold_back_partial_events(&existing, incoming, &issues, UpsertGuard::KeepPrevious);
    // 2025c has issues too but nothing stored to protect.
    assert_eq!(held, vec!["2025a"]);
    assert_eq!(rows.len(), 4);

    let merged = reconcile(existing, rows, ReconcileMode::Upsert);
    let a_matches = merged
        .rows
        .iter()
        .filter(|r| r["event_key"] == json!("2025a"))
        .count();
    assert_eq!(a_matches, 4);
    assert_eq!(merged.event_keys(), vec!["2025a", "2025b", "2025c"]);
}
