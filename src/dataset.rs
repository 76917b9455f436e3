use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::fetch::FetchIssue;
use crate::flatten::FlatRow;

pub const EVENT_KEY: &str = "event_key";

/// Columns pinned to the front of the sheet, in this order, when present.
pub const PINNED_COLUMNS: [&str; 3] = [EVENT_KEY, "match", "winning_alliance"];

/// The persisted table: an ordered column list plus rows keyed by column name.
/// A column missing from a row reads as null.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub rows: Vec<FlatRow>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileMode {
    /// Discard the stored dataset and keep only the new rows.
    Replace,
    /// Replace stored rows event by event: every stored row of an event present
    /// in the new batch is dropped, rows of other events are kept.
    Upsert,
}

/// Whether an upsert may evict an event's stored rows when its re-fetch was partial.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UpsertGuard {
    #[default]
    Off,
    /// Keep the stored rows of events that recorded issues in this batch.
    KeepPrevious,
}

impl Dataset {
    pub fn from_rows(rows: Vec<FlatRow>) -> Self {
        let mut dataset = Dataset::default();
        dataset.append_rows(rows);
        dataset
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Sorted, de-duplicated event keys present in the dataset.
    pub fn event_keys(&self) -> Vec<String> {
        self.rows
            .iter()
            .filter_map(|row| event_key(row).map(str::to_string))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn has_event(&self, key: &str) -> bool {
        self.rows.iter().any(|row| event_key(row) == Some(key))
    }

    fn append_rows(&mut self, rows: Vec<FlatRow>) {
        let mut known: HashSet<String> = self.columns.iter().cloned().collect();
        for row in &rows {
            for column in row.keys() {
                if known.insert(column.clone()) {
                    self.columns.push(column.clone());
                }
            }
        }
        self.rows.extend(rows);
    }
}

/// Event key of a row; rows without a string `event_key` have none.
pub fn event_key(row: &FlatRow) -> Option<&str> {
    row.get(EVENT_KEY).and_then(Value::as_str)
}

/// Merge a new batch into the stored dataset and fix the column order.
pub fn reconcile(existing: Dataset, incoming: Vec<FlatRow>, mode: ReconcileMode) -> Dataset {
    let mut merged = match mode {
        ReconcileMode::Replace => Dataset::from_rows(incoming),
        ReconcileMode::Upsert if incoming.is_empty() => existing,
        ReconcileMode::Upsert => {
            let replaced: HashSet<Option<&str>> = incoming.iter().map(event_key).collect();
            let kept = existing
                .rows
                .iter()
                .filter(|row| !replaced.contains(&event_key(row)))
                .cloned()
                .collect::<Vec<_>>();
            let mut merged = Dataset {
                columns: existing.columns,
                rows: Vec::with_capacity(kept.len() + incoming.len()),
            };
            merged.append_rows(kept);
            merged.append_rows(incoming);
            merged
        }
    };
    merged.columns = reorder_columns(merged.columns);
    merged
}

/// Move the pinned columns to the front; everything else keeps its order.
pub fn reorder_columns(columns: Vec<String>) -> Vec<String> {
    let mut ordered = Vec::with_capacity(columns.len());
    for pinned in PINNED_COLUMNS {
        if columns.iter().any(|c| c == pinned) {
            ordered.push(pinned.to_string());
        }
    }
    ordered.extend(
        columns
            .into_iter()
            .filter(|c| !PINNED_COLUMNS.contains(&c.as_str())),
    );
    ordered
}

/// Drop incoming rows of events whose re-fetch recorded issues and which
/// already have stored rows, so an upsert leaves their previous rows alone.
///
/// Returns the rows to upsert and the sorted event keys that were held back.
pub fn hold_back_partial_events(
    existing: &Dataset,
    incoming: Vec<FlatRow>,
    errors: &[FetchIssue],
    guard: UpsertGuard,
) -> (Vec<FlatRow>, Vec<String>) {
    if guard == UpsertGuard::Off {
        return (incoming, Vec::new());
    }

    let held: BTreeSet<&str> = errors
        .iter()
        .map(FetchIssue::event_key)
        .filter(|key| existing.has_event(key))
        .collect();
    if held.is_empty() {
        return (incoming, Vec::new());
    }

    let rows = incoming
        .into_iter()
        .filter(|row| event_key(row).is_none_or(|key| !held.contains(key)))
        .collect();
    (rows, held.into_iter().map(str::to_string).collect())
}
