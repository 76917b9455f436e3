use anyhow::Result;
use tracing::{info, warn};

use crate::config::Settings;
use crate::dataset::{ReconcileMode, UpsertGuard, hold_back_partial_events, reconcile};
use crate::fetch::{BatchProgress, FetchIssue, collect_batch};
use crate::store::DatasetStore;
use crate::tba::{EventSummary, MatchApi, TbaClient, fetch_events};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The dataset was rewritten.
    Written {
        rows_fetched: usize,
        rows_total: usize,
        events_in_file: usize,
    },
    /// The batch produced no rows; nothing was written.
    NoData,
    /// Upsert requested with an empty selection; nothing was fetched.
    NoSelection,
}

#[derive(Debug)]
pub struct SyncReport {
    pub mode: ReconcileMode,
    pub outcome: SyncOutcome,
    pub events_requested: usize,
    pub events_with_rows: usize,
    pub errors: Vec<FetchIssue>,
    /// Events whose stored rows were kept because their re-fetch had issues.
    pub held_back: Vec<String>,
}

impl SyncReport {
    pub fn headline(&self) -> String {
        match (&self.outcome, self.mode) {
            (SyncOutcome::Written { .. }, ReconcileMode::Replace) => {
                "File replaced with all TBA events data.".to_string()
            }
            (SyncOutcome::Written { .. }, ReconcileMode::Upsert) => {
                "Selected events updated in file.".to_string()
            }
            (SyncOutcome::NoData, ReconcileMode::Replace) => "No data fetched.".to_string(),
            (SyncOutcome::NoData, ReconcileMode::Upsert) => {
                "No data fetched for selected events.".to_string()
            }
            (SyncOutcome::NoSelection, _) => "No events selected.".to_string(),
        }
    }

    /// All issues, joined for a single end-of-batch report.
    pub fn combined_errors(&self) -> Option<String> {
        if self.errors.is_empty() {
            return None;
        }
        Some(
            self.errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\n\n"),
        )
    }
}

/// Everything one sync run needs: the API, the dataset store and the policy knobs.
pub struct SyncSession<A> {
    api: A,
    store: DatasetStore,
    year: u16,
    guard: UpsertGuard,
}

impl SyncSession<TbaClient> {
    pub fn from_settings(settings: &Settings) -> Self {
        SyncSession::new(
            TbaClient::new(settings),
            DatasetStore::new(&settings.output),
            settings.year,
            settings.upsert_guard,
        )
    }
}

impl<A: MatchApi> SyncSession<A> {
    pub fn new(api: A, store: DatasetStore, year: u16, guard: UpsertGuard) -> Self {
        Self {
            api,
            store,
            year,
            guard,
        }
    }

    pub fn store(&self) -> &DatasetStore {
        &self.store
    }

    /// Events available for the configured season.
    pub fn refresh_events(&self) -> Result<Vec<EventSummary>> {
        let events = fetch_events(&self.api, self.year)?;
        info!(year = self.year, events = events.len(), "event list refreshed");
        Ok(events)
    }

    pub fn stored_event_keys(&self) -> Result<Vec<String>> {
        self.store.event_keys()
    }

    /// Fetch every given event and replace the stored dataset with the result.
    pub fn load_all<S: AsRef<str>>(
        &self,
        event_keys: &[S],
        on_progress: impl FnMut(BatchProgress),
    ) -> Result<SyncReport> {
        self.run(event_keys, ReconcileMode::Replace, on_progress)
    }

    /// Fetch the selected events and swap their rows in the stored dataset.
    pub fn add_replace<S: AsRef<str>>(
        &self,
        event_keys: &[S],
        on_progress: impl FnMut(BatchProgress),
    ) -> Result<SyncReport> {
        if event_keys.is_empty() {
            return Ok(SyncReport {
                mode: ReconcileMode::Upsert,
                outcome: SyncOutcome::NoSelection,
                events_requested: 0,
                events_with_rows: 0,
                errors: Vec::new(),
                held_back: Vec::new(),
            });
        }
        self.run(event_keys, ReconcileMode::Upsert, on_progress)
    }

    fn run<S: AsRef<str>>(
        &self,
        event_keys: &[S],
        mode: ReconcileMode,
        on_progress: impl FnMut(BatchProgress),
    ) -> Result<SyncReport> {
        let batch = collect_batch(&self.api, event_keys, on_progress);
        let mut report = SyncReport {
            mode,
            outcome: SyncOutcome::NoData,
            events_requested: batch.events_requested,
            events_with_rows: batch.events_with_rows,
            errors: batch.errors,
            held_back: Vec::new(),
        };

        if batch.rows.is_empty() {
            warn!(events = report.events_requested, "batch produced no rows");
            return Ok(report);
        }

        let rows_fetched = batch.rows.len();
        let dataset = match mode {
            ReconcileMode::Replace => reconcile(Default::default(), batch.rows, mode),
            ReconcileMode::Upsert => {
                let existing = self.store.load()?;
                let (rows, held_back) =
                    hold_back_partial_events(&existing, batch.rows, &report.errors, self.guard);
                if !held_back.is_empty() {
                    warn!(events = ?held_back, "kept stored rows of partially fetched events");
                }
                report.held_back = held_back;
                reconcile(existing, rows, mode)
            }
        };

        self.store.save(&dataset)?;
        report.outcome = SyncOutcome::Written {
            rows_fetched,
            rows_total: dataset.len(),
            events_in_file: dataset.event_keys().len(),
        };
        Ok(report)
    }
}
