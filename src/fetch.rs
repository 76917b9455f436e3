use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::flatten::{FlatRow, FlattenError, flatten_match};
use crate::tba::MatchApi;

/// A non-fatal problem recorded while fetching or flattening.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchIssue {
    #[error("Error fetching matches for {event_key}:\n{message}")]
    Request { event_key: String, message: String },

    #[error("Error fetching matches for {event_key}:\nStatus code: {status}\nResponse: {body}")]
    Status {
        event_key: String,
        status: u16,
        body: String,
    },

    #[error("Error parsing JSON for event {event_key}:\n{message}\nResponse text: {body}")]
    Parse {
        event_key: String,
        message: String,
        body: String,
    },

    #[error(
        "Error processing match index {index} for event {event_key}:\nMatch data: {raw}\n\nReason: {reason}\n\nURL: {url}\n\nThis match was skipped."
    )]
    Match {
        event_key: String,
        index: usize,
        raw: Value,
        reason: FlattenError,
        url: String,
    },
}

impl FetchIssue {
    pub fn event_key(&self) -> &str {
        match self {
            FetchIssue::Request { event_key, .. }
            | FetchIssue::Status { event_key, .. }
            | FetchIssue::Parse { event_key, .. }
            | FetchIssue::Match { event_key, .. } => event_key,
        }
    }

    /// One-line form for consoles and status bars.
    pub fn summary(&self) -> String {
        match self {
            FetchIssue::Request { event_key, message } => format!("{event_key}: {message}"),
            FetchIssue::Status {
                event_key, status, ..
            } => format!("{event_key}: http {status}"),
            FetchIssue::Parse {
                event_key, message, ..
            } => format!("{event_key}: bad json ({message})"),
            FetchIssue::Match {
                event_key,
                index,
                reason,
                ..
            } => format!("{event_key}: match #{index} skipped ({reason})"),
        }
    }
}

#[derive(Debug, Default)]
pub struct EventFetch {
    pub rows: Vec<FlatRow>,
    pub errors: Vec<FetchIssue>,
}

/// Fetch one event's matches and flatten them.
///
/// Never fails as a whole: a failed request, a bad status or an unparsable
/// body each produce one issue and no rows, and a match that cannot be
/// flattened is recorded and skipped without touching its siblings.
pub fn fetch_event_matches<A: MatchApi + ?Sized>(api: &A, event_key: &str) -> EventFetch {
    let mut out = EventFetch::default();

    let resp = match api.event_matches(event_key) {
        Ok(resp) => resp,
        Err(err) => {
            out.errors.push(FetchIssue::Request {
                event_key: event_key.to_string(),
                message: format!("{err:#}"),
            });
            return out;
        }
    };

    if !resp.is_success() {
        out.errors.push(FetchIssue::Status {
            event_key: event_key.to_string(),
            status: resp.status,
            body: resp.body,
        });
        return out;
    }

    let matches = match serde_json::from_str::<Vec<Value>>(&resp.body) {
        Ok(matches) => matches,
        Err(err) => {
            out.errors.push(FetchIssue::Parse {
                event_key: event_key.to_string(),
                message: err.to_string(),
                body: resp.body,
            });
            return out;
        }
    };

    for (index, raw) in matches.into_iter().enumerate() {
        match flatten_match(&raw) {
            Ok(rows) => out.rows.extend(rows),
            Err(reason) => out.errors.push(FetchIssue::Match {
                event_key: event_key.to_string(),
                index,
                raw,
                reason,
                url: resp.url.clone(),
            }),
        }
    }

    out
}

pub struct BatchProgress {
    pub current: usize,
    pub total: usize,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub rows: Vec<FlatRow>,
    pub errors: Vec<FetchIssue>,
    pub events_requested: usize,
    pub events_with_rows: usize,
}

/// Fetch every event in order, one at a time, accumulating rows and issues.
pub fn collect_batch<A, S>(
    api: &A,
    event_keys: &[S],
    mut on_progress: impl FnMut(BatchProgress),
) -> BatchOutcome
where
    A: MatchApi + ?Sized,
    S: AsRef<str>,
{
    let total = event_keys.len();
    let mut outcome = BatchOutcome {
        events_requested: total,
        ..BatchOutcome::default()
    };

    for (idx, key) in event_keys.iter().enumerate() {
        let key = key.as_ref();
        on_progress(BatchProgress {
            current: idx,
            total,
            message: format!("Fetching matches for {key}..."),
        });

        let fetched = fetch_event_matches(api, key);
        info!(
            event_key = key,
            rows = fetched.rows.len(),
            issues = fetched.errors.len(),
            "event fetched"
        );
        for issue in &fetched.errors {
            warn!(event_key = key, "{}", issue.summary());
        }
        if !fetched.rows.is_empty() {
            outcome.events_with_rows += 1;
        }
        outcome.rows.extend(fetched.rows);
        outcome.errors.extend(fetched.errors);
    }

    on_progress(BatchProgress {
        current: total,
        total,
        message: format!("Fetched {} rows from {total} events", outcome.rows.len()),
    });

    outcome
}
