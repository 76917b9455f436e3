use std::collections::{HashSet, VecDeque};

use crate::tba::EventSummary;

const MAX_LOGS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pane {
    Available,
    InFile,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Busy {
    pub label: String,
    pub current: usize,
    pub total: usize,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub year: u16,
    pub output: String,
    pub events: Vec<EventSummary>,
    pub marked: HashSet<String>,
    pub selected: usize,
    pub file_events: Vec<String>,
    pub file_selected: usize,
    pub pane: Pane,
    pub busy: Option<Busy>,
    pub spinner: usize,
    pub logs: VecDeque<String>,
    pub help_overlay: bool,
}

/// Work the UI hands to the sync worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncCommand {
    RefreshEvents,
    RefreshFileEvents,
    LoadAll(Vec<String>),
    AddReplace(Vec<String>),
}

/// Results flowing back from the sync worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delta {
    SetEvents(Vec<EventSummary>),
    EventsFailed(String),
    SetFileEvents(Vec<String>),
    Progress {
        current: usize,
        total: usize,
        message: String,
    },
    Finished {
        headline: String,
        success: bool,
        errors: Vec<String>,
    },
    Log(String),
}

impl AppState {
    pub fn new(year: u16, output: impl Into<String>) -> Self {
        Self {
            year,
            output: output.into(),
            events: Vec::new(),
            marked: HashSet::new(),
            selected: 0,
            file_events: Vec::new(),
            file_selected: 0,
            pane: Pane::Available,
            busy: None,
            spinner: 0,
            logs: VecDeque::new(),
            help_overlay: false,
        }
    }

    pub fn push_log(&mut self, msg: impl Into<String>) {
        self.logs.push_back(msg.into());
        while self.logs.len() > MAX_LOGS {
            self.logs.pop_front();
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.is_some()
    }

    pub fn start_busy(&mut self, label: impl Into<String>) {
        let label = label.into();
        self.push_log(format!("[INFO] {label}"));
        self.busy = Some(Busy {
            label,
            current: 0,
            total: 0,
            message: String::new(),
        });
    }

    pub fn toggle_pane(&mut self) {
        self.pane = match self.pane {
            Pane::Available => Pane::InFile,
            Pane::InFile => Pane::Available,
        };
    }

    pub fn select_next(&mut self) {
        match self.pane {
            Pane::Available => {
                if self.selected + 1 < self.events.len() {
                    self.selected += 1;
                }
            }
            Pane::InFile => {
                if self.file_selected + 1 < self.file_events.len() {
                    self.file_selected += 1;
                }
            }
        }
    }

    pub fn select_prev(&mut self) {
        match self.pane {
            Pane::Available => self.selected = self.selected.saturating_sub(1),
            Pane::InFile => self.file_selected = self.file_selected.saturating_sub(1),
        }
    }

    /// Mark or unmark the event under the cursor.
    pub fn toggle_marked(&mut self) {
        if self.pane != Pane::Available {
            return;
        }
        let Some(event) = self.events.get(self.selected) else {
            return;
        };
        if !self.marked.remove(&event.key) {
            self.marked.insert(event.key.clone());
        }
    }

    /// Marked event keys in list order.
    pub fn marked_keys(&self) -> Vec<String> {
        self.events
            .iter()
            .filter(|e| self.marked.contains(&e.key))
            .map(|e| e.key.clone())
            .collect()
    }

    pub fn all_keys(&self) -> Vec<String> {
        self.events.iter().map(|e| e.key.clone()).collect()
    }

    pub fn tick(&mut self) {
        if self.busy.is_some() {
            self.spinner = self.spinner.wrapping_add(1);
        }
    }
}

pub fn apply_delta(state: &mut AppState, delta: Delta) {
    match delta {
        Delta::SetEvents(events) => {
            state.marked.retain(|key| events.iter().any(|e| &e.key == key));
            state.selected = state.selected.min(events.len().saturating_sub(1));
            state.push_log(format!(
                "[INFO] {} events available for {}",
                events.len(),
                state.year
            ));
            state.events = events;
            state.busy = None;
        }
        Delta::EventsFailed(message) => {
            state.events.clear();
            state.marked.clear();
            state.selected = 0;
            state.push_log(format!("[ERROR] {message}"));
            state.busy = None;
        }
        Delta::SetFileEvents(keys) => {
            state.file_selected = state.file_selected.min(keys.len().saturating_sub(1));
            state.file_events = keys;
        }
        Delta::Progress {
            current,
            total,
            message,
        } => {
            if let Some(busy) = state.busy.as_mut() {
                busy.current = current;
                busy.total = total;
                busy.message = message;
            }
        }
        Delta::Finished {
            headline,
            success,
            errors,
        } => {
            let level = if success { "INFO" } else { "ERROR" };
            state.push_log(format!("[{level}] {headline}"));
            if !errors.is_empty() {
                state.push_log(format!("[WARN] Some events had errors ({})", errors.len()));
                for err in errors {
                    state.push_log(format!("[WARN] {err}"));
                }
            }
            state.busy = None;
        }
        Delta::Log(line) => state.push_log(line),
    }
}
