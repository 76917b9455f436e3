use std::sync::mpsc::{Receiver, Sender};
use std::thread::{self, JoinHandle};

use tracing::error;

use crate::session::{SyncOutcome, SyncReport, SyncSession};
use crate::state::{Delta, SyncCommand};
use crate::tba::MatchApi;

/// Run sync commands one at a time on a background thread.
///
/// Commands are handled strictly in arrival order, so two batches never touch
/// the dataset concurrently. The thread exits when the command sender is dropped.
pub fn spawn_sync_worker<A>(
    session: SyncSession<A>,
    tx: Sender<Delta>,
    cmd_rx: Receiver<SyncCommand>,
) -> JoinHandle<()>
where
    A: MatchApi + Send + 'static,
{
    thread::spawn(move || {
        while let Ok(cmd) = cmd_rx.recv() {
            if handle_command(&session, &tx, cmd).is_err() {
                // UI gone.
                break;
            }
        }
    })
}

fn handle_command<A: MatchApi>(
    session: &SyncSession<A>,
    tx: &Sender<Delta>,
    cmd: SyncCommand,
) -> Result<(), std::sync::mpsc::SendError<Delta>> {
    match cmd {
        SyncCommand::RefreshEvents => match session.refresh_events() {
            Ok(events) => tx.send(Delta::SetEvents(events)),
            Err(err) => {
                error!(error = %format!("{err:#}"), "event list refresh failed");
                tx.send(Delta::EventsFailed(format!("{err:#}")))
            }
        },
        SyncCommand::RefreshFileEvents => send_file_events(session, tx),
        SyncCommand::LoadAll(keys) => {
            let result = session.load_all(keys.as_slice(), |p| {
                let _ = tx.send(Delta::Progress {
                    current: p.current,
                    total: p.total,
                    message: p.message,
                });
            });
            finish(session, tx, result)
        }
        SyncCommand::AddReplace(keys) => {
            let result = session.add_replace(keys.as_slice(), |p| {
                let _ = tx.send(Delta::Progress {
                    current: p.current,
                    total: p.total,
                    message: p.message,
                });
            });
            finish(session, tx, result)
        }
    }
}

fn finish<A: MatchApi>(
    session: &SyncSession<A>,
    tx: &Sender<Delta>,
    result: anyhow::Result<SyncReport>,
) -> Result<(), std::sync::mpsc::SendError<Delta>> {
    match result {
        Ok(report) => {
            let success = matches!(report.outcome, SyncOutcome::Written { .. });
            for key in &report.held_back {
                tx.send(Delta::Log(format!(
                    "[WARN] {key}: kept previous rows, re-fetch was incomplete"
                )))?;
            }
            tx.send(Delta::Finished {
                headline: report.headline(),
                success,
                errors: report.errors.iter().map(|e| e.summary()).collect(),
            })?;
            if success {
                send_file_events(session, tx)?;
            }
            Ok(())
        }
        Err(err) => {
            error!(error = %format!("{err:#}"), "sync failed");
            tx.send(Delta::Finished {
                headline: format!("Sync failed: {err:#}"),
                success: false,
                errors: Vec::new(),
            })
        }
    }
}

fn send_file_events<A: MatchApi>(
    session: &SyncSession<A>,
    tx: &Sender<Delta>,
) -> Result<(), std::sync::mpsc::SendError<Delta>> {
    match session.stored_event_keys() {
        Ok(keys) => tx.send(Delta::SetFileEvents(keys)),
        Err(err) => tx.send(Delta::Log(format!("[WARN] cannot read dataset: {err:#}"))),
    }
}
