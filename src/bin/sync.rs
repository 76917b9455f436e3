use std::collections::HashSet;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Result, anyhow};

use frc_match_sync::config::Settings;
use frc_match_sync::logging;
use frc_match_sync::session::{SyncOutcome, SyncSession};

const MAX_PRINTED_ISSUES: usize = 12;

fn main() -> ExitCode {
    logging::init_stderr();
    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<bool> {
    let mut settings = Settings::from_env()?;
    if let Some(year) = parse_year_arg()? {
        settings.year = year;
    }
    if let Some(path) = parse_output_arg() {
        settings.output = path;
    }
    let session = SyncSession::from_settings(&settings);

    let progress = |p: frc_match_sync::fetch::BatchProgress| {
        println!("[{}/{}] {}", p.current, p.total, p.message);
    };

    let report = if has_flag("--all") {
        let events = session.refresh_events()?;
        let keys = events.into_iter().map(|e| e.key).collect::<Vec<_>>();
        println!("Loading all {} events for {}", keys.len(), settings.year);
        session.load_all(keys.as_slice(), progress)?
    } else {
        let keys = parse_events_arg()
            .ok_or_else(|| anyhow!("pass --events=<key,key,...> or --all"))?;
        session.add_replace(keys.as_slice(), progress)?
    };

    println!("{}", report.headline());
    if let SyncOutcome::Written {
        rows_fetched,
        rows_total,
        events_in_file,
    } = report.outcome
    {
        println!("File: {}", session.store().workbook_path().display());
        println!("Rows fetched: {rows_fetched}");
        println!("Rows in file: {rows_total} ({events_in_file} events)");
    }
    println!(
        "Events with rows: {}/{}",
        report.events_with_rows, report.events_requested
    );
    for key in &report.held_back {
        println!("Kept previous rows for {key} (re-fetch was incomplete)");
    }
    if !report.errors.is_empty() {
        println!("Some events had errors: {}", report.errors.len());
        for err in report.errors.iter().take(MAX_PRINTED_ISSUES) {
            println!("  - {}", err.summary());
        }
    }

    Ok(matches!(report.outcome, SyncOutcome::Written { .. }))
}

fn args() -> Vec<String> {
    std::env::args().skip(1).collect()
}

fn has_flag(flag: &str) -> bool {
    args().iter().any(|arg| arg == flag)
}

fn arg_value(name: &str) -> Option<String> {
    let args = args();
    let prefix = format!("{name}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&prefix) {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(next.trim().to_string());
        }
    }
    None
}

fn parse_year_arg() -> Result<Option<u16>> {
    let Some(raw) = arg_value("--year") else {
        return Ok(None);
    };
    raw.parse::<u16>()
        .map(Some)
        .map_err(|_| anyhow!("invalid --year {raw:?}"))
}

fn parse_output_arg() -> Option<PathBuf> {
    arg_value("--output").map(PathBuf::from)
}

fn parse_events_arg() -> Option<Vec<String>> {
    let raw = arg_value("--events")?;
    let keys = parse_keys(&raw);
    if keys.is_empty() { None } else { Some(keys) }
}

fn parse_keys(raw: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.split([',', ';', ' '])
        .map(|part| part.trim().to_ascii_lowercase())
        .filter(|key| !key.is_empty())
        .filter(|key| seen.insert(key.clone()))
        .collect()
}
