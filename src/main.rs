use std::io;
use std::process::ExitCode;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::prelude::*;
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Clear, Gauge, Paragraph};

use frc_match_sync::config::Settings;
use frc_match_sync::http_cache::app_cache_dir;
use frc_match_sync::logging;
use frc_match_sync::session::SyncSession;
use frc_match_sync::state::{AppState, Delta, Pane, SyncCommand, apply_delta};
use frc_match_sync::worker::spawn_sync_worker;

const SPINNER: [char; 4] = ['|', '/', '-', '\\'];

struct App {
    state: AppState,
    should_quit: bool,
    cmd_tx: mpsc::Sender<SyncCommand>,
}

impl App {
    fn new(state: AppState, cmd_tx: mpsc::Sender<SyncCommand>) -> Self {
        Self {
            state,
            should_quit: false,
            cmd_tx,
        }
    }

    fn on_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('?') => self.state.help_overlay = !self.state.help_overlay,
            KeyCode::Tab => self.state.toggle_pane(),
            KeyCode::Char('j') | KeyCode::Down => self.state.select_next(),
            KeyCode::Char('k') | KeyCode::Up => self.state.select_prev(),
            KeyCode::Char(' ') => self.state.toggle_marked(),
            KeyCode::Char('r') | KeyCode::Char('R') => self.refresh_events(),
            KeyCode::Char('a') | KeyCode::Char('A') => self.load_all(),
            KeyCode::Char('u') | KeyCode::Char('U') => self.add_replace_selected(),
            _ => {}
        }
    }

    fn refresh_events(&mut self) {
        self.dispatch("Refreshing event list", SyncCommand::RefreshEvents);
    }

    fn load_all(&mut self) {
        let keys = self.state.all_keys();
        if keys.is_empty() {
            self.state
                .push_log("[WARN] No events loaded; press r to refresh the list");
            return;
        }
        let label = format!("Loading all {} events (replace file)", keys.len());
        self.dispatch(label, SyncCommand::LoadAll(keys));
    }

    fn add_replace_selected(&mut self) {
        let keys = self.state.marked_keys();
        if keys.is_empty() {
            self.state.push_log("[WARN] No events selected.");
            return;
        }
        let label = format!("Adding/replacing {} selected events", keys.len());
        self.dispatch(label, SyncCommand::AddReplace(keys));
    }

    fn dispatch(&mut self, label: impl Into<String>, cmd: SyncCommand) {
        if self.state.is_busy() {
            self.state
                .push_log("[INFO] Still working; wait for the current run to finish");
            return;
        }
        if self.cmd_tx.send(cmd).is_err() {
            self.state.push_log("[ERROR] Sync worker is not running");
            return;
        }
        self.state.start_busy(label);
    }
}

fn main() -> ExitCode {
    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    if let Some(dir) = app_cache_dir()
        && let Err(err) = logging::init_file(&dir.join("frc_match_sync.log"))
    {
        eprintln!("warning: {err:#}");
    }

    match run(settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(settings: Settings) -> io::Result<()> {
    let (tx, rx) = mpsc::channel();
    let (cmd_tx, cmd_rx) = mpsc::channel();
    let session = SyncSession::from_settings(&settings);
    spawn_sync_worker(session, tx, cmd_rx);

    let state = AppState::new(settings.year, settings.output.display().to_string());
    let mut app = App::new(state, cmd_tx);
    let _ = app.cmd_tx.send(SyncCommand::RefreshFileEvents);
    app.refresh_events();

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = ratatui::backend::CrosstermBackend::new(stdout);
    let mut terminal = ratatui::Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app, rx);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    res
}

fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    rx: mpsc::Receiver<Delta>,
) -> io::Result<()> {
    let tick_rate = Duration::from_millis(150);
    let mut last_tick = Instant::now();

    loop {
        while let Ok(delta) = rx.try_recv() {
            apply_delta(&mut app.state, delta);
        }

        terminal.draw(|f| ui(f, app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);
        if event::poll(timeout)?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            app.on_key(key);
        }

        if last_tick.elapsed() >= tick_rate {
            app.state.tick();
            last_tick = Instant::now();
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

fn ui(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2),
            Constraint::Min(6),
            Constraint::Length(3),
            Constraint::Length(8),
            Constraint::Length(1),
        ])
        .split(frame.size());

    let header = Paragraph::new(header_text(&app.state))
        .block(Block::default().borders(Borders::BOTTOM));
    frame.render_widget(header, chunks[0]);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
        .split(chunks[1]);
    render_available(frame, columns[0], &app.state);
    render_in_file(frame, columns[1], &app.state);

    render_status(frame, chunks[2], &app.state);

    let console = Paragraph::new(console_text(&app.state, chunks[3].height.saturating_sub(2)))
        .block(Block::default().title("Console").borders(Borders::ALL));
    frame.render_widget(console, chunks[3]);

    let footer = Paragraph::new(
        "r Refresh | Space Mark | a Load all (replace) | u Add/replace marked | Tab Pane | ? Help | q Quit",
    )
    .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(footer, chunks[4]);

    if app.state.help_overlay {
        render_help_overlay(frame, frame.size());
    }
}

fn header_text(state: &AppState) -> String {
    format!(
        "TBA MATCH DATA UPDATER | Season {} | Output: {}",
        state.year, state.output
    )
}

fn pane_block(title: String, focused: bool) -> Block<'static> {
    let style = if focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    };
    Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(style)
}

fn render_available(frame: &mut Frame, area: Rect, state: &AppState) {
    let title = format!(
        "Available Events from TBA ({} marked / {})",
        state.marked.len(),
        state.events.len()
    );
    let block = pane_block(title, state.pane == Pane::Available);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if state.events.is_empty() {
        let empty = Paragraph::new("No events loaded").style(Style::default().fg(Color::DarkGray));
        frame.render_widget(empty, inner);
        return;
    }

    let (start, end) = visible_range(state.selected, state.events.len(), inner.height as usize);
    let lines = (start..end)
        .map(|idx| {
            let event = &state.events[idx];
            let mark = if state.marked.contains(&event.key) {
                "[x]"
            } else {
                "[ ]"
            };
            let text = format!("{mark} {} - {}", event.key, event.display_name());
            let style = if idx == state.selected && state.pane == Pane::Available {
                Style::default().fg(Color::White).bg(Color::DarkGray)
            } else {
                Style::default()
            };
            Line::styled(text, style)
        })
        .collect::<Vec<_>>();
    frame.render_widget(Paragraph::new(lines), inner);
}

fn render_in_file(frame: &mut Frame, area: Rect, state: &AppState) {
    let title = format!("Events in File ({})", state.file_events.len());
    let block = pane_block(title, state.pane == Pane::InFile);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if state.file_events.is_empty() {
        let empty = Paragraph::new("File is empty").style(Style::default().fg(Color::DarkGray));
        frame.render_widget(empty, inner);
        return;
    }

    let (start, end) = visible_range(
        state.file_selected,
        state.file_events.len(),
        inner.height as usize,
    );
    let lines = (start..end)
        .map(|idx| {
            let style = if idx == state.file_selected && state.pane == Pane::InFile {
                Style::default().fg(Color::White).bg(Color::DarkGray)
            } else {
                Style::default()
            };
            Line::styled(state.file_events[idx].clone(), style)
        })
        .collect::<Vec<_>>();
    frame.render_widget(Paragraph::new(lines), inner);
}

fn render_status(frame: &mut Frame, area: Rect, state: &AppState) {
    let block = Block::default().title("Status").borders(Borders::ALL);
    let Some(busy) = state.busy.as_ref() else {
        let idle = Paragraph::new("Idle").block(block);
        frame.render_widget(idle, area);
        return;
    };

    let spin = SPINNER[state.spinner % SPINNER.len()];
    let ratio = if busy.total == 0 {
        0.0
    } else {
        (busy.current as f64 / busy.total as f64).clamp(0.0, 1.0)
    };
    let message = if busy.message.is_empty() {
        busy.label.as_str()
    } else {
        busy.message.as_str()
    };
    let gauge = Gauge::default()
        .block(block)
        .gauge_style(Style::default().fg(Color::Green).add_modifier(Modifier::BOLD))
        .ratio(ratio)
        .label(format!("{spin} {message}"));
    frame.render_widget(gauge, area);
}

fn console_text(state: &AppState, visible: u16) -> String {
    if state.logs.is_empty() {
        return "No messages yet".to_string();
    }
    let take = (visible as usize).max(1);
    let start = state.logs.len().saturating_sub(take);
    state
        .logs
        .iter()
        .skip(start)
        .cloned()
        .collect::<Vec<_>>()
        .join("\n")
}

fn visible_range(selected: usize, total: usize, visible: usize) -> (usize, usize) {
    if total == 0 || visible == 0 {
        return (0, 0);
    }
    if total <= visible {
        return (0, total);
    }

    let mut start = selected.saturating_sub(visible / 2);
    if start + visible > total {
        start = total - visible;
    }
    (start, start + visible)
}

fn render_help_overlay(frame: &mut Frame, area: Rect) {
    let popup_area = centered_rect(60, 60, area);
    frame.render_widget(Clear, popup_area);

    let text = [
        "TBA Match Data Updater - Help",
        "",
        "  r            Refresh the event list",
        "  Space        Mark / unmark event",
        "  a            Load all events (replace file)",
        "  u            Add/replace marked events",
        "  Tab          Switch pane",
        "  j/k or ↑/↓   Move",
        "  ?            Toggle help",
        "  q            Quit",
        "",
        "Errors from a run are listed in the console",
        "once the run finishes.",
    ]
    .join("\n");

    let help = Paragraph::new(text)
        .block(Block::default().title("Help").borders(Borders::ALL))
        .style(Style::default());
    frame.render_widget(help, popup_area);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1]);

    horizontal[1]
}
