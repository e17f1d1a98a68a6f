use std::collections::VecDeque;
use std::io;
use std::sync::mpsc::{self, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossterm::ExecutableCommand;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use miette::IntoDiagnostic;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

use crate::app::{JournalEntry, Phase, ProgressEvent, ProgressSink, Severity};
use crate::error::MigrateError;

const EVENTS_MAX: usize = 8;
const JOURNAL_MAX: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    Progress,
    Journal,
}

#[derive(Debug)]
struct ImportState {
    status: String,
    phase: Phase,
    events: VecDeque<String>,
    journal: VecDeque<(String, JournalEntry)>,
    view: View,
    started: Instant,
    finished: bool,
    closing: bool,
}

/// Full-screen progress view for one import. The import runs on a worker
/// thread and always runs to completion; closing only waits for it.
pub struct Tui {
    process: String,
    state: Arc<Mutex<ImportState>>,
}

struct TuiProgress {
    state: Arc<Mutex<ImportState>>,
}

impl ProgressSink for TuiProgress {
    fn event(&self, event: ProgressEvent) {
        if let Ok(mut state) = self.state.lock() {
            let message = event.message.trim().to_string();
            match Phase::parse_event(&message) {
                Some((phase, detail)) => {
                    state.phase = phase;
                    state.status = detail.to_string();
                    state.finished = phase == Phase::Done;
                }
                None => state.status = message.clone(),
            }
            push_bounded(&mut state.events, format!("[{}] {message}", timestamp()), EVENTS_MAX);
        }
    }

    fn journal(&self, entry: JournalEntry) {
        if let Ok(mut state) = self.state.lock() {
            push_bounded(&mut state.journal, (timestamp(), entry), JOURNAL_MAX);
        }
    }
}

impl Tui {
    pub fn new(process: impl Into<String>) -> Self {
        Self {
            process: process.into(),
            state: Arc::new(Mutex::new(ImportState {
                status: "starting".to_string(),
                phase: Phase::Fetching,
                events: VecDeque::new(),
                journal: VecDeque::new(),
                view: View::Progress,
                started: Instant::now(),
                finished: false,
                closing: false,
            })),
        }
    }

    pub fn run<F, R>(&mut self, f: F) -> miette::Result<R>
    where
        F: FnOnce(&dyn ProgressSink) -> Result<R, MigrateError> + Send + 'static,
        R: Send + 'static,
    {
        let mut stdout = io::stdout();
        enable_raw_mode().into_diagnostic()?;
        stdout.execute(EnterAlternateScreen).into_diagnostic()?;

        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).into_diagnostic()?;
        terminal.clear().into_diagnostic()?;

        let (tx, rx) = mpsc::channel();
        let sink = TuiProgress {
            state: self.state.clone(),
        };
        let handle = thread::spawn(move || tx.send(f(&sink)));

        let mut tick = 0usize;
        loop {
            if let Ok(state) = self.state.lock() {
                terminal
                    .draw(|frame| draw_ui(frame, &self.process, &state, tick))
                    .into_diagnostic()?;
            }

            match rx.try_recv() {
                Ok(result) => {
                    leave_screen()?;
                    handle.join().ok();
                    self.print_journal();
                    return result.map_err(miette::Report::new);
                }
                Err(TryRecvError::Disconnected) => {
                    leave_screen()?;
                    handle.join().ok();
                    self.print_journal();
                    return Err(miette::Report::msg("import worker stopped without a result"));
                }
                Err(TryRecvError::Empty) => {}
            }

            if event::poll(Duration::from_millis(120)).into_diagnostic()?
                && let Event::Key(key) = event::read().into_diagnostic()?
            {
                self.handle_key(key);
            }

            tick = tick.wrapping_add(1);
        }
    }

    fn handle_key(&self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc if !state.finished => state.closing = true,
            KeyCode::Tab | KeyCode::F(4) => {
                state.view = match state.view {
                    View::Progress => View::Journal,
                    View::Journal => View::Progress,
                };
            }
            _ => {}
        }
    }

    /// Warnings and errors again on stderr, the alternate screen is gone.
    fn print_journal(&self) {
        if let Ok(state) = self.state.lock() {
            for (time, entry) in &state.journal {
                if entry.severity != Severity::Debug {
                    eprintln!("[{time}] {:?}: {}", entry.severity, entry.message);
                }
            }
        }
    }
}

fn leave_screen() -> miette::Result<()> {
    disable_raw_mode().into_diagnostic()?;
    io::stdout().execute(LeaveAlternateScreen).into_diagnostic()?;
    Ok(())
}

fn draw_ui(frame: &mut ratatui::Frame, process: &str, state: &ImportState, tick: usize) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(2),
        ])
        .split(frame.area());

    frame.render_widget(draw_header(process, state, tick), chunks[0]);
    match state.view {
        View::Progress => {
            let main = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
                .split(chunks[1]);
            frame.render_widget(draw_status_panel(state), main[0]);
            frame.render_widget(draw_journal_panel(state, 6), main[1]);
        }
        View::Journal => frame.render_widget(draw_journal_panel(state, JOURNAL_MAX), chunks[1]),
    }
    frame.render_widget(draw_footer(), chunks[2]);
}

fn draw_header(process: &str, state: &ImportState, tick: usize) -> Paragraph<'static> {
    let hb = if tick % 2 == 0 { "*" } else { " " };
    let header_line = Line::from(vec![
        Span::styled(
            "METS-MIGRATE",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
        Span::styled(env!("CARGO_PKG_VERSION"), Style::default().fg(Color::Gray)),
        Span::raw("   Op: "),
        Span::styled("Import", Style::default().fg(Color::Cyan)),
        Span::raw("   "),
        Span::styled(hb, Style::default().fg(Color::Green)),
        Span::styled(
            if state.closing { "   finishing..." } else { "" },
            Style::default().fg(Color::Yellow),
        ),
    ]);
    let process_line = Line::from(vec![
        Span::styled("Process: ", Style::default().fg(Color::Gray)),
        Span::raw(process.to_string()),
        Span::styled(
            format!("   elapsed {:.1}s", state.started.elapsed().as_secs_f64()),
            Style::default().fg(Color::Gray),
        ),
    ]);
    Paragraph::new(vec![header_line, process_line])
        .alignment(Alignment::Left)
        .block(Block::default().borders(Borders::BOTTOM))
}

fn draw_status_panel(state: &ImportState) -> Paragraph<'static> {
    let progress = phase_progress(state.phase);
    let phase_color = if state.finished {
        Color::Green
    } else {
        Color::Cyan
    };
    let mut lines = vec![
        Line::from(Span::styled(
            "STATUS / PROGRESS",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(vec![
            Span::styled("Phase: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!("{:<9} ", state.phase.label()),
                Style::default().fg(phase_color),
            ),
            Span::raw(progress_bar(progress)),
            Span::raw(format!(" {progress:>3}%")),
        ]),
        Line::from(vec![
            Span::styled("Status: ", Style::default().fg(Color::Gray)),
            Span::raw(state.status.clone()),
        ]),
        Line::from(Span::styled("Recent events:", Style::default().fg(Color::Gray))),
    ];
    for event in state.events.iter().rev() {
        lines.push(Line::from(format!("- {event}")));
    }

    Paragraph::new(lines)
        .block(Block::default().borders(Borders::RIGHT))
        .wrap(Wrap { trim: true })
}

fn draw_journal_panel(state: &ImportState, visible: usize) -> Paragraph<'static> {
    let mut lines = vec![Line::from(Span::styled(
        "JOURNAL",
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    ))];
    let start = state.journal.len().saturating_sub(visible);
    for (time, entry) in state.journal.iter().skip(start) {
        lines.push(Line::from(vec![
            Span::styled(format!("{time} "), Style::default().fg(Color::Gray)),
            Span::styled(
                format!("{:<5} ", format!("{:?}", entry.severity)),
                Style::default().fg(severity_color(entry.severity)),
            ),
            Span::raw(entry.message.clone()),
        ]));
    }
    Paragraph::new(lines).wrap(Wrap { trim: true })
}

fn draw_footer() -> Paragraph<'static> {
    Paragraph::new(Line::from(Span::styled(
        "q/Esc close when done   Tab journal",
        Style::default().fg(Color::Gray),
    )))
    .block(Block::default().borders(Borders::TOP))
}

fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Debug => Color::Gray,
        Severity::Info => Color::Green,
        Severity::Warn => Color::Yellow,
        Severity::Error => Color::Red,
    }
}

fn phase_progress(phase: Phase) -> u8 {
    let last = Phase::ALL.len() - 1;
    ((phase.index() * 100) / last) as u8
}

fn progress_bar(percent: u8) -> String {
    let total = 10;
    let filled = (percent as usize * total) / 100;
    let mut out = String::from("[");
    for i in 0..total {
        out.push(if i < filled { '#' } else { '.' });
    }
    out.push(']');
    out
}

fn push_bounded<T>(buffer: &mut VecDeque<T>, item: T, max: usize) {
    buffer.push_back(item);
    while buffer.len() > max {
        buffer.pop_front();
    }
}

fn timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}
