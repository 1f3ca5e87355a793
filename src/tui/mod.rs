//! Terminal client
//!
//! Browse the imported methods, build the automation queue, run it and watch
//! the transcript as steps complete.

use crate::automation::{RunState, SharedSequencer, StepStatus};
use crate::config::SharedConfig;
use crate::transcript::{LogLevel, SharedTranscript};
use crate::workspace::SharedWorkspace;
use anyhow::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use std::io;
use tokio::time::Duration;

/// Pane that receives selection keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
    Methods,
    Queue,
}

/// TUI application state
pub struct TuiApp {
    config: SharedConfig,
    workspace: SharedWorkspace,
    sequencer: SharedSequencer,
    transcript: SharedTranscript,
    should_quit: bool,
    focus: Focus,
    methods: ListState,
    queue: ListState,
    /// Rendered method keys, refreshed every frame
    method_keys: Vec<String>,
    status_message: String,
}

impl TuiApp {
    pub fn new(
        config: SharedConfig,
        workspace: SharedWorkspace,
        sequencer: SharedSequencer,
        transcript: SharedTranscript,
    ) -> Self {
        let mut app = Self {
            config,
            workspace,
            sequencer,
            transcript,
            should_quit: false,
            focus: Focus::Methods,
            methods: ListState::default(),
            queue: ListState::default(),
            method_keys: Vec::new(),
            status_message: "Press 'h' for help, 'q' to quit".to_string(),
        };
        app.update_data();
        app
    }

    /// Run the TUI application
    pub async fn run(&mut self) -> Result<()> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let result = self.run_app(&mut terminal).await;

        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;
        terminal.show_cursor()?;

        result
    }

    async fn run_app<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<()> {
        loop {
            self.update_data();

            terminal.draw(|f| self.ui(f))?;

            if event::poll(Duration::from_millis(100))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key(key.code);
                    }
                }
            }

            if self.should_quit {
                break;
            }
        }

        Ok(())
    }

    fn handle_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('h') => {
                self.status_message = "Tab=switch pane, ↑/↓=select, Enter=send, a=add, d=remove, K/J=move, A=add all, r=run, s=stop, c=clear, e=export, q=quit".to_string();
            }
            KeyCode::Tab => {
                self.focus = match self.focus {
                    Focus::Methods => Focus::Queue,
                    Focus::Queue => Focus::Methods,
                };
            }
            KeyCode::Up => self.select(-1),
            KeyCode::Down => self.select(1),
            KeyCode::Enter => self.send_selected(),
            KeyCode::Char('a') => self.add_selected(),
            KeyCode::Char('d') => self.remove_selected(),
            KeyCode::Char('K') => self.move_selected(true),
            KeyCode::Char('J') => self.move_selected(false),
            KeyCode::Char('A') => {
                self.status_message = match self.workspace.write().enqueue_all() {
                    Ok(added) => format!("Added {} methods", added),
                    Err(e) => e.to_string(),
                };
            }
            KeyCode::Char('r') => self.start_run(),
            KeyCode::Char('s') => {
                self.status_message = if self.sequencer.stop() {
                    "Stopping after the current step".to_string()
                } else {
                    "No automation running".to_string()
                };
            }
            KeyCode::Char('c') => {
                self.transcript.clear();
                self.status_message = "Transcript cleared".to_string();
            }
            KeyCode::Char('e') => {
                let path = format!("transcript-{}.txt", chrono::Local::now().format("%Y%m%d-%H%M%S"));
                self.status_message = match self.transcript.export_file(&path) {
                    Ok(()) => format!("Transcript exported to {}", path),
                    Err(e) => format!("Export failed: {}", e),
                };
            }
            _ => {}
        }
    }

    fn update_data(&mut self) {
        let ws = self.workspace.read();
        self.method_keys = ws
            .store()
            .catalog()
            .keys()
            .iter()
            .map(ToString::to_string)
            .collect();
        let queue_len = ws.queue().len();
        drop(ws);

        clamp(&mut self.methods, self.method_keys.len());
        clamp(&mut self.queue, queue_len);
    }

    fn select(&mut self, delta: isize) {
        let (state, len) = match self.focus {
            Focus::Methods => (&mut self.methods, self.method_keys.len()),
            Focus::Queue => (&mut self.queue, self.workspace.read().queue().len()),
        };
        if len == 0 {
            return;
        }
        let current = state.selected().unwrap_or(0) as isize;
        let next = (current + delta).clamp(0, len as isize - 1);
        state.select(Some(next as usize));
    }

    fn selected_method(&self) -> Option<&str> {
        self.methods
            .selected()
            .and_then(|i| self.method_keys.get(i))
            .map(String::as_str)
    }

    fn add_selected(&mut self) {
        let Some(raw) = self.selected_method().map(str::to_string) else {
            self.status_message = "Select a method first".to_string();
            return;
        };
        let mut ws = self.workspace.write();
        self.status_message = match ws.key(&raw).and_then(|key| ws.enqueue(&key)) {
            Ok(()) => format!("Added {}", raw),
            Err(e) => e.to_string(),
        };
    }

    fn remove_selected(&mut self) {
        let Some(index) = self.queue.selected() else {
            self.status_message = "Select a queued method first".to_string();
            return;
        };
        self.status_message = match self.workspace.write().dequeue(index) {
            Ok(key) => format!("Removed {}", key),
            Err(e) => e.to_string(),
        };
    }

    fn move_selected(&mut self, up: bool) {
        let Some(index) = self.queue.selected() else {
            return;
        };
        let mut ws = self.workspace.write();
        let moved = if up {
            ws.queue_mut().move_up(index)
        } else {
            ws.queue_mut().move_down(index)
        };
        if let Ok(new_index) = moved {
            self.queue.select(Some(new_index));
        }
    }

    fn start_run(&mut self) {
        if self.sequencer.is_running() {
            self.status_message = "Automation already running".to_string();
            return;
        }
        let sequencer = self.sequencer.clone();
        tokio::spawn(async move {
            if let Err(e) = sequencer.run().await {
                tracing::warn!(error = %e, "Automation did not start");
            }
        });
        self.status_message = "Automation started".to_string();
    }

    fn send_selected(&mut self) {
        let Some(raw) = self.selected_method().map(str::to_string) else {
            return;
        };
        let key = match self.workspace.read().key(&raw) {
            Ok(key) => key,
            Err(e) => {
                self.status_message = e.to_string();
                return;
            }
        };
        let sequencer = self.sequencer.clone();
        tokio::spawn(async move {
            if let Err(e) = sequencer.send(&key).await {
                tracing::warn!(error = %e, "Send failed");
            }
        });
        self.status_message = format!("Sending {}", raw);
    }

    fn ui(&mut self, f: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .margin(1)
            .constraints([
                Constraint::Length(3), // Header
                Constraint::Length(3), // Run stats
                Constraint::Min(10),   // Methods and queue
                Constraint::Length(12), // Transcript
                Constraint::Length(3), // Status bar
            ])
            .split(f.size());

        self.draw_header(f, chunks[0]);
        self.draw_stats(f, chunks[1]);
        self.draw_lists(f, chunks[2]);
        self.draw_transcript(f, chunks[3]);
        self.draw_status_bar(f, chunks[4]);
    }

    fn draw_header(&self, f: &mut Frame, area: Rect) {
        let config = self.config.get();
        let ws = self.workspace.read();
        let title = format!(
            " API Automate | {} methods in {} categories | step delay {} ms ",
            ws.store().catalog().len(),
            ws.store().catalog().category_count(),
            config.automation.step_delay_ms
        );

        let header = Paragraph::new(title)
            .style(
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            )
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL));
        f.render_widget(header, area);
    }

    fn draw_stats(&self, f: &mut Frame, area: Rect) {
        let summary = self.transcript.summary();
        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(area);

        let success_rate = if summary.total_requests > 0 {
            summary.successful_requests as f64 / summary.total_requests as f64
        } else {
            0.0
        };
        let gauge = Gauge::default()
            .block(Block::default().borders(Borders::ALL).title("Success Rate"))
            .gauge_style(Style::default().fg(Color::Green))
            .ratio(success_rate)
            .label(format!(
                "{}/{} ({:.0}%)",
                summary.successful_requests,
                summary.total_requests,
                success_rate * 100.0
            ));
        f.render_widget(gauge, chunks[0]);

        let latency = Paragraph::new(Line::from(vec![
            Span::styled(
                format!("{:.1} ms", summary.avg_latency_ms),
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!("  (min {:.1} / max {:.1})", summary.min_latency_ms, summary.max_latency_ms),
                Style::default().fg(Color::Gray),
            ),
        ]))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL).title("Avg Latency"));
        f.render_widget(latency, chunks[1]);
    }

    fn draw_lists(&mut self, f: &mut Frame, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
            .split(area);

        let items: Vec<ListItem> = self
            .method_keys
            .iter()
            .map(|key| ListItem::new(key.clone()))
            .collect();
        let methods = List::new(items)
            .block(pane("Methods", self.focus == Focus::Methods))
            .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
        f.render_stateful_widget(methods, chunks[0], &mut self.methods);

        let queue_items: Vec<ListItem> = self
            .workspace
            .read()
            .queue()
            .entries()
            .iter()
            .map(|entry| {
                let color = match entry.status {
                    StepStatus::Pending => Color::White,
                    StepStatus::Success => Color::Green,
                    StepStatus::Failure => Color::Red,
                };
                ListItem::new(entry.label()).style(Style::default().fg(color))
            })
            .collect();
        let queue = List::new(queue_items)
            .block(pane("Automation Queue", self.focus == Focus::Queue))
            .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
        f.render_stateful_widget(queue, chunks[1], &mut self.queue);
    }

    fn draw_transcript(&self, f: &mut Frame, area: Rect) {
        let visible = area.height.saturating_sub(2) as usize;
        let items: Vec<ListItem> = self
            .transcript
            .recent(visible)
            .iter()
            .map(|entry| {
                let color = match entry.level {
                    LogLevel::Info => Color::Gray,
                    LogLevel::Success => Color::Green,
                    LogLevel::Warning => Color::Yellow,
                    LogLevel::Error => Color::Red,
                };
                let first_line = entry.render().lines().next().unwrap_or_default().to_string();
                ListItem::new(first_line).style(Style::default().fg(color))
            })
            .collect();

        let list = List::new(items).block(Block::default().borders(Borders::ALL).title("Transcript"));
        f.render_widget(list, area);
    }

    fn draw_status_bar(&self, f: &mut Frame, area: Rect) {
        let state = self.sequencer.state();
        let color = match state {
            RunState::Running => Color::Green,
            RunState::Stopping => Color::Yellow,
            RunState::Idle | RunState::Completed => Color::White,
        };

        let status = Paragraph::new(Line::from(vec![
            Span::raw(format!("{} | ", self.status_message)),
            Span::styled(format!("Automation: {}", state), Style::default().fg(color)),
        ]))
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("Status"));
        f.render_widget(status, area);
    }
}

fn pane(title: &str, focused: bool) -> Block<'_> {
    let style = if focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    };
    Block::default()
        .borders(Borders::ALL)
        .border_style(style)
        .title(title)
}

/// Keep a list selection inside `len` items
fn clamp(state: &mut ListState, len: usize) {
    match state.selected() {
        _ if len == 0 => state.select(None),
        None => state.select(Some(0)),
        Some(i) if i >= len => state.select(Some(len - 1)),
        Some(_) => {}
    }
}
