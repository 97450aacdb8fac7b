use std::path::{Path, PathBuf};
use std::sync::{Arc, mpsc};

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;

use urlmark::model::cursor::Motion;
use urlmark::{
    ChannelHost, EngineConfig, RopeBuffer, SchedulerState, StyleChannel, Supervisor, TextBuffer,
    UrlEngine,
};

use crate::msg::Msg;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Normal,
    Insert,
}

impl Mode {
    fn label(self) -> &'static str {
        match self {
            Mode::Normal => "NORMAL",
            Mode::Insert => "INSERT",
        }
    }
}

pub struct App {
    host: Arc<ChannelHost<RopeBuffer>>,
    engine: UrlEngine,
    supervisor: Arc<Supervisor>,
    path: PathBuf,
    mode: Mode,
    suspended: bool,
    url_channel: StyleChannel,
    text_channel: StyleChannel,
    status: Option<String>,
    pub should_quit: bool,
}

impl App {
    /// Must run on the thread that will pump `Msg::Wake`: it becomes the
    /// buffer's owning thread.
    pub fn new(config: &EngineConfig, path: PathBuf, event_tx: mpsc::Sender<Msg>) -> Result<Self> {
        let buffer = if path.exists() {
            RopeBuffer::from_file(&path)?
        } else {
            RopeBuffer::new()
        };

        let wake_tx = event_tx.clone();
        let host = Arc::new(ChannelHost::new(buffer).with_waker(Arc::new(move || {
            let _ = wake_tx.send(Msg::Wake);
        })));

        let settings = config.settings()?;
        let supervisor = Supervisor::global();
        supervisor.set_background_scheduling(config.scheduler.background);

        let error_tx = event_tx;
        let engine = UrlEngine::builder(host.clone())
            .settings(settings.clone())
            .supervisor(supervisor.clone())
            .error_reporter(move |err| {
                let _ = error_tx.send(Msg::EngineError(err.to_string()));
            })
            .build()?;
        engine.mark_urls()?;

        Ok(Self {
            host,
            engine,
            supervisor,
            path,
            mode: Mode::Normal,
            suspended: false,
            url_channel: settings.url_channel,
            text_channel: settings.text_channel,
            status: None,
            should_quit: false,
        })
    }

    // ── MVU: Update ──────────────────────────────────────────────

    pub fn update(&mut self, msg: Msg) -> Result<()> {
        match msg {
            Msg::Key(key) => self.handle_key(key)?,
            Msg::Resize(_, height) => {
                self.host.buffer().viewport.height = height.saturating_sub(1);
                self.engine.notify_viewport_changed();
            }
            Msg::Wake => {
                self.host.pump();
            }
            Msg::EngineError(message) => {
                tracing::warn!("engine error: {message}");
                self.status = Some(message);
            }
            Msg::FileChanged(path) => self.handle_file_changed(&path)?,
            Msg::Tick => self.handle_tick()?,
        }
        Ok(())
    }

    /// Stops the engine and refuses jobs that arrive after the loop ends.
    pub fn shutdown(&mut self) -> Result<()> {
        self.engine.dispose()?;
        self.host.close();
        Ok(())
    }

    fn handle_key(&mut self, key: KeyEvent) -> Result<()> {
        match self.mode {
            Mode::Normal => self.handle_key_normal(key),
            Mode::Insert => self.handle_key_insert(key),
        }
    }

    fn handle_key_normal(&mut self, key: KeyEvent) -> Result<()> {
        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.should_quit = true;
            }
            KeyCode::Char('i') => self.mode = Mode::Insert,
            KeyCode::Char('b') => {
                let background = !self.supervisor.background_scheduling();
                self.supervisor.set_background_scheduling(background);
                self.status = Some(format!(
                    "background scheduling {}",
                    if background { "on" } else { "off (ticking)" }
                ));
            }
            KeyCode::Char('m') => {
                let outcome = self.engine.mark_urls()?;
                self.status = Some(format!("manual scan: {outcome:?}"));
            }
            KeyCode::Char('c') => {
                self.engine.clear_indicators()?;
                self.status = Some("indicators cleared".to_string());
            }
            KeyCode::Char('s') => {
                self.suspended = !self.suspended;
                if self.suspended {
                    self.engine.suspend();
                } else {
                    self.engine.resume();
                }
            }
            KeyCode::Char('v') => {
                let full_document = !self.engine.settings().full_document;
                self.engine.set_full_document(full_document)?;
                self.status = Some(format!(
                    "scanning {}",
                    if full_document { "whole document" } else { "visible lines" }
                ));
            }
            KeyCode::Enter => {
                self.status = self.link_under_cursor().map(|link| link.tidy_contents());
            }
            KeyCode::Char('h') | KeyCode::Left => self.move_cursor(Motion::Left),
            KeyCode::Char('j') | KeyCode::Down => self.move_cursor(Motion::Down),
            KeyCode::Char('k') | KeyCode::Up => self.move_cursor(Motion::Up),
            KeyCode::Char('l') | KeyCode::Right => self.move_cursor(Motion::Right),
            KeyCode::Char('0') | KeyCode::Home => self.move_cursor(Motion::LineStart),
            KeyCode::Char('$') | KeyCode::End => self.move_cursor(Motion::LineEnd),
            KeyCode::PageUp => self.move_cursor(Motion::PageUp),
            KeyCode::PageDown => self.move_cursor(Motion::PageDown),
            _ => {}
        }
        Ok(())
    }

    fn handle_key_insert(&mut self, key: KeyEvent) -> Result<()> {
        match key.code {
            KeyCode::Esc => self.mode = Mode::Normal,
            KeyCode::Char(ch) => self.insert_text(ch.encode_utf8(&mut [0; 4])),
            KeyCode::Enter => self.insert_text("\n"),
            KeyCode::Backspace => self.delete_before_cursor(),
            KeyCode::Left => self.move_cursor(Motion::Left),
            KeyCode::Right => self.move_cursor(Motion::Right),
            KeyCode::Up => self.move_cursor(Motion::Up),
            KeyCode::Down => self.move_cursor(Motion::Down),
            _ => {}
        }
        Ok(())
    }

    fn insert_text(&mut self, text: &str) {
        {
            let mut buffer = self.host.buffer();
            let offset = buffer.cursor_offset();
            buffer.insert_str(offset, text);
            if text == "\n" {
                let row = buffer.cursor.row + 1;
                buffer.cursor.move_to(row, 0);
            } else {
                let col = buffer.cursor.col + text.len();
                let row = buffer.cursor.row;
                buffer.cursor.move_to(row, col);
            }
            buffer.scroll_to_cursor();
        }
        self.engine.notify_text_changed();
    }

    fn delete_before_cursor(&mut self) {
        {
            let mut buffer = self.host.buffer();
            let offset = buffer.cursor_offset();
            if offset == 0 {
                return;
            }
            buffer.move_cursor(Motion::Left);
            if buffer.cursor_offset() == offset {
                // At a line start: join with the previous line.
                buffer.move_cursor(Motion::Up);
                buffer.move_cursor(Motion::LineEnd);
            }
            let start = buffer.cursor_offset();
            buffer.remove(start..offset);
        }
        self.engine.notify_text_changed();
    }

    fn move_cursor(&mut self, motion: Motion) {
        let scrolled = {
            let mut buffer = self.host.buffer();
            let prev_top = buffer.viewport.top_line;
            buffer.move_cursor(motion);
            buffer.viewport.top_line != prev_top
        };
        if scrolled {
            self.engine.notify_viewport_changed();
        }
    }

    fn handle_tick(&mut self) -> Result<()> {
        self.host.pump();
        // With the workers off, this loop drives the scans itself.
        if !self.supervisor.background_scheduling() {
            self.engine.tick()?;
        }
        Ok(())
    }

    fn handle_file_changed(&mut self, path: &Path) -> Result<()> {
        if !same_file_path(path, &self.path) || !path.exists() {
            return Ok(());
        }

        let text = std::fs::read_to_string(path)?;
        {
            let mut buffer = self.host.buffer();
            if buffer.rope == text.as_str() {
                return Ok(());
            }
            buffer.set_text(&text);
        }
        tracing::info!("reloaded {}", path.display());
        self.engine.notify_text_changed();
        Ok(())
    }

    fn link_under_cursor(&self) -> Option<urlmark::UrlMatch> {
        let offset = self.host.buffer().cursor_offset();
        self.engine.match_at(offset)
    }

    // ── MVU: View ────────────────────────────────────────────────

    pub fn view(&mut self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(1),    // body
                Constraint::Length(1), // status bar
            ])
            .split(frame.area());

        let editor_area = chunks[0];
        self.render_editor(frame, editor_area);

        let buffer = self.host.buffer();
        let cursor_x = buffer.cursor.col as u16 + editor_area.x;
        let cursor_y = buffer.cursor.row.saturating_sub(buffer.viewport.top_line) as u16 + editor_area.y;
        drop(buffer);
        if cursor_y < editor_area.y + editor_area.height {
            frame.set_cursor_position((cursor_x, cursor_y));
        }

        self.render_status_bar(frame, chunks[1]);
    }

    fn render_editor(&self, frame: &mut Frame, area: Rect) {
        let mut buffer = self.host.buffer();
        if buffer.viewport.height != area.height {
            buffer.viewport.height = area.height;
        }

        let top = buffer.viewport.top_line;
        let bottom = (top + area.height as usize).min(buffer.line_count());
        let lines: Vec<Line<'static>> = (top..bottom)
            .map(|i| {
                let text = buffer.line_text(i).unwrap_or_default();
                let start = buffer.line_start_offset(i);
                self.render_line(&buffer, &text, start)
            })
            .collect();
        drop(buffer);

        frame.render_widget(Paragraph::new(lines), area);
    }

    /// Splits a line into spans wherever the URL paint starts or stops.
    fn render_line(&self, buffer: &RopeBuffer, text: &str, line_start: usize) -> Line<'static> {
        let url_style = Style::default().add_modifier(Modifier::UNDERLINED);
        let text_style = Style::default().fg(Color::Cyan);

        let mut spans: Vec<Span<'static>> = Vec::new();
        let mut run = String::new();
        let mut run_style = Style::default();

        for (idx, ch) in text.char_indices() {
            let pos = line_start + idx;
            let mut style = Style::default();
            if buffer.styles.is_painted(self.url_channel, pos) {
                style = style.patch(url_style);
            }
            if buffer.styles.is_painted(self.text_channel, pos) {
                style = style.patch(text_style);
            }

            if style != run_style && !run.is_empty() {
                spans.push(Span::styled(std::mem::take(&mut run), run_style));
            }
            run_style = style;
            run.push(ch);
        }
        if !run.is_empty() {
            spans.push(Span::styled(run, run_style));
        }

        Line::from(spans)
    }

    fn render_status_bar(&self, frame: &mut Frame, area: Rect) {
        let mode_style = match self.mode {
            Mode::Normal => Style::default()
                .fg(Color::Black)
                .bg(Color::Magenta)
                .add_modifier(Modifier::BOLD),
            Mode::Insert => Style::default()
                .fg(Color::Black)
                .bg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        };
        let mode_span = Span::styled(format!(" {} ", self.mode.label()), mode_style);

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "[no name]".to_string());

        let (row, col) = {
            let buffer = self.host.buffer();
            (buffer.cursor.row, buffer.cursor.col)
        };

        let scheduler = match self.engine.scheduler_state() {
            SchedulerState::Idle => "tick",
            SchedulerState::Running => "bg",
            SchedulerState::Suspended => "paused",
            SchedulerState::Stopped => "stopped",
            SchedulerState::Abandoned => "stuck",
        };

        let mut suffix = format!(" | {scheduler} | {} links", self.engine.matches().len());
        if let Some(link) = self.link_under_cursor() {
            suffix.push_str(&format!(" | {}", link.human_readable_contents()));
        } else if let Some(status) = &self.status {
            suffix.push_str(&format!(" | {status}"));
        }

        let info = Span::styled(
            format!(" {file_name}  {}:{}{} ", row + 1, col + 1, suffix),
            Style::default().fg(Color::Gray).bg(Color::DarkGray),
        );

        let bar = Line::from(vec![mode_span, info]);
        let status = Paragraph::new(bar).style(Style::default().bg(Color::DarkGray));
        frame.render_widget(status, area);
    }
}

fn same_file_path(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }

    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
