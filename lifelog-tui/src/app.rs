//! Application state and event handling.
//!
//! Elm-style: one `App` owns every lane's state plus the shared window, key
//! handling mutates it and returns the load commands the worker should run.

use std::time::{Duration, Instant};

use chrono::Utc;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::api::{ApiCommand, ApiMessage};
use crate::range::{Range, Timestamp};
use crate::records::LaneShape;
use crate::resolution::{select_resolution, Resolution, Selection};
use crate::view::{Applied, LaneState};

/// Quiet period after the last keystroke before a search is sent
pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(300);
/// Fraction of the window moved by one pan step
const PAN_STEP: f64 = 0.25;
const ZOOM_STEP: f64 = 2.0;

/// Input mode for the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    /// Typing into the search box
    Searching,
}

/// Error popup state
#[derive(Debug, Clone)]
pub struct ErrorPopup {
    pub title: String,
    pub message: String,
    pub shown_at: Instant,
    /// Auto-dismiss duration (None for manual dismiss)
    pub auto_dismiss: Option<Duration>,
}

impl ErrorPopup {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            shown_at: Instant::now(),
            auto_dismiss: Some(Duration::from_secs(5)),
        }
    }

    pub fn should_dismiss(&self) -> bool {
        if let Some(duration) = self.auto_dismiss {
            self.shown_at.elapsed() > duration
        } else {
            false
        }
    }
}

/// Log entry for the message area
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: Instant,
    pub message: String,
    pub level: LogLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl LogEntry {
    fn with_level(message: impl Into<String>, level: LogLevel) -> Self {
        Self {
            timestamp: Instant::now(),
            message: message.into(),
            level,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::with_level(message, LogLevel::Info)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::with_level(message, LogLevel::Success)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::with_level(message, LogLevel::Warning)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::with_level(message, LogLevel::Error)
    }
}

/// Main application state
#[derive(Debug)]
pub struct App {
    pub should_quit: bool,
    pub input_mode: InputMode,

    /// Window shared by every lane
    pub window: Range,
    /// Width restored by `0`
    initial_width: chrono::Duration,

    pub lanes: Vec<LaneState>,
    pub selected_lane: usize,

    /// Search text the lanes were last loaded with
    pub search: String,
    /// Search text being typed
    pub search_input: String,
    /// When `search_input` last changed and has not been sent yet
    search_edited_at: Option<Instant>,

    pub error_popup: Option<ErrorPopup>,

    pub logs: Vec<LogEntry>,
    max_logs: usize,

    /// Frame counter for animations
    pub frame_count: u64,
    pub show_help: bool,
}

impl App {
    /// App showing `groups` over the `width` ending now
    pub fn new(groups: &[&str], width: chrono::Duration) -> Self {
        Self::at(groups, width, Utc::now())
    }

    pub fn at(groups: &[&str], width: chrono::Duration, now: Timestamp) -> Self {
        let mut app = Self {
            should_quit: false,
            input_mode: InputMode::Normal,
            window: Range::between(now - width, now),
            initial_width: width,
            lanes: groups.iter().map(|group| LaneState::new(*group)).collect(),
            selected_lane: 0,
            search: String::new(),
            search_input: String::new(),
            search_edited_at: None,
            error_popup: None,
            logs: Vec::new(),
            max_logs: 100,
            frame_count: 0,
            show_help: false,
        };

        app.log(LogEntry::info(format!("lifelog initialized with {} lanes", groups.len())));
        app
    }

    pub fn log(&mut self, entry: LogEntry) {
        self.logs.push(entry);
        if self.logs.len() > self.max_logs {
            self.logs.remove(0);
        }
    }

    pub fn show_error(&mut self, title: impl Into<String>, message: impl Into<String>) {
        let title = title.into();
        let message = message.into();
        self.log(LogEntry::error(format!("{}: {}", title, message)));
        self.error_popup = Some(ErrorPopup::new(title, message));
    }

    pub fn dismiss_error(&mut self) {
        self.error_popup = None;
    }

    /// Issue a fresh load for every lane, superseding anything in flight
    pub fn reload_all(&mut self) -> Vec<ApiCommand> {
        let window = self.window;
        let search = self.search.clone();
        self.lanes
            .iter_mut()
            .map(|lane| ApiCommand::Load(lane.request(window, &search)))
            .collect()
    }

    fn set_window(&mut self, window: Range) -> Vec<ApiCommand> {
        self.window = window;
        self.reload_all()
    }

    /// The resolution lanes with data over the whole window will use
    pub fn window_resolution(&self) -> Resolution {
        match select_resolution(self.window, self.window.start(), self.window.end()) {
            Selection::Fetch(resolution) => resolution,
            Selection::Empty => Resolution::Detail,
        }
    }

    /// Handle API messages
    pub fn handle_api_message(&mut self, message: ApiMessage) {
        match message {
            ApiMessage::Loaded(outcome) => {
                let group = outcome.request.group.clone();
                let errors = outcome.data.error_count();
                let count = outcome.data.records().len() - errors;
                let shape = outcome.data.shape();

                let Some(lane) = self.lanes.iter_mut().find(|lane| lane.group() == group) else {
                    return;
                };
                match lane.apply(outcome.request, outcome.data) {
                    Applied::Stale => {
                        tracing::trace!(%group, "dropped stale load");
                        return;
                    }
                    Applied::Rebuilt => {
                        let shape = match shape {
                            LaneShape::Timeline => "timeline",
                            LaneShape::Graph => "graph",
                        };
                        self.log(LogEntry::info(format!("{group}: showing {shape}")));
                    }
                    Applied::Updated => {}
                }

                if errors > 0 {
                    self.log(LogEntry::warning(format!(
                        "{group}: {errors} chunk(s) failed to load"
                    )));
                } else {
                    self.log(LogEntry::success(format!("{group}: {count} records")));
                }
            }
            ApiMessage::Failed { request, message } => {
                let Some(lane) = self.lanes.iter_mut().find(|lane| lane.group() == request.group) else {
                    return;
                };
                if lane.fail(&request) {
                    self.show_error(format!("{} failed", request.group), message);
                }
            }
        }
    }

    /// Handle key events and return the commands to send
    pub fn handle_key(&mut self, key: KeyEvent) -> Vec<ApiCommand> {
        if self.error_popup.is_some() {
            if matches!(key.code, KeyCode::Esc | KeyCode::Enter | KeyCode::Char(' ')) {
                self.dismiss_error();
            }
            return Vec::new();
        }

        if self.show_help {
            if matches!(key.code, KeyCode::Esc | KeyCode::Char('?') | KeyCode::Enter) {
                self.show_help = false;
            }
            return Vec::new();
        }

        match self.input_mode {
            InputMode::Normal => self.handle_normal_key(key),
            InputMode::Searching => self.handle_search_key(key),
        }
    }

    fn handle_normal_key(&mut self, key: KeyEvent) -> Vec<ApiCommand> {
        let large = key.modifiers.contains(KeyModifiers::SHIFT);
        let pan = if large { 1.0 } else { PAN_STEP };

        match key.code {
            KeyCode::Char('q') | KeyCode::Char('Q') => {
                self.should_quit = true;
                vec![ApiCommand::Shutdown]
            }
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.should_quit = true;
                vec![ApiCommand::Shutdown]
            }
            KeyCode::Char('?') => {
                self.show_help = true;
                Vec::new()
            }
            KeyCode::Char('/') => {
                self.input_mode = InputMode::Searching;
                self.search_input = self.search.clone();
                Vec::new()
            }
            KeyCode::Char('r') => {
                self.log(LogEntry::info("Reloading all lanes..."));
                self.reload_all()
            }
            KeyCode::Char('h') | KeyCode::Left | KeyCode::Char('H') => self.set_window(self.window.pan(-pan)),
            KeyCode::Char('l') | KeyCode::Right | KeyCode::Char('L') => self.set_window(self.window.pan(pan)),
            KeyCode::Char('+') | KeyCode::Char('=') => self.set_window(self.window.zoom(1.0 / ZOOM_STEP)),
            KeyCode::Char('-') => self.set_window(self.window.zoom(ZOOM_STEP)),
            KeyCode::Char('t') => {
                let now = Utc::now();
                let width = self.window.duration();
                self.set_window(Range::between(now - width, now))
            }
            KeyCode::Char('0') | KeyCode::Home => {
                let now = Utc::now();
                self.set_window(Range::between(now - self.initial_width, now))
            }
            KeyCode::Char('j') | KeyCode::Down => {
                if !self.lanes.is_empty() {
                    self.selected_lane = (self.selected_lane + 1) % self.lanes.len();
                }
                Vec::new()
            }
            KeyCode::Char('k') | KeyCode::Up => {
                if !self.lanes.is_empty() {
                    self.selected_lane = self
                        .selected_lane
                        .checked_sub(1)
                        .unwrap_or(self.lanes.len() - 1);
                }
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    fn handle_search_key(&mut self, key: KeyEvent) -> Vec<ApiCommand> {
        match key.code {
            KeyCode::Esc => {
                self.input_mode = InputMode::Normal;
                self.search_input = self.search.clone();
                self.search_edited_at = None;
                Vec::new()
            }
            KeyCode::Enter => {
                self.input_mode = InputMode::Normal;
                self.search_edited_at = None;
                self.apply_search()
            }
            KeyCode::Backspace => {
                self.search_input.pop();
                self.search_edited_at = Some(Instant::now());
                Vec::new()
            }
            KeyCode::Char(c) => {
                self.search_input.push(c);
                self.search_edited_at = Some(Instant::now());
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    fn apply_search(&mut self) -> Vec<ApiCommand> {
        if self.search_input == self.search {
            return Vec::new();
        }
        self.search = self.search_input.clone();
        self.log(LogEntry::info(if self.search.is_empty() {
            "Search cleared".to_string()
        } else {
            format!("Searching for '{}'", self.search)
        }));
        self.reload_all()
    }

    /// Advance animations and fire a debounced search once typing pauses
    pub fn tick(&mut self, now: Instant) -> Vec<ApiCommand> {
        self.frame_count = self.frame_count.wrapping_add(1);

        if let Some(ref popup) = self.error_popup {
            if popup.should_dismiss() {
                self.error_popup = None;
            }
        }

        match self.search_edited_at {
            Some(edited) if now.duration_since(edited) >= SEARCH_DEBOUNCE => {
                self.search_edited_at = None;
                self.apply_search()
            }
            _ => Vec::new(),
        }
    }

    /// Get the status bar text
    pub fn status_text(&self) -> String {
        let loading = self.lanes.iter().filter(|lane| lane.is_loading()).count();
        let loading = if loading > 0 {
            format!(" [Loading {loading}]")
        } else {
            String::new()
        };
        let search = if self.search.is_empty() {
            String::new()
        } else {
            format!(" | /{}", self.search)
        };

        format!(
            "{}{}{} | ?: Help | h/l: Pan | +/-: Zoom | /: Search | q: Quit",
            self.window_resolution(),
            loading,
            search
        )
    }
}
