//! TUI state
//!
//! Plain data the views render from. Display updates from the orchestrator
//! are folded in here; keys are handled by `App`.

use tracing::{debug, trace};

use crate::display::DisplayUpdate;

/// What the status line shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Scanning,
    Ready,
    Waiting,
    Enriching,
    Done,
    Error(String),
}

impl Status {
    pub fn label(&self) -> String {
        match self {
            Self::Scanning => "Scanning project...".to_string(),
            Self::Ready => "Ready".to_string(),
            Self::Waiting => "Waiting for you to stop typing...".to_string(),
            Self::Enriching => "Enriching...".to_string(),
            Self::Done => "Done".to_string(),
            Self::Error(message) => format!("Error: {}", message),
        }
    }
}

/// Everything the TUI draws
#[derive(Debug, Clone)]
pub struct AppState {
    /// Current input line
    pub input: String,

    /// Byte offset of the cursor in `input`
    pub cursor_pos: usize,

    /// Streamed output for the current request
    pub output: String,

    pub status: Status,

    /// Last fully completed enrichment, kept for copying
    pub last_result: Option<String>,

    /// One-line project summary once the scan is done
    pub project_summary: Option<String>,

    /// Transient message shown under the status line
    pub note: Option<String>,

    pub should_quit: bool,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    pub fn new() -> Self {
        debug!("AppState::new: called");
        Self {
            input: String::new(),
            cursor_pos: 0,
            output: String::new(),
            status: Status::Scanning,
            last_result: None,
            project_summary: None,
            note: None,
            should_quit: false,
        }
    }

    /// Fold one orchestrator update into the state
    pub fn apply(&mut self, update: DisplayUpdate) {
        trace!(?update, "AppState::apply: called");
        match update {
            DisplayUpdate::Waiting { .. } => {
                self.status = Status::Waiting;
            }
            DisplayUpdate::Idle => {
                self.output.clear();
                self.status = Status::Ready;
            }
            DisplayUpdate::Dispatched { .. } => {
                self.output.clear();
                self.status = Status::Enriching;
            }
            DisplayUpdate::Chunk { text, .. } => {
                self.output.push_str(&text);
            }
            DisplayUpdate::Completed { full_text, .. } => {
                self.output = full_text.clone();
                self.last_result = Some(full_text);
                self.status = Status::Done;
            }
            DisplayUpdate::Failed { kind, message, .. } => {
                self.status = Status::Error(format!("{} ({})", message, kind));
            }
            DisplayUpdate::Note(message) => {
                self.note = Some(message);
            }
        }
    }

    /// Record a failed scan; returns true when it leaves nothing to enrich against
    pub fn scan_failed(&mut self, message: &str) -> bool {
        debug!(%message, "AppState::scan_failed: called");
        if self.project_summary.is_none() {
            self.status = Status::Error(message.to_string());
            self.should_quit = true;
            return true;
        }
        self.note = Some(format!("Rescan failed: {}", message));
        false
    }

    pub fn clear_note(&mut self) {
        self.note = None;
    }
}
