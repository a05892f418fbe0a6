//! TUI application - key handling
//!
//! The App owns the AppState and turns key presses into state edits plus an
//! `Action` the runner carries out. It never renders.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tracing::{debug, trace};

use super::state::AppState;

/// What the runner should do after a key press
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    None,
    /// The input line changed; forward the full text
    InputChanged(String),
    /// Copy the last completed result
    Copy,
    /// Scan the project again
    Rescan,
    Quit,
}

#[derive(Debug, Default)]
pub struct App {
    state: AppState,
}

impl App {
    pub fn new() -> Self {
        debug!("App::new: called");
        Self { state: AppState::new() }
    }

    pub fn state(&self) -> &AppState {
        trace!("App::state: called");
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut AppState {
        trace!("App::state_mut: called");
        &mut self.state
    }

    /// Handle a key event
    pub fn handle_key(&mut self, key: KeyEvent) -> Action {
        debug!(?key, "App::handle_key: called");
        if key.kind == KeyEventKind::Release {
            return Action::None;
        }
        self.state.clear_note();

        if key.modifiers.contains(KeyModifiers::CONTROL) {
            return match key.code {
                KeyCode::Char('c') | KeyCode::Char('q') => self.quit(),
                KeyCode::Char('u') => {
                    debug!("App::handle_key: Ctrl-U - clear input");
                    self.state.input.clear();
                    self.state.cursor_pos = 0;
                    self.changed()
                }
                KeyCode::Char('y') => Action::Copy,
                KeyCode::Char('r') => Action::Rescan,
                _ => Action::None,
            };
        }

        match key.code {
            KeyCode::Esc => self.quit(),
            KeyCode::Char(c) => {
                self.state.input.insert(self.state.cursor_pos, c);
                self.state.cursor_pos += c.len_utf8();
                self.changed()
            }
            KeyCode::Backspace => {
                if self.state.cursor_pos == 0 {
                    return Action::None;
                }
                let new_pos = self.prev_char_boundary(self.state.cursor_pos);
                self.state.input.drain(new_pos..self.state.cursor_pos);
                self.state.cursor_pos = new_pos;
                self.changed()
            }
            KeyCode::Delete => {
                if self.state.cursor_pos >= self.state.input.len() {
                    return Action::None;
                }
                let end_pos = self.next_char_boundary(self.state.cursor_pos);
                self.state.input.drain(self.state.cursor_pos..end_pos);
                self.changed()
            }
            KeyCode::Left => {
                self.state.cursor_pos = self.prev_char_boundary(self.state.cursor_pos);
                Action::None
            }
            KeyCode::Right => {
                self.state.cursor_pos = self.next_char_boundary(self.state.cursor_pos);
                Action::None
            }
            KeyCode::Home => {
                self.state.cursor_pos = 0;
                Action::None
            }
            KeyCode::End => {
                self.state.cursor_pos = self.state.input.len();
                Action::None
            }
            _ => {
                trace!("App::handle_key: unhandled key");
                Action::None
            }
        }
    }

    fn quit(&mut self) -> Action {
        debug!("App::quit: called");
        self.state.should_quit = true;
        Action::Quit
    }

    fn changed(&self) -> Action {
        Action::InputChanged(self.state.input.clone())
    }

    fn prev_char_boundary(&self, pos: usize) -> usize {
        let input = &self.state.input;
        let mut new_pos = pos.saturating_sub(1);
        while new_pos > 0 && !input.is_char_boundary(new_pos) {
            new_pos -= 1;
        }
        new_pos
    }

    fn next_char_boundary(&self, pos: usize) -> usize {
        let input = &self.state.input;
        let mut new_pos = pos + 1;
        while new_pos < input.len() && !input.is_char_boundary(new_pos) {
            new_pos += 1;
        }
        new_pos.min(input.len())
    }
}
