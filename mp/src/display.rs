//! Display sinks
//!
//! The orchestrator publishes what the user should see through a
//! `DisplaySink`. Only updates for the current request id ever reach it.

use std::io::Write;

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::llm::ErrorKind;
use crate::session::SessionError;

/// Receives display updates from the orchestrator
pub trait DisplaySink: Send + Sync {
    /// New input arrived; the quiet period restarted
    fn input_changed(&self, _request_id: u64) {}

    /// The pending prompt was blank at expiry, nothing was sent
    fn idle(&self) {}

    /// Non-fatal side note, such as a failed clipboard copy
    fn note(&self, _message: &str) {}

    fn dispatched(&self, request_id: u64, prompt: &str);

    fn chunk(&self, request_id: u64, text: &str);

    fn completed(&self, request_id: u64, full_text: &str);

    fn failed(&self, request_id: u64, error: &SessionError);
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDisplay;

impl DisplaySink for NullDisplay {
    fn dispatched(&self, _request_id: u64, _prompt: &str) {}
    fn chunk(&self, _request_id: u64, _text: &str) {}
    fn completed(&self, _request_id: u64, _full_text: &str) {}
    fn failed(&self, _request_id: u64, _error: &SessionError) {}
}

/// One display update, as sent over a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayUpdate {
    Waiting { request_id: u64 },
    Idle,
    Dispatched { request_id: u64, prompt: String },
    Chunk { request_id: u64, text: String },
    Completed { request_id: u64, full_text: String },
    Failed { request_id: u64, kind: ErrorKind, message: String },
    Note(String),
}

/// Forwards updates to another task (the TUI, or a test)
#[derive(Debug, Clone)]
pub struct ChannelDisplay {
    tx: mpsc::UnboundedSender<DisplayUpdate>,
}

impl ChannelDisplay {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DisplayUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, update: DisplayUpdate) {
        if self.tx.send(update).is_err() {
            trace!("ChannelDisplay::send: receiver gone");
        }
    }
}

impl DisplaySink for ChannelDisplay {
    fn input_changed(&self, request_id: u64) {
        self.send(DisplayUpdate::Waiting { request_id });
    }

    fn idle(&self) {
        self.send(DisplayUpdate::Idle);
    }

    fn note(&self, message: &str) {
        self.send(DisplayUpdate::Note(message.to_string()));
    }

    fn dispatched(&self, request_id: u64, prompt: &str) {
        self.send(DisplayUpdate::Dispatched {
            request_id,
            prompt: prompt.to_string(),
        });
    }

    fn chunk(&self, request_id: u64, text: &str) {
        self.send(DisplayUpdate::Chunk {
            request_id,
            text: text.to_string(),
        });
    }

    fn completed(&self, request_id: u64, full_text: &str) {
        self.send(DisplayUpdate::Completed {
            request_id,
            full_text: full_text.to_string(),
        });
    }

    fn failed(&self, request_id: u64, error: &SessionError) {
        self.send(DisplayUpdate::Failed {
            request_id,
            kind: error.kind,
            message: error.message.clone(),
        });
    }
}

/// Streams chunks to stdout as they arrive (one-shot mode)
///
/// In quiet mode nothing is printed until the final text is known.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutDisplay {
    quiet: bool,
}

impl StdoutDisplay {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl DisplaySink for StdoutDisplay {
    fn dispatched(&self, request_id: u64, _prompt: &str) {
        debug!(request_id, "StdoutDisplay::dispatched: called");
        if !self.quiet {
            eprintln!("Enriching prompt...\n");
        }
    }

    fn note(&self, message: &str) {
        if !self.quiet {
            eprintln!("Note: {}", message);
        }
    }

    fn chunk(&self, _request_id: u64, text: &str) {
        if self.quiet {
            return;
        }
        let mut out = std::io::stdout().lock();
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }

    fn completed(&self, request_id: u64, full_text: &str) {
        debug!(request_id, len = full_text.len(), "StdoutDisplay::completed: called");
        if self.quiet {
            println!("{}", full_text);
        } else {
            println!();
        }
    }

    fn failed(&self, request_id: u64, error: &SessionError) {
        debug!(request_id, kind = %error.kind, "StdoutDisplay::failed: called");
        if !self.quiet {
            println!();
        }
        eprintln!("Error: {}", error.message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_display_forwards_in_order() {
        let (display, mut rx) = ChannelDisplay::new();
        display.input_changed(1);
        display.dispatched(1, "abc");
        display.chunk(1, "Hello");
        display.completed(1, "Hello");
        display.failed(
            2,
            &SessionError {
                kind: ErrorKind::RateLimited,
                message: "slow down".to_string(),
            },
        );

        assert_eq!(rx.try_recv().unwrap(), DisplayUpdate::Waiting { request_id: 1 });
        assert_eq!(
            rx.try_recv().unwrap(),
            DisplayUpdate::Dispatched {
                request_id: 1,
                prompt: "abc".to_string()
            }
        );
        assert!(matches!(rx.try_recv().unwrap(), DisplayUpdate::Chunk { .. }));
        assert!(matches!(rx.try_recv().unwrap(), DisplayUpdate::Completed { .. }));
        assert_eq!(
            rx.try_recv().unwrap(),
            DisplayUpdate::Failed {
                request_id: 2,
                kind: ErrorKind::RateLimited,
                message: "slow down".to_string()
            }
        );
    }

    #[test]
    fn test_channel_display_survives_closed_receiver() {
        let (display, rx) = ChannelDisplay::new();
        drop(rx);
        display.chunk(1, "ignored");
        display.idle();
    }
}
