//! Output sinks for finished enrichments

use std::io::Write;
use std::process::{Command, Stdio};

use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("No clipboard tool available (tried pbcopy, wl-copy, xclip, xsel)")]
    NoClipboard,

    #[error("Clipboard I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Receives the final text of every completed enrichment
pub trait OutputSink: Send + Sync {
    fn export(&self, text: &str) -> Result<(), OutputError>;
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullOutput;

impl OutputSink for NullOutput {
    fn export(&self, _text: &str) -> Result<(), OutputError> {
        Ok(())
    }
}

/// Copies text to the system clipboard through the first tool that works
#[derive(Debug, Clone)]
pub struct ClipboardOutput {
    candidates: Vec<(String, Vec<String>)>,
}

impl Default for ClipboardOutput {
    fn default() -> Self {
        let candidates: [(&str, &[&str]); 4] = [
            ("pbcopy", &[]),
            ("wl-copy", &[]),
            ("xclip", &["-selection", "clipboard"]),
            ("xsel", &["--clipboard", "--input"]),
        ];
        Self::with_candidates(candidates.iter().map(|(p, a)| (*p, a.to_vec())))
    }
}

impl ClipboardOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom list of (program, args) to try in order
    pub fn with_candidates<'a, I>(candidates: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, Vec<&'a str>)>,
    {
        Self {
            candidates: candidates
                .into_iter()
                .map(|(p, args)| (p.to_string(), args.into_iter().map(str::to_string).collect()))
                .collect(),
        }
    }

    fn try_program(program: &str, args: &[String], text: &str) -> Result<bool, OutputError> {
        let mut child = match Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                debug!(%program, error = %e, "ClipboardOutput: not available");
                return Ok(false);
            }
        };
        // Closing stdin at the end of this block lets the tool see EOF
        let written = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(text.as_bytes()),
            None => Ok(()),
        };
        let status = child.wait()?;
        written?;
        Ok(status.success())
    }
}

impl OutputSink for ClipboardOutput {
    fn export(&self, text: &str) -> Result<(), OutputError> {
        debug!(len = text.len(), "ClipboardOutput::export: called");
        for (program, args) in &self.candidates {
            match Self::try_program(program, args, text) {
                Ok(true) => {
                    debug!(%program, "ClipboardOutput::export: copied");
                    return Ok(());
                }
                Ok(false) => continue,
                Err(e) => warn!(%program, error = %e, "ClipboardOutput::export: tool failed"),
            }
        }
        Err(OutputError::NoClipboard)
    }
}
