//! TUI runner - main event loop
//!
//! Owns the terminal, the App, and a handle on the orchestrator. Key presses
//! become orchestrator input; display updates come back over a channel and
//! are folded into the state before the next draw.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use eyre::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::Tui;
use super::app::{Action, App};
use super::events::{Event, EventHandler};
use super::state::Status;
use super::views;
use crate::config::ScanConfig;
use crate::display::{ChannelDisplay, DisplayUpdate};
use crate::llm::CompletionClient;
use crate::orchestrator::{Orchestrator, OrchestratorHandle, OrchestratorState};
use crate::output::{ClipboardOutput, NullOutput, OutputSink};
use crate::progress::NullSink;
use crate::prompts::PromptComposer;
use crate::scanner::{self, Context, ScanError};
use crate::session::SessionOptions;

const TICK_RATE: Duration = Duration::from_millis(100);

/// Everything the interactive mode needs to start
pub struct TuiParams {
    pub client: Arc<dyn CompletionClient>,
    pub composer: Arc<PromptComposer>,
    pub root: PathBuf,
    pub scan: ScanConfig,
    pub options: SessionOptions,
    pub debounce: Duration,
}

pub struct TuiRunner {
    terminal: Tui,
    app: App,
    handle: OrchestratorHandle,
    orchestrator: Option<JoinHandle<OrchestratorState>>,
    display_rx: mpsc::UnboundedReceiver<DisplayUpdate>,
    scan_tx: mpsc::UnboundedSender<Result<Context, ScanError>>,
    scan_rx: mpsc::UnboundedReceiver<Result<Context, ScanError>>,
    root: PathBuf,
    scan: ScanConfig,
    clipboard: ClipboardOutput,
    scan_failure: Option<ScanError>,
}

impl TuiRunner {
    pub fn new(terminal: Tui, params: TuiParams) -> Self {
        debug!(root = %params.root.display(), "TuiRunner::new: called");
        let (display, display_rx) = ChannelDisplay::new();
        let output: Arc<dyn OutputSink> = Arc::new(NullOutput);
        let (orchestrator, handle) =
            Orchestrator::new(params.client, params.composer, params.options, params.debounce);
        let orchestrator = orchestrator
            .with_display(Arc::new(display))
            .with_output(output)
            .spawn();
        let (scan_tx, scan_rx) = mpsc::unbounded_channel();

        Self {
            terminal,
            app: App::new(),
            handle,
            orchestrator: Some(orchestrator),
            display_rx,
            scan_tx,
            scan_rx,
            root: params.root,
            scan: params.scan,
            clipboard: ClipboardOutput::new(),
            scan_failure: None,
        }
    }

    /// Run until the user quits
    ///
    /// A failed first scan ends the loop and is returned as the error.
    pub async fn run(&mut self) -> Result<()> {
        info!("TuiRunner::run: started");
        let mut events = EventHandler::new(TICK_RATE);
        self.start_scan();

        while !self.app.state().should_quit {
            self.terminal.draw(|frame| views::render(self.app.state(), frame))?;

            tokio::select! {
                event = events.next() => self.handle_event(event?),
                Some(update) = self.display_rx.recv() => self.app.state_mut().apply(update),
                Some(result) = self.scan_rx.recv() => self.handle_scan(result),
            }
        }

        self.shutdown().await;
        info!("TuiRunner::run: finished");
        match self.scan_failure.take() {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Key(key) => match self.app.handle_key(key) {
                Action::InputChanged(text) => {
                    self.handle.input_changed(text);
                }
                Action::Copy => self.copy_last_result(),
                Action::Rescan => self.start_scan(),
                Action::Quit => debug!("TuiRunner::handle_event: quit requested"),
                Action::None => {}
            },
            Event::Resize(w, h) => debug!(w, h, "TuiRunner::handle_event: resize"),
            Event::Tick => {}
        }
    }

    /// Scan the project on a blocking thread; the result arrives on `scan_rx`
    fn start_scan(&mut self) {
        debug!(root = %self.root.display(), "TuiRunner::start_scan: called");
        if self.app.state().project_summary.is_none() {
            self.app.state_mut().status = Status::Scanning;
        } else {
            self.app.state_mut().note = Some("Rescanning project...".to_string());
        }

        let root = self.root.clone();
        let ignore = self.scan.ignore_rules();
        let limits = self.scan.limits();
        let tx = self.scan_tx.clone();
        tokio::task::spawn_blocking(move || {
            let result = scanner::scan(&root, &ignore, &limits, &NullSink);
            if tx.send(result).is_err() {
                debug!("TuiRunner::start_scan: runner gone before scan finished");
            }
        });
    }

    fn handle_scan(&mut self, result: Result<Context, ScanError>) {
        match result {
            Ok(context) => {
                let summary = format!(
                    "{} - {} files, {} signatures{}",
                    context.root_path().display(),
                    context.total_files(),
                    context.signatures().len(),
                    if context.truncated() { " (truncated)" } else { "" }
                );
                info!(%summary, "TuiRunner::handle_scan: context ready");
                let state = self.app.state_mut();
                state.project_summary = Some(summary);
                if state.status == Status::Scanning {
                    state.status = Status::Ready;
                }
                self.handle.update_context(Arc::new(context));
            }
            Err(e) => {
                warn!(error = %e, "TuiRunner::handle_scan: scan failed");
                if self.app.state_mut().scan_failed(&e.to_string()) {
                    self.scan_failure = Some(e);
                }
            }
        }
    }

    fn copy_last_result(&mut self) {
        let Some(text) = self.app.state().last_result.clone() else {
            self.app.state_mut().note = Some("Nothing to copy yet".to_string());
            return;
        };
        let note = match self.clipboard.export(&text) {
            Ok(()) => "Copied to clipboard".to_string(),
            Err(e) => e.to_string(),
        };
        self.app.state_mut().note = Some(note);
    }

    async fn shutdown(&mut self) {
        debug!("TuiRunner::shutdown: called");
        self.handle.shutdown();
        if let Some(task) = self.orchestrator.take()
            && let Err(e) = task.await
        {
            warn!(error = %e, "TuiRunner::shutdown: orchestrator task failed");
        }
    }
}
