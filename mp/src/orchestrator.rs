//! Debounce/Cancellation Orchestrator
//!
//! A single control loop owns all orchestrator state and processes one inbound
//! event queue: prompt edits from the front-end, session reports, and its own
//! quiet-period timer. Sessions run concurrently and only ever talk back through
//! that queue. The request id is the one authority on which session's output
//! may reach the display.
//!
//! ```text
//!  InputChanged ──► AwaitingQuietPeriod ──(quiet)──► Dispatched ──► Idle
//!        ▲                  │  ▲                         │
//!        └──────────────────┘  └──── InputChanged ───────┘ (cancels session)
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::display::{DisplaySink, NullDisplay};
use crate::llm::{CompletionClient, ErrorKind};
use crate::output::{NullOutput, OutputSink};
use crate::prompts::PromptComposer;
use crate::scanner::Context;
use crate::session::{self, SessionError, SessionEvent, SessionHandle, SessionOptions};

/// Quiet-period bounds, in milliseconds
pub const MIN_DEBOUNCE_MS: u64 = 100;
pub const MAX_DEBOUNCE_MS: u64 = 5000;
pub const DEFAULT_DEBOUNCE_MS: u64 = 800;

/// Clamp a user-supplied quiet period into the supported range
pub fn clamp_debounce_ms(ms: u64) -> u64 {
    ms.clamp(MIN_DEBOUNCE_MS, MAX_DEBOUNCE_MS)
}

/// Everything the control loop reacts to
#[derive(Debug, Clone)]
pub enum OrchestratorEvent {
    /// The prompt text changed
    InputChanged(String),
    /// The quiet period armed for this request id ran out
    QuietPeriodElapsed(u64),
    /// A fresh project scan is available
    ContextUpdated(Arc<Context>),
    /// Report from a session
    Session(SessionEvent),
    /// Stop the loop, cancelling any in-flight session
    Shutdown,
}

impl From<SessionEvent> for OrchestratorEvent {
    fn from(event: SessionEvent) -> Self {
        OrchestratorEvent::Session(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AwaitingQuietPeriod,
    Dispatched,
    /// Final: the loop has stopped
    Superseded,
}

/// Terminal result of one dispatched request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub request_id: u64,
    pub result: Result<String, SessionError>,
}

/// Snapshot of orchestrator state, published after every event
#[derive(Debug, Clone)]
pub struct OrchestratorState {
    pub phase: Phase,
    pub current_request_id: u64,
    /// Latest raw input not yet dispatched
    pub pending_prompt: Option<String>,
    /// Request id of the session in flight, if any
    pub active_session: Option<u64>,
    pub last_dispatch_time: Option<Instant>,
    /// Sessions started so far
    pub dispatch_count: u64,
    pub last_outcome: Option<Outcome>,
}

impl Default for OrchestratorState {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            current_request_id: 0,
            pending_prompt: None,
            active_session: None,
            last_dispatch_time: None,
            dispatch_count: 0,
            last_outcome: None,
        }
    }
}

/// Front-end side of the orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorHandle {
    tx: mpsc::UnboundedSender<OrchestratorEvent>,
    state: watch::Receiver<OrchestratorState>,
}

impl OrchestratorHandle {
    fn send(&self, event: OrchestratorEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    /// Report new prompt text; false once the loop has stopped
    pub fn input_changed(&self, text: impl Into<String>) -> bool {
        self.send(OrchestratorEvent::InputChanged(text.into()))
    }

    /// End the quiet period for `request_id` early
    pub fn quiet_period_elapsed(&self, request_id: u64) -> bool {
        self.send(OrchestratorEvent::QuietPeriodElapsed(request_id))
    }

    pub fn update_context(&self, context: Arc<Context>) -> bool {
        self.send(OrchestratorEvent::ContextUpdated(context))
    }

    pub fn shutdown(&self) -> bool {
        self.send(OrchestratorEvent::Shutdown)
    }

    pub fn state(&self) -> OrchestratorState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<OrchestratorState> {
        self.state.clone()
    }

    /// Wait until the published state satisfies `pred`
    ///
    /// Returns None if the loop went away first.
    pub async fn wait_until<F>(&self, mut pred: F) -> Option<OrchestratorState>
    where
        F: FnMut(&OrchestratorState) -> bool,
    {
        let mut rx = self.state.clone();
        rx.wait_for(|s| pred(s)).await.ok().map(|s| s.clone())
    }
}

/// The control loop and the state it alone writes
pub struct Orchestrator {
    client: Arc<dyn CompletionClient>,
    composer: Arc<PromptComposer>,
    context: Option<Arc<Context>>,
    options: SessionOptions,
    debounce: Duration,
    display: Arc<dyn DisplaySink>,
    output: Arc<dyn OutputSink>,

    rx: mpsc::UnboundedReceiver<OrchestratorEvent>,
    // Weak so the queue closes once every front-end handle is gone
    session_tx: mpsc::WeakUnboundedSender<OrchestratorEvent>,
    state_tx: watch::Sender<OrchestratorState>,

    phase: Phase,
    current_request_id: u64,
    pending_prompt: Option<String>,
    active_session: Option<SessionHandle>,
    last_dispatch_time: Option<Instant>,
    dispatch_count: u64,
    last_outcome: Option<Outcome>,
    deadline: Option<Instant>,
}

impl Orchestrator {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        composer: Arc<PromptComposer>,
        options: SessionOptions,
        debounce: Duration,
    ) -> (Self, OrchestratorHandle) {
        debug!(debounce_ms = debounce.as_millis() as u64, "Orchestrator::new: called");
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(OrchestratorState::default());

        let orchestrator = Self {
            client,
            composer,
            context: None,
            options,
            debounce,
            display: Arc::new(NullDisplay),
            output: Arc::new(NullOutput),
            rx,
            session_tx: tx.downgrade(),
            state_tx,
            phase: Phase::Idle,
            current_request_id: 0,
            pending_prompt: None,
            active_session: None,
            last_dispatch_time: None,
            dispatch_count: 0,
            last_outcome: None,
            deadline: None,
        };
        let handle = OrchestratorHandle { tx, state: state_rx };
        (orchestrator, handle)
    }

    pub fn with_context(mut self, context: Arc<Context>) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_display(mut self, display: Arc<dyn DisplaySink>) -> Self {
        self.display = display;
        self
    }

    pub fn with_output(mut self, output: Arc<dyn OutputSink>) -> Self {
        self.output = output;
        self
    }

    pub fn spawn(self) -> JoinHandle<OrchestratorState> {
        tokio::spawn(self.run())
    }

    /// Process events until shutdown or until every handle is dropped
    pub async fn run(mut self) -> OrchestratorState {
        info!("Orchestrator::run: started");
        loop {
            let event = match self.deadline {
                Some(deadline) => {
                    let armed_for = self.current_request_id;
                    tokio::select! {
                        biased;
                        event = self.rx.recv() => event,
                        _ = tokio::time::sleep_until(deadline) => Some(OrchestratorEvent::QuietPeriodElapsed(armed_for)),
                    }
                }
                None => self.rx.recv().await,
            };

            let Some(event) = event else {
                debug!("Orchestrator::run: input closed");
                self.supersede();
                break;
            };

            let keep_going = self.handle_event(event).await;
            self.publish();
            if !keep_going {
                break;
            }
        }
        info!(requests = self.current_request_id, dispatched = self.dispatch_count, "Orchestrator::run: stopped");
        self.publish();
        self.snapshot()
    }

    async fn handle_event(&mut self, event: OrchestratorEvent) -> bool {
        match event {
            OrchestratorEvent::InputChanged(text) => self.on_input_changed(text),
            OrchestratorEvent::QuietPeriodElapsed(request_id) => self.on_quiet_period_elapsed(request_id),
            OrchestratorEvent::ContextUpdated(context) => self.on_context_updated(context),
            OrchestratorEvent::Session(event) => self.on_session_event(event).await,
            OrchestratorEvent::Shutdown => {
                debug!("handle_event: shutdown requested");
                self.supersede();
                return false;
            }
        }
        true
    }

    fn on_input_changed(&mut self, text: String) {
        self.current_request_id += 1;
        debug!(request_id = self.current_request_id, len = text.len(), "on_input_changed: called");

        if let Some(session) = self.active_session.take() {
            debug!(old = session.request_id(), "on_input_changed: cancelling in-flight session");
            session.cancel();
        }

        self.pending_prompt = Some(text);
        self.deadline = Some(Instant::now() + self.debounce);
        self.phase = Phase::AwaitingQuietPeriod;
        self.display.input_changed(self.current_request_id);
    }

    fn on_quiet_period_elapsed(&mut self, request_id: u64) {
        if self.phase != Phase::AwaitingQuietPeriod || request_id != self.current_request_id {
            trace!(request_id, current = self.current_request_id, "on_quiet_period_elapsed: stale timer");
            return;
        }
        self.deadline = None;

        if self.context.is_none() {
            debug!(request_id, "on_quiet_period_elapsed: waiting for project context");
            return;
        }
        self.dispatch();
    }

    fn on_context_updated(&mut self, context: Arc<Context>) {
        debug!(signatures = context.signatures().len(), "on_context_updated: called");
        self.context = Some(context);
        // The quiet period already ran out while the scan was in progress
        if self.phase == Phase::AwaitingQuietPeriod && self.deadline.is_none() {
            self.dispatch();
        }
    }

    fn dispatch(&mut self) {
        let request_id = self.current_request_id;
        let prompt = self.pending_prompt.take().unwrap_or_default();

        if prompt.trim().is_empty() {
            debug!(request_id, "dispatch: blank prompt, going idle");
            self.phase = Phase::Idle;
            self.display.idle();
            return;
        }

        let Some(context) = self.context.clone() else {
            self.pending_prompt = Some(prompt);
            return;
        };

        let composed = match self.composer.compose(&context, &prompt) {
            Ok(composed) => composed,
            Err(e) => {
                warn!(request_id, error = %e, "dispatch: failed to compose prompt");
                let error = SessionError {
                    kind: ErrorKind::Provider,
                    message: e.to_string(),
                };
                self.display.failed(request_id, &error);
                self.finish(request_id, Err(error));
                return;
            }
        };

        let Some(events) = self.session_tx.upgrade() else {
            debug!(request_id, "dispatch: event queue closed");
            return;
        };

        info!(request_id, len = prompt.len(), "dispatch: starting session");
        let handle = session::start(self.client.clone(), composed, request_id, &self.options, events);
        self.active_session = Some(handle);
        self.last_dispatch_time = Some(Instant::now());
        self.dispatch_count += 1;
        self.phase = Phase::Dispatched;
        self.display.dispatched(request_id, &prompt);
    }

    async fn on_session_event(&mut self, event: SessionEvent) {
        let request_id = event.request_id();

        if let SessionEvent::Cancelled { .. } = event {
            trace!(request_id, "on_session_event: cancelled, ignoring");
            return;
        }
        if request_id != self.current_request_id || self.phase != Phase::Dispatched {
            trace!(request_id, current = self.current_request_id, "on_session_event: stale, discarding");
            return;
        }

        match event {
            SessionEvent::Chunk { text, .. } => {
                self.display.chunk(request_id, &text);
            }
            SessionEvent::Completed { full_text, .. } => {
                debug!(request_id, len = full_text.len(), "on_session_event: completed");
                self.display.completed(request_id, &full_text);
                export(self.output.clone(), self.display.clone(), request_id, full_text.clone()).await;
                self.finish(request_id, Ok(full_text));
            }
            SessionEvent::Failed { error, .. } => {
                debug!(request_id, kind = %error.kind, "on_session_event: failed");
                self.display.failed(request_id, &error);
                self.finish(request_id, Err(error));
            }
            SessionEvent::Cancelled { .. } => {}
        }
    }

    fn finish(&mut self, request_id: u64, result: Result<String, SessionError>) {
        self.active_session = None;
        self.phase = Phase::Idle;
        self.last_outcome = Some(Outcome { request_id, result });
    }

    fn supersede(&mut self) {
        if let Some(session) = self.active_session.take() {
            session.cancel();
        }
        self.deadline = None;
        self.pending_prompt = None;
        self.phase = Phase::Superseded;
    }

    fn snapshot(&self) -> OrchestratorState {
        OrchestratorState {
            phase: self.phase,
            current_request_id: self.current_request_id,
            pending_prompt: self.pending_prompt.clone(),
            active_session: self.active_session.as_ref().map(|s| s.request_id()),
            last_dispatch_time: self.last_dispatch_time,
            dispatch_count: self.dispatch_count,
            last_outcome: self.last_outcome.clone(),
        }
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.snapshot());
    }
}

/// Hand the final text to the output sink on a blocking thread
async fn export(output: Arc<dyn OutputSink>, display: Arc<dyn DisplaySink>, request_id: u64, text: String) {
    match tokio::task::spawn_blocking(move || output.export(&text)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!(request_id, error = %e, "export: output export failed");
            display.note(&format!("Could not copy to clipboard: {}", e));
        }
        Err(e) => warn!(request_id, error = %e, "export: output task failed"),
    }
}

/// Sends `Shutdown` when the one-shot caller goes away (e.g. Ctrl-C)
struct ShutdownOnDrop(OrchestratorHandle);

impl Drop for ShutdownOnDrop {
    fn drop(&mut self) {
        self.0.shutdown();
    }
}

/// One-shot enrichment: a single input with a zero quiet period
pub async fn enrich_once(
    client: Arc<dyn CompletionClient>,
    composer: Arc<PromptComposer>,
    context: Arc<Context>,
    options: SessionOptions,
    prompt: &str,
    display: Arc<dyn DisplaySink>,
    output: Arc<dyn OutputSink>,
) -> Result<String, SessionError> {
    debug!(len = prompt.len(), "enrich_once: called");
    if prompt.trim().is_empty() {
        return Err(SessionError {
            kind: ErrorKind::Provider,
            message: "Prompt is empty".to_string(),
        });
    }

    let (orchestrator, handle) = Orchestrator::new(client, composer, options, Duration::ZERO);
    let task = orchestrator
        .with_context(context)
        .with_display(display)
        .with_output(output)
        .spawn();
    let guard = ShutdownOnDrop(handle);

    guard.0.input_changed(prompt);
    let state = guard
        .0
        .wait_until(|s| s.last_outcome.is_some() || s.phase == Phase::Superseded)
        .await;
    drop(guard);
    if let Err(e) = task.await {
        warn!(error = %e, "enrich_once: orchestrator task failed");
    }

    match state.and_then(|s| s.last_outcome) {
        Some(outcome) => outcome.result,
        None => Err(SessionError {
            kind: ErrorKind::Transport,
            message: "Enrichment stopped before completing".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::{ChannelDisplay, DisplayUpdate};
    use crate::llm::client::mock::{MockCompletionClient, MockFailure, MockReply};
    use crate::output::OutputError;
    use crate::scanner::Signature;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct RecordingOutput(Mutex<Vec<String>>);

    impl OutputSink for RecordingOutput {
        fn export(&self, text: &str) -> Result<(), OutputError> {
            self.0.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    struct Harness {
        client: Arc<MockCompletionClient>,
        handle: OrchestratorHandle,
        task: JoinHandle<OrchestratorState>,
        updates: mpsc::UnboundedReceiver<DisplayUpdate>,
        output: Arc<RecordingOutput>,
    }

    fn context() -> Arc<Context> {
        Arc::new(Context::new(
            PathBuf::from("/work/app"),
            3,
            vec![Signature {
                path: "main.py".to_string(),
                text: "def main()".to_string(),
            }],
            false,
        ))
    }

    fn harness(replies: Vec<MockReply>, debounce_ms: u64, with_context: bool) -> Harness {
        let client = Arc::new(MockCompletionClient::new(replies));
        let composer = Arc::new(PromptComposer::embedded().unwrap());
        let (display, updates) = ChannelDisplay::new();
        let output = Arc::new(RecordingOutput::default());

        let (mut orchestrator, handle) = Orchestrator::new(
            client.clone(),
            composer,
            SessionOptions::default(),
            Duration::from_millis(debounce_ms),
        );
        if with_context {
            orchestrator = orchestrator.with_context(context());
        }
        let task = orchestrator
            .with_display(Arc::new(display))
            .with_output(output.clone())
            .spawn();

        Harness {
            client,
            handle,
            task,
            updates,
            output,
        }
    }

    async fn wait<F>(handle: &OrchestratorHandle, pred: F) -> OrchestratorState
    where
        F: FnMut(&OrchestratorState) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(5), handle.wait_until(pred))
            .await
            .expect("timed out waiting for orchestrator state")
            .expect("orchestrator stopped")
    }

    fn drain(updates: &mut mpsc::UnboundedReceiver<DisplayUpdate>) -> Vec<DisplayUpdate> {
        let mut out = Vec::new();
        while let Ok(update) = updates.try_recv() {
            out.push(update);
        }
        out
    }

    #[test]
    fn test_clamp_debounce() {
        assert_eq!(clamp_debounce_ms(0), 100);
        assert_eq!(clamp_debounce_ms(800), 800);
        assert_eq!(clamp_debounce_ms(60_000), 5000);
    }

    #[tokio::test]
    async fn test_rapid_input_dispatches_only_last() {
        let h = harness(vec![MockReply::chunks(&["enriched"])], 50, true);

        h.handle.input_changed("a");
        h.handle.input_changed("ab");
        h.handle.input_changed("abc");

        let state = wait(&h.handle, |s| s.last_outcome.is_some()).await;

        assert_eq!(h.client.call_count(), 1);
        assert_eq!(h.client.user_messages(), vec!["abc"]);
        assert_eq!(state.dispatch_count, 1);
        assert_eq!(
            state.last_outcome,
            Some(Outcome {
                request_id: 3,
                result: Ok("enriched".to_string())
            })
        );
        assert_eq!(state.phase, Phase::Idle);
    }

    #[tokio::test]
    async fn test_chunks_then_completed_reach_display_in_order() {
        let mut h = harness(vec![MockReply::chunks(&["Hello", " world"])], 10, true);

        h.handle.input_changed("greet");
        wait(&h.handle, |s| s.last_outcome.is_some()).await;

        assert_eq!(
            drain(&mut h.updates),
            vec![
                DisplayUpdate::Waiting { request_id: 1 },
                DisplayUpdate::Dispatched {
                    request_id: 1,
                    prompt: "greet".to_string()
                },
                DisplayUpdate::Chunk {
                    request_id: 1,
                    text: "Hello".to_string()
                },
                DisplayUpdate::Chunk {
                    request_id: 1,
                    text: " world".to_string()
                },
                DisplayUpdate::Completed {
                    request_id: 1,
                    full_text: "Hello world".to_string()
                },
            ]
        );
        assert_eq!(*h.output.0.lock().unwrap(), vec!["Hello world"]);
    }

    #[tokio::test]
    async fn test_stale_session_events_are_discarded() {
        let mut h = harness(vec![MockReply::chunks(&["fresh"])], 10, true);

        h.handle.input_changed("one");
        wait(&h.handle, |s| s.last_outcome.is_some()).await;
        drain(&mut h.updates);

        // A new input supersedes request 1; late reports for it must vanish
        h.handle.input_changed("two");
        let _ = h.handle.tx.send(OrchestratorEvent::Session(SessionEvent::Chunk {
            request_id: 1,
            text: "stale".to_string(),
        }));
        let _ = h.handle.tx.send(OrchestratorEvent::Session(SessionEvent::Completed {
            request_id: 1,
            full_text: "stale".to_string(),
        }));

        let state = wait(&h.handle, |s| s.last_outcome.as_ref().is_some_and(|o| o.request_id == 2)).await;

        let updates = drain(&mut h.updates);
        assert!(updates.iter().all(|u| !matches!(u, DisplayUpdate::Chunk { text, .. } if text == "stale")));
        assert!(updates.iter().all(|u| !matches!(u, DisplayUpdate::Completed { request_id: 1, .. })));
        assert_eq!(state.last_outcome.unwrap().result, Ok("fresh".to_string()));
        assert_eq!(*h.output.0.lock().unwrap(), vec!["fresh", "fresh"]);
    }

    #[tokio::test]
    async fn test_stale_events_during_newer_dispatch_are_discarded() {
        let mut h = harness(vec![MockReply::Hang], 10, true);

        h.handle.input_changed("one");
        wait(&h.handle, |s| s.active_session == Some(1)).await;
        h.handle.input_changed("two");
        wait(&h.handle, |s| s.active_session == Some(2)).await;
        drain(&mut h.updates);

        // Request 2 is streaming; reports for request 1 arrive after it
        let _ = h.handle.tx.send(OrchestratorEvent::Session(SessionEvent::Chunk {
            request_id: 1,
            text: "stale".to_string(),
        }));
        let _ = h.handle.tx.send(OrchestratorEvent::Session(SessionEvent::Completed {
            request_id: 1,
            full_text: "stale".to_string(),
        }));
        h.handle.quiet_period_elapsed(0);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(drain(&mut h.updates), Vec::new());
        assert!(h.output.0.lock().unwrap().is_empty());
        let state = h.handle.state();
        assert_eq!(state.phase, Phase::Dispatched);
        assert_eq!(state.active_session, Some(2));
        assert_eq!(state.last_outcome, None);
    }

    /// Sink that holds its thread for a while, like a slow clipboard tool
    #[derive(Default)]
    struct SlowOutput {
        started: AtomicBool,
        finished: AtomicBool,
    }

    impl OutputSink for SlowOutput {
        fn export(&self, _text: &str) -> Result<(), OutputError> {
            self.started.store(true, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(200));
            self.finished.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_slow_export_does_not_block_runtime() {
        let client = Arc::new(MockCompletionClient::new(vec![MockReply::chunks(&["done"])]));
        let composer = Arc::new(PromptComposer::embedded().unwrap());
        let output = Arc::new(SlowOutput::default());
        let (orchestrator, handle) =
            Orchestrator::new(client, composer, SessionOptions::default(), Duration::from_millis(10));
        let _task = orchestrator.with_context(context()).with_output(output.clone()).spawn();

        handle.input_changed("p");
        tokio::time::timeout(Duration::from_secs(5), async {
            while !output.started.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("export never started");
        // This task runs while the sink is still busy
        assert!(!output.finished.load(Ordering::SeqCst));

        let state = wait(&handle, |s| s.last_outcome.is_some()).await;
        assert!(output.finished.load(Ordering::SeqCst));
        assert_eq!(state.last_outcome.unwrap().result, Ok("done".to_string()));
    }

    #[tokio::test]
    async fn test_cancelled_event_ignored_even_for_current_id() {
        let h = harness(vec![MockReply::Hang], 10, true);

        h.handle.input_changed("p");
        wait(&h.handle, |s| s.phase == Phase::Dispatched).await;

        let _ = h.handle.tx.send(OrchestratorEvent::Session(SessionEvent::Cancelled { request_id: 1 }));
        // Round-trip a no-op event so the cancel report has been processed
        h.handle.quiet_period_elapsed(0);
        tokio::time::sleep(Duration::from_millis(20)).await;

        let state = h.handle.state();
        assert_eq!(state.phase, Phase::Dispatched);
        assert_eq!(state.active_session, Some(1));
    }

    #[tokio::test]
    async fn test_failure_is_recoverable() {
        let mut h = harness(
            vec![MockReply::FailOpen(MockFailure::RateLimited), MockReply::chunks(&["ok"])],
            10,
            true,
        );

        h.handle.input_changed("first");
        let state = wait(&h.handle, |s| s.last_outcome.is_some()).await;
        let outcome = state.last_outcome.unwrap();
        assert_eq!(outcome.request_id, 1);
        assert_eq!(outcome.result.unwrap_err().kind, ErrorKind::RateLimited);
        assert_eq!(state.phase, Phase::Idle);

        h.handle.input_changed("second");
        let state = wait(&h.handle, |s| s.last_outcome.as_ref().is_some_and(|o| o.request_id == 2)).await;
        assert_eq!(state.last_outcome.unwrap().result, Ok("ok".to_string()));

        let updates = drain(&mut h.updates);
        assert!(updates.iter().any(|u| matches!(
            u,
            DisplayUpdate::Failed {
                request_id: 1,
                kind: ErrorKind::RateLimited,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn test_single_session_in_flight() {
        let h = harness(vec![MockReply::Hang], 10, true);

        for (i, text) in ["a", "b", "c"].iter().enumerate() {
            let id = i as u64 + 1;
            h.handle.input_changed(*text);
            let state = wait(&h.handle, |s| s.active_session == Some(id)).await;
            assert_eq!(state.phase, Phase::Dispatched);
        }

        tokio::time::timeout(Duration::from_secs(2), async {
            while h.client.dropped_count() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("superseded sessions were not torn down");

        assert_eq!(h.client.call_count(), 3);
        assert_eq!(h.client.dropped_count(), 2);
    }

    #[tokio::test]
    async fn test_blank_prompt_goes_idle() {
        let mut h = harness(vec![MockReply::chunks(&["x"])], 10, true);

        h.handle.input_changed("   ");
        let state = wait(&h.handle, |s| s.current_request_id == 1 && s.phase == Phase::Idle).await;

        assert_eq!(state.dispatch_count, 0);
        assert_eq!(h.client.call_count(), 0);
        assert_eq!(
            drain(&mut h.updates),
            vec![DisplayUpdate::Waiting { request_id: 1 }, DisplayUpdate::Idle]
        );
    }

    #[tokio::test]
    async fn test_dispatch_waits_for_context() {
        let h = harness(vec![MockReply::chunks(&["late"])], 10, false);

        h.handle.input_changed("prompt");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.client.call_count(), 0);
        assert_eq!(h.handle.state().phase, Phase::AwaitingQuietPeriod);

        h.handle.update_context(context());
        let state = wait(&h.handle, |s| s.last_outcome.is_some()).await;
        assert_eq!(state.last_outcome.unwrap().result, Ok("late".to_string()));
    }

    #[tokio::test]
    async fn test_shutdown_supersedes_and_cancels() {
        let h = harness(vec![MockReply::Hang], 10, true);

        h.handle.input_changed("p");
        wait(&h.handle, |s| s.phase == Phase::Dispatched).await;

        h.handle.shutdown();
        let final_state = h.task.await.unwrap();
        assert_eq!(final_state.phase, Phase::Superseded);
        assert_eq!(final_state.active_session, None);

        tokio::time::timeout(Duration::from_secs(2), async {
            while h.client.dropped_count() < 1 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("in-flight session was not torn down");
        assert!(!h.handle.input_changed("after"));
    }

    #[tokio::test]
    async fn test_enrich_once_returns_text() {
        let client = Arc::new(MockCompletionClient::new(vec![MockReply::chunks(&["Hello", " world"])]));
        let output = Arc::new(RecordingOutput::default());

        let result = enrich_once(
            client.clone(),
            Arc::new(PromptComposer::embedded().unwrap()),
            context(),
            SessionOptions::default(),
            "say hi",
            Arc::new(NullDisplay),
            output.clone(),
        )
        .await;

        assert_eq!(result, Ok("Hello world".to_string()));
        assert_eq!(client.user_messages(), vec!["say hi"]);
        assert_eq!(*output.0.lock().unwrap(), vec!["Hello world"]);
    }

    #[tokio::test]
    async fn test_enrich_once_reports_failure() {
        let client = Arc::new(MockCompletionClient::new(vec![MockReply::FailOpen(MockFailure::Auth)]));

        let result = enrich_once(
            client,
            Arc::new(PromptComposer::embedded().unwrap()),
            context(),
            SessionOptions::default(),
            "x",
            Arc::new(NullDisplay),
            Arc::new(NullOutput),
        )
        .await;

        assert_eq!(result.unwrap_err().kind, ErrorKind::Auth);
    }

    #[tokio::test]
    async fn test_enrich_once_rejects_blank_prompt() {
        let client = Arc::new(MockCompletionClient::new(vec![MockReply::chunks(&["x"])]));
        let result = enrich_once(
            client.clone(),
            Arc::new(PromptComposer::embedded().unwrap()),
            context(),
            SessionOptions::default(),
            "  ",
            Arc::new(NullDisplay),
            Arc::new(NullOutput),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(client.call_count(), 0);
    }
}
