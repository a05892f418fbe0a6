//! Enrichment Session
//!
//! One streamed completion, from dispatch to a terminal outcome. The session
//! runs as its own task, reports through an event channel and never touches
//! orchestrator state. It emits any number of `Chunk` events followed by
//! exactly one of `Completed`, `Failed` or `Cancelled`.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::llm::{CompletionClient, CompletionRequest, ErrorKind, LlmError};
use crate::prompts::ComposedPrompt;

/// Model parameters and time bounds for one session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Limit on the wait for the first chunk, measured from dispatch
    pub first_chunk_timeout: Duration,
    /// Limit on the whole session
    pub completion_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            model: "llama-3.3-70b-versatile".to_string(),
            temperature: 0.7,
            max_tokens: 4096,
            first_chunk_timeout: Duration::from_secs(30),
            completion_timeout: Duration::from_secs(120),
        }
    }
}

/// Failure reported by a session, in a form the display can keep
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SessionError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&LlmError> for SessionError {
    fn from(err: &LlmError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Lifecycle of one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// What a session reports back
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Chunk { request_id: u64, text: String },
    Completed { request_id: u64, full_text: String },
    Failed { request_id: u64, error: SessionError },
    Cancelled { request_id: u64 },
}

impl SessionEvent {
    pub fn request_id(&self) -> u64 {
        match self {
            Self::Chunk { request_id, .. }
            | Self::Completed { request_id, .. }
            | Self::Failed { request_id, .. }
            | Self::Cancelled { request_id } => *request_id,
        }
    }
}

/// Owner's view of a running session
///
/// Dropping the handle cancels the session.
#[derive(Debug)]
pub struct SessionHandle {
    request_id: u64,
    cancel: CancellationToken,
    state: watch::Receiver<SessionState>,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    /// Ask the session to stop
    ///
    /// Idempotent, and a no-op once the session has reached a terminal state.
    pub fn cancel(&self) {
        debug!(request_id = self.request_id, "SessionHandle::cancel: called");
        self.cancel.cancel();
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Wait until the session task has exited
    pub async fn join(&mut self) {
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            warn!(request_id = self.request_id, error = %e, "SessionHandle::join: task failed");
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Spawn a session streaming `prompt` from `client`
///
/// Events are wrapped with `E::from` so the caller can feed them straight into
/// its own event queue.
pub fn start<E>(
    client: Arc<dyn CompletionClient>,
    prompt: ComposedPrompt,
    request_id: u64,
    options: &SessionOptions,
    events: mpsc::UnboundedSender<E>,
) -> SessionHandle
where
    E: From<SessionEvent> + Send + 'static,
{
    debug!(request_id, provider = client.name(), "session::start: called");
    let cancel = CancellationToken::new();
    let (state_tx, state_rx) = watch::channel(SessionState::Created);
    let request = CompletionRequest::new(prompt, options.model.clone(), options.temperature, options.max_tokens);

    let task = tokio::spawn(run(
        client,
        request,
        request_id,
        options.clone(),
        cancel.clone(),
        state_tx,
        events,
    ));

    SessionHandle {
        request_id,
        cancel,
        state: state_rx,
        task: Some(task),
    }
}

async fn run<E>(
    client: Arc<dyn CompletionClient>,
    request: CompletionRequest,
    request_id: u64,
    options: SessionOptions,
    cancel: CancellationToken,
    state: watch::Sender<SessionState>,
    events: mpsc::UnboundedSender<E>,
) where
    E: From<SessionEvent> + Send + 'static,
{
    state.send_replace(SessionState::Running);
    let started = Instant::now();

    // The drain future owns the stream; leaving the select drops it on every path
    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        res = tokio::time::timeout(options.completion_timeout, drain(client.as_ref(), request, request_id, &options, &events)) => {
            Some(match res {
                Ok(res) => res,
                Err(_) => Err(LlmError::Timeout(options.completion_timeout)),
            })
        }
    };

    let elapsed_ms = started.elapsed().as_millis() as u64;
    let event = match outcome {
        None => {
            debug!(request_id, elapsed_ms, "session: cancelled");
            state.send_replace(SessionState::Cancelled);
            SessionEvent::Cancelled { request_id }
        }
        Some(Ok(full_text)) => {
            info!(request_id, elapsed_ms, len = full_text.len(), "session: completed");
            state.send_replace(SessionState::Completed);
            SessionEvent::Completed { request_id, full_text }
        }
        Some(Err(e)) => {
            warn!(request_id, elapsed_ms, error = %e, "session: failed");
            state.send_replace(SessionState::Failed);
            SessionEvent::Failed {
                request_id,
                error: SessionError::from(&e),
            }
        }
    };
    let _ = events.send(E::from(event));
}

/// Open the stream and forward chunks until it ends
async fn drain<E>(
    client: &dyn CompletionClient,
    request: CompletionRequest,
    request_id: u64,
    options: &SessionOptions,
    events: &mpsc::UnboundedSender<E>,
) -> Result<String, LlmError>
where
    E: From<SessionEvent>,
{
    let first_deadline = Instant::now() + options.first_chunk_timeout;
    let first_timeout = LlmError::Timeout(options.first_chunk_timeout);

    let mut stream = tokio::time::timeout_at(first_deadline, client.open(request))
        .await
        .map_err(|_| first_timeout)??;

    let mut buffer = String::new();
    let mut received_any = false;
    loop {
        let next = if received_any {
            stream.next().await
        } else {
            tokio::time::timeout_at(first_deadline, stream.next())
                .await
                .map_err(|_| LlmError::Timeout(options.first_chunk_timeout))?
        };

        match next {
            Some(Ok(text)) => {
                received_any = true;
                if text.is_empty() {
                    continue;
                }
                buffer.push_str(&text);
                let _ = events.send(E::from(SessionEvent::Chunk { request_id, text }));
            }
            Some(Err(e)) => return Err(e),
            None => break,
        }
    }

    debug!(request_id, len = buffer.len(), "drain: stream exhausted");
    Ok(buffer)
}
