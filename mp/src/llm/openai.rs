//! OpenAI-compatible API client implementation
//!
//! Implements the CompletionClient trait for the Chat Completions streaming
//! API. Groq serves the same protocol, so this client covers both.

use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, trace, warn};

use super::{ChunkStream, CompletionClient, CompletionRequest, LlmError};
use crate::config::LlmConfig;

/// Maximum number of retries for transient errors
const MAX_RETRIES: u32 = 3;

/// Initial backoff delay for retries
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Check if an HTTP status code is retryable
///
/// 429 is reported to the caller, never retried.
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 500 | 502 | 503 | 504)
}

/// OpenAI-compatible API client
pub struct OpenAIClient {
    name: String,
    api_key: String,
    base_url: String,
    http: Client,
}

impl OpenAIClient {
    /// Create a new client from configuration
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        debug!(provider = %config.provider, base_url = %config.base_url(), "from_config: called");
        let api_key = config.api_key()?;

        // Only the connect phase is bounded here; a streamed body may take
        // longer and its time limits are enforced by the session.
        let http = Client::builder()
            .connect_timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(LlmError::Network)?;

        Ok(Self {
            name: config.provider.clone(),
            api_key,
            base_url: config.base_url().to_string(),
            http,
        })
    }

    /// Build the request body for the Chat Completions API
    fn build_request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        debug!(model = %request.model, %request.max_tokens, "build_request_body: called");

        // GPT-5.x and o1/o3 models use max_completion_tokens instead of max_tokens
        let uses_completion_tokens =
            request.model.starts_with("gpt-5") || request.model.starts_with("o1") || request.model.starts_with("o3");

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": [
                { "role": "system", "content": request.system_prompt },
                { "role": "user", "content": request.user_message },
            ],
            "temperature": request.temperature,
            "stream": true,
        });

        if uses_completion_tokens {
            body["max_completion_tokens"] = serde_json::json!(request.max_tokens);
        } else {
            body["max_tokens"] = serde_json::json!(request.max_tokens);
        }

        body
    }
}

#[async_trait]
impl CompletionClient for OpenAIClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open(&self, request: CompletionRequest) -> Result<ChunkStream, LlmError> {
        debug!(model = %request.model, "open: called");
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = self.build_request_body(&request);

        let mut last_error = None;
        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let backoff = INITIAL_BACKOFF_MS * 2u64.pow(attempt - 1);
                warn!(attempt, backoff_ms = backoff, "open: retrying after transient error");
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }

            let response = match self
                .http
                .post(url.clone())
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("content-type", "application/json")
                .json(&body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) if e.is_connect() || e.is_timeout() => {
                    debug!(attempt, error = %e, "open: network error");
                    last_error = Some(LlmError::Network(e));
                    continue;
                }
                Err(e) => return Err(LlmError::Network(e)),
            };

            let status = response.status().as_u16();

            if is_retryable_status(status) && attempt < MAX_RETRIES {
                let text = response.text().await.unwrap_or_default();
                debug!(attempt, status, "open: retryable error");
                last_error = Some(LlmError::ApiError { status, message: text });
                continue;
            }

            if !response.status().is_success() {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(Duration::from_secs);
                let text = response.text().await.unwrap_or_default();
                debug!(%status, "open: API error");
                return Err(LlmError::from_status(status, error_message(&text), retry_after));
            }

            debug!("open: stream accepted");
            return Ok(sse_text_stream(response.bytes_stream()));
        }

        Err(last_error.unwrap_or_else(|| LlmError::InvalidResponse("Max retries exceeded".to_string())))
    }
}

/// Pull the human-readable message out of an error body, if it is JSON
fn error_message(body: &str) -> String {
    serde_json::from_str::<OpenAIErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.to_string())
}

/// Line-buffered decoder for the `data:` events of a Chat Completions stream
struct SseDecoder<S> {
    bytes: Pin<Box<S>>,
    buffer: Vec<u8>,
    pending: VecDeque<Result<String, LlmError>>,
    done: bool,
}

impl<S> SseDecoder<S> {
    /// Consume every complete line in the buffer
    fn drain_lines(&mut self) {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.handle_line(&String::from_utf8_lossy(&line));
            if self.done {
                self.buffer.clear();
                return;
            }
        }
    }

    fn handle_line(&mut self, line: &str) {
        let line = line.trim();
        let Some(data) = line.strip_prefix("data:").map(str::trim_start) else {
            return;
        };
        if data == "[DONE]" {
            trace!("SseDecoder: [DONE]");
            self.done = true;
            return;
        }

        match serde_json::from_str::<OpenAIStreamChunk>(data) {
            Ok(chunk) => {
                if let Some(err) = chunk.error {
                    self.pending.push_back(Err(LlmError::InvalidResponse(err.message)));
                    self.done = true;
                    return;
                }
                let text = chunk
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.delta.content)
                    .unwrap_or_default();
                if !text.is_empty() {
                    self.pending.push_back(Ok(text));
                }
            }
            Err(e) => debug!(error = %e, "SseDecoder: skipping unparseable event"),
        }
    }
}

/// Turn a response body into a stream of text deltas
fn sse_text_stream<S, B, E>(bytes: S) -> ChunkStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<LlmError> + Send + 'static,
{
    let decoder = SseDecoder {
        bytes: Box::pin(bytes),
        buffer: Vec::new(),
        pending: VecDeque::new(),
        done: false,
    };

    Box::pin(futures::stream::unfold(decoder, |mut dec| async move {
        loop {
            if let Some(item) = dec.pending.pop_front() {
                return Some((item, dec));
            }
            if dec.done {
                return None;
            }
            match dec.bytes.next().await {
                Some(Ok(chunk)) => {
                    dec.buffer.extend_from_slice(chunk.as_ref());
                    dec.drain_lines();
                }
                Some(Err(e)) => {
                    dec.done = true;
                    return Some((Err(e.into()), dec));
                }
                None => {
                    // Final line may lack its newline
                    dec.buffer.push(b'\n');
                    dec.drain_lines();
                    dec.done = true;
                }
            }
        }
    }))
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorBody {
    error: OpenAIErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorDetail {
    message: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAIStreamChoice>,
    error: Option<OpenAIErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChoice {
    delta: OpenAIStreamDelta,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamDelta {
    content: Option<String>,
}
