//! Anthropic Claude API client implementation
//!
//! Streams the Messages API through an `EventSource`, forwarding only text
//! deltas.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use reqwest_eventsource::{Event, EventSource};
use serde::Deserialize;
use tracing::{debug, trace, warn};

use super::{ChunkStream, CompletionClient, CompletionRequest, LlmError};
use crate::config::LlmConfig;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Claude API client
pub struct AnthropicClient {
    api_key: String,
    base_url: String,
    http: Client,
}

impl AnthropicClient {
    /// Create a new client from configuration
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        debug!(base_url = %config.base_url(), "from_config: called");
        let api_key = config.api_key()?;

        let http = Client::builder()
            .connect_timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(LlmError::Network)?;

        Ok(Self {
            api_key,
            base_url: config.base_url().to_string(),
            http,
        })
    }

    /// Build the request body for the Anthropic API
    fn build_request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        debug!(model = %request.model, %request.max_tokens, "build_request_body: called");
        serde_json::json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "system": request.system_prompt,
            "messages": [{ "role": "user", "content": request.user_message }],
            "stream": true,
        })
    }
}

#[async_trait]
impl CompletionClient for AnthropicClient {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn open(&self, request: CompletionRequest) -> Result<ChunkStream, LlmError> {
        debug!(model = %request.model, "open: called");
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_request_body(&request);

        let http_request = self
            .http
            .post(url)
            .header("x-api-key", self.api_key.clone())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body);

        let mut es = EventSource::new(http_request).map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        es.set_retry_policy(Box::new(reqwest_eventsource::retry::Never));

        // Wait for the connection so that status errors surface here
        let mut first = None;
        match es.next().await {
            Some(Ok(Event::Open)) => {
                debug!("open: Event::Open");
            }
            Some(Ok(Event::Message(msg))) => {
                warn!(event = %msg.event, "open: message before open");
                first = early_text(&msg.data).inspect_err(|_| es.close())?;
            }
            Some(Err(reqwest_eventsource::Error::InvalidStatusCode(status, response))) => {
                es.close();
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(Duration::from_secs);
                let text = response.text().await.unwrap_or_default();
                debug!(%status, "open: API error");
                return Err(LlmError::from_status(status.as_u16(), error_message(&text), retry_after));
            }
            Some(Err(e)) => {
                es.close();
                debug!(error = %e, "open: connection failed");
                return Err(map_event_error(e));
            }
            None => return Err(LlmError::Transport("stream closed before opening".to_string())),
        }

        Ok(text_deltas(first, es))
    }
}

fn map_event_error(e: reqwest_eventsource::Error) -> LlmError {
    match e {
        reqwest_eventsource::Error::Transport(err) => LlmError::Network(err),
        reqwest_eventsource::Error::InvalidStatusCode(status, _) => {
            LlmError::from_status(status.as_u16(), status.to_string(), None)
        }
        other => LlmError::Transport(other.to_string()),
    }
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<AnthropicErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.to_string())
}

/// What one server-sent event contributes to the text stream
#[derive(Debug, PartialEq)]
enum Delta {
    Text(String),
    Error(String),
    Stop,
    Skip,
}

fn decode_event(data: &str) -> Result<Delta, LlmError> {
    let event: AnthropicEvent = serde_json::from_str(data)?;
    let delta = match event.kind.as_str() {
        "content_block_delta" => match event.delta.and_then(|d| d.text) {
            Some(text) if !text.is_empty() => Delta::Text(text),
            _ => Delta::Skip,
        },
        "message_stop" => Delta::Stop,
        "error" => Delta::Error(
            event
                .error
                .map(|e| e.message)
                .unwrap_or_else(|| "unknown stream error".to_string()),
        ),
        _ => Delta::Skip,
    };
    Ok(delta)
}

/// Text carried by a message that arrived ahead of `Open`
fn early_text(data: &str) -> Result<Option<String>, LlmError> {
    match decode_event(data)? {
        Delta::Text(text) => Ok(Some(text)),
        Delta::Error(message) => Err(LlmError::InvalidResponse(message)),
        Delta::Stop | Delta::Skip => Ok(None),
    }
}

fn text_deltas(first: Option<String>, es: EventSource) -> ChunkStream {
    let first = futures::stream::iter(first.map(Ok));
    Box::pin(first.chain(futures::stream::unfold(Some(es), |state| async move {
        let mut es = state?;
        loop {
            match es.next().await {
                Some(Ok(Event::Message(msg))) => match decode_event(&msg.data) {
                    Ok(Delta::Text(text)) => return Some((Ok(text), Some(es))),
                    Ok(Delta::Skip) => trace!(event = %msg.event, "text_deltas: skipped"),
                    Ok(Delta::Stop) => {
                        debug!("text_deltas: message_stop");
                        es.close();
                        return None;
                    }
                    Ok(Delta::Error(message)) => {
                        es.close();
                        return Some((Err(LlmError::InvalidResponse(message)), None));
                    }
                    Err(e) => {
                        es.close();
                        return Some((Err(e), None));
                    }
                },
                Some(Ok(Event::Open)) => {}
                Some(Err(reqwest_eventsource::Error::StreamEnded)) | None => return None,
                Some(Err(e)) => {
                    debug!(error = %e, "text_deltas: stream error");
                    es.close();
                    return Some((Err(map_event_error(e)), None));
                }
            }
        }
    })))
}

#[derive(Debug, Deserialize)]
struct AnthropicEvent {
    #[serde(rename = "type")]
    kind: String,
    delta: Option<AnthropicDelta>,
    error: Option<AnthropicErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct AnthropicDelta {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    error: AnthropicErrorDetail,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorDetail {
    message: String,
}
