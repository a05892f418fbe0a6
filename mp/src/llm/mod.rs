//! LLM Client module for Magic Prompt
//!
//! Streams completions from OpenAI-compatible (Groq, OpenAI) and Anthropic
//! endpoints behind the `CompletionClient` trait.

use std::sync::Arc;

use tracing::debug;

mod anthropic;
pub mod client;
mod error;
mod openai;
mod types;

pub use anthropic::AnthropicClient;
pub use client::{ChunkStream, CompletionClient};
pub use error::{ErrorKind, LlmError};
pub use openai::OpenAIClient;
pub use types::CompletionRequest;

use crate::config::LlmConfig;

/// Create an LLM client based on the provider specified in config
///
/// Supports "groq", "openai" and "anthropic". Fails with
/// `CredentialMissing` when the API key variable is unset.
pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn CompletionClient>, LlmError> {
    debug!(provider = %config.provider, model = %config.model, "create_client: called");
    match config.provider.as_str() {
        "anthropic" => {
            debug!("create_client: creating Anthropic client");
            Ok(Arc::new(AnthropicClient::from_config(config)?))
        }
        "groq" | "openai" => {
            debug!("create_client: creating OpenAI-compatible client");
            Ok(Arc::new(OpenAIClient::from_config(config)?))
        }
        other => {
            debug!(provider = %other, "create_client: unknown provider");
            Err(LlmError::InvalidResponse(format!(
                "Unknown LLM provider: '{}'. Supported: groq, openai, anthropic",
                other
            )))
        }
    }
}
