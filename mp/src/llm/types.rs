//! Request types shared by all providers

use serde::Serialize;

use crate::prompts::ComposedPrompt;

/// One streamed completion request
///
/// Every request is independent: a system instruction and a single user
/// message, no conversation history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_message: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(prompt: ComposedPrompt, model: impl Into<String>, temperature: f32, max_tokens: u32) -> Self {
        Self {
            system_prompt: prompt.system_instruction,
            user_message: prompt.user_message,
            model: model.into(),
            temperature,
            max_tokens,
        }
    }
}
