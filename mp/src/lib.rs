//! Magic Prompt - project-aware prompt enrichment
//!
//! Scans a local source tree for a compact summary of its structure and code
//! signatures, then streams an enriched version of a short user prompt from an
//! LLM. In real-time mode every keystroke supersedes the previous request and
//! only the latest input, after a quiet period, is ever sent.
//!
//! # Modules
//!
//! - [`scanner`] - Directory walk and signature extraction
//! - [`prompts`] - System prompt composition from a scanned context
//! - [`llm`] - Streaming completion clients (Groq, OpenAI, Anthropic)
//! - [`session`] - One cancellable streaming request
//! - [`orchestrator`] - Debounced, single-writer enrichment loop
//! - [`store`] - Saved working directory and debounce interval
//! - [`config`] - YAML configuration loading
//! - [`cli`] - Command-line interface
//! - [`tui`] - Real-time terminal interface

pub mod cli;
pub mod config;
pub mod display;
pub mod llm;
pub mod orchestrator;
pub mod output;
pub mod progress;
pub mod prompts;
pub mod scanner;
pub mod session;
pub mod store;
pub mod tui;

// Re-export commonly used types
pub use config::{Config, LlmConfig, ScanConfig};
pub use display::{ChannelDisplay, DisplaySink, DisplayUpdate, NullDisplay, StdoutDisplay};
pub use llm::{
    AnthropicClient, ChunkStream, CompletionClient, CompletionRequest, ErrorKind, LlmError, OpenAIClient,
    create_client,
};
pub use orchestrator::{
    Orchestrator, OrchestratorEvent, OrchestratorHandle, OrchestratorState, Outcome, Phase, clamp_debounce_ms,
    enrich_once,
};
pub use output::{ClipboardOutput, NullOutput, OutputError, OutputSink};
pub use progress::{LogSink, NullSink, StderrSink};
pub use prompts::{ComposedPrompt, PromptComposer, PromptError};
pub use scanner::{Context, IgnoreRules, ScanError, ScanLimits, Signature, scan};
pub use session::{SessionError, SessionEvent, SessionHandle, SessionOptions, SessionState};
pub use store::{ConfigStore, StoreError, resolve_working_directory};
