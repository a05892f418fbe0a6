//! CompletionClient trait definition

use async_trait::async_trait;
use futures::stream::BoxStream;

use super::{CompletionRequest, LlmError};

/// Incremental text fragments of one completion
///
/// The stream ends after the last fragment. An `Err` item ends it early.
/// Dropping the stream aborts the underlying HTTP request.
pub type ChunkStream = BoxStream<'static, Result<String, LlmError>>;

/// Streaming LLM client - each call is independent (fresh context)
///
/// `open` resolves once the provider has accepted the request; the text
/// arrives through the returned stream. Errors the provider reports before
/// any text (bad credentials, rate limits) surface from `open`.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Short provider label for logs and the status line
    fn name(&self) -> &str;

    /// Start a streamed completion
    async fn open(&self, request: CompletionRequest) -> Result<ChunkStream, LlmError>;
}
