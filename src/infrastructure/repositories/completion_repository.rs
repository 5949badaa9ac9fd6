use async_trait::async_trait;

/// Classified failure of the text completion provider.
///
/// The AI scripter keys its retry behavior off this classification:
/// rate limits back off, oversized context shrinks the input, anything
/// else counts against the attempt budget as-is.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CompletionError {
    #[error("completion provider rate limited: {0}")]
    RateLimited(String),

    #[error("prompt exceeds provider context window: {0}")]
    ContextTooLarge(String),

    #[error("completion provider unavailable: {0}")]
    Unavailable(String),
}

/// Repository for AI text completion.
/// Abstracts the underlying provider (OpenAI, Azure OpenAI, etc.)
#[async_trait]
pub trait CompletionRepository: Send + Sync {
    /// Complete a prompt and return the generated text.
    ///
    /// # Errors
    /// Returns a classified [`CompletionError`]; callers decide retry policy.
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}
