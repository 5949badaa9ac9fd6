use super::completion_repository::{CompletionError, CompletionRepository};
use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs},
    Client,
};
use async_trait::async_trait;
use std::sync::Arc;

/// OpenAI chat completion implementation of the completion repository.
pub struct OpenAiCompletionRepository {
    client: Arc<Client<OpenAIConfig>>,
    model: String,
}

impl OpenAiCompletionRepository {
    pub fn new(client: Arc<Client<OpenAIConfig>>, model: String) -> Self {
        Self { client, model }
    }

    fn classify(error: OpenAIError) -> CompletionError {
        let message = error.to_string();
        let lower = message.to_lowercase();

        if lower.contains("rate limit") || lower.contains("429") {
            CompletionError::RateLimited(message)
        } else if lower.contains("context_length")
            || lower.contains("maximum context")
            || lower.contains("too long")
        {
            CompletionError::ContextTooLarge(message)
        } else {
            CompletionError::Unavailable(message)
        }
    }
}

#[async_trait]
impl CompletionRepository for OpenAiCompletionRepository {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let start_time = std::time::Instant::now();

        tracing::info!(
            model = %self.model,
            prompt_length = prompt.len(),
            "Calling OpenAI chat completion"
        );

        let message = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()
            .map_err(Self::classify)?;
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages([message.into()])
            .build()
            .map_err(Self::classify)?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    model = %self.model,
                    prompt_length = prompt.len(),
                    "OpenAI chat completion failed"
                );
                Self::classify(e)
            })?;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(CompletionError::Unavailable(
                "empty completion response".to_string(),
            ));
        }

        tracing::info!(
            model = %self.model,
            latency_ms = start_time.elapsed().as_millis() as u64,
            reply_length = text.len(),
            "Chat completion received"
        );

        Ok(text)
    }
}
