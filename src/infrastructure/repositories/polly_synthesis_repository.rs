use super::synthesis_repository::{text_preview, SynthesisProviderError, SynthesisRepository};
use crate::domain::audio::VoiceProfile;
use async_trait::async_trait;
use aws_sdk_polly::{
    types::{Engine, OutputFormat, VoiceId},
    Client as PollyClient,
};
use std::sync::Arc;

/// AWS Polly has a limit of 3000 characters per request
const MAX_CHUNK_SIZE: usize = 3000;

/// AWS Polly implementation of the synthesis repository
pub struct PollySynthesisRepository {
    polly_client: Arc<PollyClient>,
}

impl PollySynthesisRepository {
    pub fn new(polly_client: Arc<PollyClient>) -> Self {
        Self { polly_client }
    }

    /// Split text at sentence boundaries into chunks under the provider
    /// limit; sentence-free overlong text falls back to a character split.
    fn split_into_chunks(text: &str) -> Vec<String> {
        if text.len() <= MAX_CHUNK_SIZE {
            return vec![text.to_string()];
        }

        let sentence_end = regex::Regex::new(r"[.!?]+\s+").unwrap();
        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut last_end = 0;

        let push_piece = |piece: &str, chunks: &mut Vec<String>, current: &mut String| {
            if !current.is_empty() && current.len() + piece.len() > MAX_CHUNK_SIZE {
                chunks.push(current.trim().to_string());
                current.clear();
            }
            if piece.len() > MAX_CHUNK_SIZE {
                let chars: Vec<char> = piece.chars().collect();
                for chunk in chars.chunks(MAX_CHUNK_SIZE) {
                    chunks.push(chunk.iter().collect());
                }
            } else {
                current.push_str(piece);
            }
        };

        for boundary in sentence_end.find_iter(text) {
            push_piece(&text[last_end..boundary.end()], &mut chunks, &mut current);
            last_end = boundary.end();
        }
        if last_end < text.len() {
            push_piece(&text[last_end..], &mut chunks, &mut current);
        }
        if !current.trim().is_empty() {
            chunks.push(current.trim().to_string());
        }

        chunks
    }

    fn classify_error(rendered: String) -> SynthesisProviderError {
        if rendered.contains("Throttling") || rendered.contains("timeout") {
            SynthesisProviderError::Transient(rendered)
        } else if rendered.contains("LimitExceeded") || rendered.contains("TooManyRequests") {
            SynthesisProviderError::QuotaExceeded(rendered)
        } else if rendered.contains("ValidationException") || rendered.contains("voice") {
            SynthesisProviderError::InvalidVoice(rendered)
        } else {
            SynthesisProviderError::Unavailable(rendered)
        }
    }

    async fn call_polly(
        &self,
        text: &str,
        voice: &VoiceProfile,
    ) -> Result<Vec<u8>, SynthesisProviderError> {
        let voice_id = VoiceId::from(voice.voice_id.as_str());

        tracing::info!(
            voice = %voice.voice_id,
            style = %voice.style_id,
            text_length = text.len(),
            text_preview = text_preview(text),
            "Calling AWS Polly synthesize_speech"
        );

        let result = self
            .polly_client
            .synthesize_speech()
            .text(text)
            .voice_id(voice_id)
            .output_format(OutputFormat::Mp3)
            .engine(Engine::Neural)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    error = ?e,
                    voice = %voice.voice_id,
                    text_length = text.len(),
                    "AWS Polly synthesize_speech failed"
                );
                Self::classify_error(format!("{e:?}"))
            })?;

        let audio_stream = result.audio_stream.collect().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to collect audio stream from Polly response");
            SynthesisProviderError::Transient(format!("failed to read audio stream: {e}"))
        })?;

        Ok(audio_stream.into_bytes().to_vec())
    }
}

#[async_trait]
impl SynthesisRepository for PollySynthesisRepository {
    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceProfile,
    ) -> Result<Vec<u8>, SynthesisProviderError> {
        let start_time = std::time::Instant::now();
        let chunks = Self::split_into_chunks(text);

        let mut merged_audio = Vec::new();
        for (index, chunk) in chunks.iter().enumerate() {
            tracing::debug!(chunk_index = index, chunk_size = chunk.len(), "Synthesizing chunk");
            let audio = self.call_polly(chunk, voice).await?;
            merged_audio.extend(audio);
        }

        tracing::info!(
            provider = "polly",
            voice = %voice.voice_id,
            latency_ms = start_time.elapsed().as_millis() as u64,
            characters_count = text.len(),
            chunk_count = chunks.len(),
            audio_size_bytes = merged_audio.len(),
            "Utterance synthesis completed"
        );

        Ok(merged_audio)
    }
}
