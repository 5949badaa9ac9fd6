use super::synthesis_repository::{text_preview, SynthesisProviderError, SynthesisRepository};
use crate::domain::audio::VoiceProfile;
use async_openai::{
    config::OpenAIConfig,
    types::{CreateSpeechRequest, SpeechModel, Voice},
    Client,
};
use async_trait::async_trait;
use std::sync::Arc;

/// OpenAI TTS implementation of the synthesis repository.
///
/// Utterances are well under the provider's 4096-character request limit
/// after dialogue scripting, so no chunking is required here.
pub struct OpenAiSynthesisRepository {
    client: Arc<Client<OpenAIConfig>>,
    model: String,
}

impl OpenAiSynthesisRepository {
    pub fn new(client: Arc<Client<OpenAIConfig>>, model: String) -> Self {
        Self { client, model }
    }

    /// Unknown voices are a persistent `InvalidVoice`, never a silent
    /// remap; the synthesizer decides whether to substitute.
    fn parse_voice(voice_id: &str) -> Result<Voice, SynthesisProviderError> {
        match voice_id.to_lowercase().as_str() {
            "alloy" => Ok(Voice::Alloy),
            "echo" => Ok(Voice::Echo),
            "fable" => Ok(Voice::Fable),
            "onyx" => Ok(Voice::Onyx),
            "nova" => Ok(Voice::Nova),
            "shimmer" => Ok(Voice::Shimmer),
            other => Err(SynthesisProviderError::InvalidVoice(format!(
                "unknown OpenAI voice: {other}"
            ))),
        }
    }

    fn classify_error(message: String) -> SynthesisProviderError {
        let lower = message.to_lowercase();
        if lower.contains("quota") || lower.contains("insufficient_quota") {
            SynthesisProviderError::QuotaExceeded(message)
        } else if lower.contains("rate limit") || lower.contains("429") || lower.contains("timeout")
        {
            SynthesisProviderError::Transient(message)
        } else {
            SynthesisProviderError::Unavailable(message)
        }
    }
}

#[async_trait]
impl SynthesisRepository for OpenAiSynthesisRepository {
    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceProfile,
    ) -> Result<Vec<u8>, SynthesisProviderError> {
        let start_time = std::time::Instant::now();
        let voice_enum = Self::parse_voice(&voice.voice_id)?;

        let model = match self.model.as_str() {
            "tts-1" => SpeechModel::Tts1,
            "tts-1-hd" => SpeechModel::Tts1Hd,
            other => SpeechModel::Other(other.to_string()),
        };

        tracing::info!(
            model = %self.model,
            voice = %voice.voice_id,
            text_length = text.len(),
            text_preview = text_preview(text),
            "Calling OpenAI TTS API"
        );

        let request = CreateSpeechRequest {
            model,
            input: text.to_string(),
            voice: voice_enum,
            response_format: None, // Defaults to MP3
            speed: None,           // Defaults to 1.0
        };

        let response = self.client.audio().speech(request).await.map_err(|e| {
            tracing::error!(
                error = %e,
                model = %self.model,
                voice = %voice.voice_id,
                text_length = text.len(),
                "OpenAI TTS API call failed"
            );
            Self::classify_error(e.to_string())
        })?;

        let audio_bytes = response.bytes.to_vec();

        tracing::info!(
            provider = "openai",
            model = %self.model,
            voice = %voice.voice_id,
            latency_ms = start_time.elapsed().as_millis() as u64,
            characters_count = text.len(),
            audio_size_bytes = audio_bytes.len(),
            "Utterance synthesis completed"
        );

        Ok(audio_bytes)
    }
}
