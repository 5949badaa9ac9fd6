use crate::domain::audio::VoiceProfile;
use async_trait::async_trait;

/// Classified failure of the speech synthesis provider.
///
/// `Transient` is the only retryable class; the other three are terminal for
/// the attempted voice.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SynthesisProviderError {
    #[error("transient provider failure: {0}")]
    Transient(String),

    #[error("voice not recognized by provider: {0}")]
    InvalidVoice(String),

    #[error("provider quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

/// Byte budget for logged utterance previews.
const TEXT_PREVIEW_BYTES: usize = 200;

/// Longest prefix of `text` within the preview budget that ends on a char
/// boundary, so multibyte prose never splits mid-character.
pub(crate) fn text_preview(text: &str) -> &str {
    if text.len() <= TEXT_PREVIEW_BYTES {
        return text;
    }
    let mut end = TEXT_PREVIEW_BYTES;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Repository for speech synthesis.
/// Abstracts the underlying TTS provider (AWS Polly, OpenAI, etc.)
///
/// Implementations are responsible for:
/// - Handling provider-specific text length limitations
/// - Splitting long utterances into batches and merging the audio in order
/// - Mapping provider failures onto [`SynthesisProviderError`]
#[async_trait]
pub trait SynthesisRepository: Send + Sync {
    /// Synthesize one utterance with the given voice profile.
    ///
    /// Returns merged audio bytes ready for concatenation (MP3 format).
    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceProfile,
    ) -> Result<Vec<u8>, SynthesisProviderError>;
}
