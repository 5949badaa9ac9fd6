use crate::infrastructure::repositories::SynthesisProviderError;

/// Failure of utterance synthesis, after the synthesizer's bounded retries.
///
/// `Clone` because the cache fans one failure out to every caller waiting on
/// the same key.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SynthesisError {
    #[error("transient synthesis failure: {0}")]
    Transient(String),

    #[error("invalid voice: {0}")]
    InvalidVoice(String),

    #[error("synthesis quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("synthesis provider unavailable: {0}")]
    Unavailable(String),

    #[error("synthesis cancelled")]
    Cancelled,
}

impl SynthesisError {
    /// Persistent failures are the ones best-effort mode answers with a
    /// default-voice substitution.
    pub fn is_persistent(&self) -> bool {
        matches!(
            self,
            SynthesisError::InvalidVoice(_) | SynthesisError::QuotaExceeded(_)
        )
    }
}

impl From<SynthesisProviderError> for SynthesisError {
    fn from(err: SynthesisProviderError) -> Self {
        match err {
            SynthesisProviderError::Transient(msg) => SynthesisError::Transient(msg),
            SynthesisProviderError::InvalidVoice(msg) => SynthesisError::InvalidVoice(msg),
            SynthesisProviderError::QuotaExceeded(msg) => SynthesisError::QuotaExceeded(msg),
            SynthesisProviderError::Unavailable(msg) => SynthesisError::Unavailable(msg),
        }
    }
}
