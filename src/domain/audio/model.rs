use crate::domain::script::{Script, Speaker};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

/// Voice profile a speaker resolves to: provider voice name plus delivery
/// style identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceProfile {
    pub voice_id: String,
    pub style_id: String,
}

impl VoiceProfile {
    pub fn new(voice_id: impl Into<String>, style_id: impl Into<String>) -> Self {
        Self {
            voice_id: voice_id.into(),
            style_id: style_id.into(),
        }
    }
}

/// Mapping from the two dialogue roles to voice profiles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceMap {
    pub host: VoiceProfile,
    pub expert: VoiceProfile,
}

impl VoiceMap {
    pub fn resolve(&self, speaker: Speaker) -> &VoiceProfile {
        match speaker {
            Speaker::Host => &self.host,
            Speaker::Expert => &self.expert,
        }
    }
}

impl Default for VoiceMap {
    fn default() -> Self {
        Self {
            host: VoiceProfile::new("Joanna", "conversational"),
            expert: VoiceProfile::new("Matthew", "conversational"),
        }
    }
}

/// Content-addressed identity of one synthesis request.
///
/// SHA-256 over length-prefixed `(text, voice_id, style_id)`, so identical
/// logical inputs always map to the same key and no field concatenation can
/// collide with another.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn for_request(text: &str, voice_id: &str, style_id: &str) -> Self {
        let mut hasher = Sha256::new();
        for part in [text, voice_id, style_id] {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        Self(hex_digest(&hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// One synthesized utterance, immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSegment {
    pub bytes: Vec<u8>,
    pub duration_ms: u64,
    pub sample_rate: u32,
    /// SHA-256 of `bytes`; lets the store detect corruption on read.
    pub checksum: String,
}

impl AudioSegment {
    pub fn new(bytes: Vec<u8>, duration_ms: u64, sample_rate: u32) -> Self {
        let checksum = hex_digest(&Sha256::digest(&bytes));
        Self {
            bytes,
            duration_ms,
            sample_rate,
            checksum,
        }
    }

    /// Rebuild a segment from persisted parts without trusting the stored
    /// checksum; callers compare via [`AudioSegment::verify_checksum`].
    pub fn from_parts(
        bytes: Vec<u8>,
        duration_ms: u64,
        sample_rate: u32,
        checksum: String,
    ) -> Self {
        Self {
            bytes,
            duration_ms,
            sample_rate,
            checksum,
        }
    }

    pub fn verify_checksum(&self) -> bool {
        hex_digest(&Sha256::digest(&self.bytes)) == self.checksum
    }
}

/// Final assembled audio plus aggregate metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodcastArtifact {
    pub audio: Vec<u8>,
    pub total_duration_ms: u64,
    pub word_count: usize,
    pub segment_count: usize,
    pub source_ref: String,
}

impl PodcastArtifact {
    /// Concatenate segments in script order. A configured pause is accounted
    /// between adjacent turns of different speakers (every boundary after
    /// parser merging); segment order never depends on synthesis completion
    /// order because the synthesizer indexes results back to script
    /// positions.
    pub fn assemble(
        segments: &[Arc<AudioSegment>],
        script: &Script,
        pause_ms: u64,
        source_ref: impl Into<String>,
    ) -> Self {
        let mut audio = Vec::with_capacity(segments.iter().map(|s| s.bytes.len()).sum());
        let mut total_duration_ms = 0u64;

        for (index, segment) in segments.iter().enumerate() {
            if index > 0 {
                let previous = script.utterances[index - 1].speaker;
                let current = script.utterances[index].speaker;
                if previous != current {
                    total_duration_ms += pause_ms;
                }
            }
            audio.extend_from_slice(&segment.bytes);
            total_duration_ms += segment.duration_ms;
        }

        Self {
            audio,
            total_duration_ms,
            word_count: script.word_count(),
            segment_count: segments.len(),
            source_ref: source_ref.into(),
        }
    }
}
