use serde::{Deserialize, Serialize};
use std::fmt;

/// The two dialogue roles the pipeline produces audio for.
///
/// Unattributed text falls back to the narrator role, which maps to the host
/// voice so every utterance stays resolvable through a [`VoiceMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Host,
    Expert,
}

impl Speaker {
    /// Marker used in speaker-tagged script text, e.g. `HOST:`.
    pub fn marker(&self) -> &'static str {
        match self {
            Speaker::Host => "HOST",
            Speaker::Expert => "EXPERT",
        }
    }

    /// Parse a marker token (without the trailing colon), case-insensitive.
    pub fn from_marker(token: &str) -> Option<Speaker> {
        match token.to_ascii_uppercase().as_str() {
            "HOST" => Some(Speaker::Host),
            "EXPERT" => Some(Speaker::Expert),
            _ => None,
        }
    }

    /// Role assigned to text that carries no speaker markers at all.
    pub fn narrator() -> Speaker {
        Speaker::Host
    }

    pub fn other(&self) -> Speaker {
        match self {
            Speaker::Host => Speaker::Expert,
            Speaker::Expert => Speaker::Host,
        }
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.marker())
    }
}

/// One contiguous turn of a single speaker within a script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utterance {
    pub speaker: Speaker,
    pub text: String,
    /// Optional delivery hint (e.g. "conversational") overriding the voice
    /// profile's default style for this turn only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style_hint: Option<String>,
}

impl Utterance {
    pub fn new(speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            speaker,
            text: text.into(),
            style_hint: None,
        }
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Ordered, non-empty sequence of utterances ready for synthesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    pub utterances: Vec<Utterance>,
}

impl Script {
    pub fn new(utterances: Vec<Utterance>) -> Self {
        Self { utterances }
    }

    pub fn len(&self) -> usize {
        self.utterances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utterances.is_empty()
    }

    pub fn word_count(&self) -> usize {
        self.utterances.iter().map(Utterance::word_count).sum()
    }

    /// Serialize back to speaker-tagged text. Parsing the output with
    /// [`super::parser::parse_script`] yields an equal utterance sequence.
    pub fn to_tagged_text(&self) -> String {
        let mut out = String::new();
        for utterance in &self.utterances {
            out.push_str(utterance.speaker.marker());
            out.push_str(": ");
            out.push_str(&utterance.text);
            out.push_str("\n\n");
        }
        out
    }
}

/// Raw prose handed to the pipeline, before normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawContent {
    pub text: String,
    /// Where the text came from (URL or caller-supplied label), carried
    /// through to the artifact metadata.
    pub source_ref: String,
}

impl RawContent {
    pub fn new(text: impl Into<String>, source_ref: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source_ref: source_ref.into(),
        }
    }
}

/// Classification of a normalized block, used by the baseline scripter to
/// pick dialogue templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Prose,
    Heading,
    Table,
}

/// One normalized paragraph-level block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub text: String,
    pub kind: BlockKind,
}

/// Output of the text normalizer: speakable blocks in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedText {
    pub blocks: Vec<Block>,
}

impl NormalizedText {
    pub fn is_empty(&self) -> bool {
        self.blocks.iter().all(|b| b.text.trim().is_empty())
    }

    /// Flatten to plain prose for prompt construction.
    pub fn to_plain_text(&self) -> String {
        self.blocks
            .iter()
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
