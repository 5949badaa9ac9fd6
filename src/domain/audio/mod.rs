pub mod cache;
pub mod error;
pub mod model;
pub mod synthesizer;

pub use cache::{CacheOptions, SegmentCache};
pub use error::SynthesisError;
pub use model::{AudioSegment, CacheKey, PodcastArtifact, VoiceMap, VoiceProfile};
pub use synthesizer::{SynthesisMode, SynthesisOptions, SynthesisOutcome, VoiceSynthesizer};
