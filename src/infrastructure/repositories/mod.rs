pub mod completion_repository;
pub mod content_repository;
pub mod fs_segment_store;
pub mod http_content_repository;
pub mod openai_completion_repository;
pub mod openai_synthesis_repository;
pub mod polly_synthesis_repository;
pub mod segment_store;
pub mod synthesis_repository;

pub use completion_repository::{CompletionError, CompletionRepository};
pub use content_repository::{ContentRepository, FetchError};
pub use fs_segment_store::FsSegmentStore;
pub use http_content_repository::HttpContentRepository;
pub use openai_completion_repository::OpenAiCompletionRepository;
pub use openai_synthesis_repository::OpenAiSynthesisRepository;
pub use polly_synthesis_repository::PollySynthesisRepository;
pub use segment_store::{SegmentStore, StoreError};
pub use synthesis_repository::{SynthesisProviderError, SynthesisRepository};
