pub mod error;
pub mod service;
pub mod task;

pub use error::PipelineError;
pub use service::{
    ArtifactStatus, ContentSource, PipelineOptions, PipelineService, SubmitRequest,
};
pub use task::{CancelSignal, Degradation, TaskHandle, TaskRegistry, TaskSnapshot, TaskState};
