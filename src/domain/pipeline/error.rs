use crate::domain::audio::SynthesisError;
use crate::domain::script::ScriptingError;

/// Fatal pipeline outcomes. Anything here moves the task to `Failed` with a
/// specific reason; degraded outcomes never take this path.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    #[error("no content to narrate")]
    NoContent,

    #[error("script contained no utterances")]
    EmptyScript,

    #[error("content fetch failed: {0}")]
    Fetch(String),

    #[error("scripting failed: {0}")]
    Scripting(#[from] ScriptingError),

    #[error("synthesis failed: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("{0} stage timed out")]
    StageTimeout(&'static str),

    #[error("cancelled")]
    Cancelled,

    #[error("too many concurrent tasks")]
    Busy,
}
