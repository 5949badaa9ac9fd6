/// Terminal scripting outcome, reported after the scripter's own bounded
/// retries are exhausted. The orchestrator decides whether this means
/// falling back to the baseline scripter or failing the task.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ScriptingError {
    #[error("ai enhancement unavailable: {0}")]
    Unavailable(String),
}
