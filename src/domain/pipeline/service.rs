use super::error::PipelineError;
use super::task::{CancelSignal, Degradation, TaskRegistry, TaskSnapshot, TaskState};
use crate::domain::audio::{PodcastArtifact, SynthesisError, VoiceMap, VoiceSynthesizer};
use crate::domain::script::{
    normalize, parse_script, AiScripter, BaselineScripter, DialogueScripter, RawContent,
    ScriptingError,
};
use crate::infrastructure::repositories::ContentRepository;
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use uuid::Uuid;

/// Progress floor per stage; synthesis fills the band up to 95.
const PROGRESS_FETCHING: u8 = 5;
const PROGRESS_SCRIPTING: u8 = 20;
const PROGRESS_SYNTHESIZING: u8 = 30;
const PROGRESS_ASSEMBLING: u8 = 95;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Tasks running at once across the whole service.
    pub max_concurrent_tasks: usize,
    pub fetch_timeout: Duration,
    pub scripting_timeout: Duration,
    pub synthesis_timeout: Duration,
    /// Pause accounted between turns of different speakers.
    pub utterance_pause_ms: u64,
    /// Voices used when a request does not pick its own.
    pub default_voices: VoiceMap,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 4,
            fetch_timeout: Duration::from_secs(30),
            scripting_timeout: Duration::from_secs(120),
            synthesis_timeout: Duration::from_secs(600),
            utterance_pause_ms: 400,
            default_voices: VoiceMap::default(),
        }
    }
}

/// Where the prose comes from: inline text or a URL resolved through the
/// content repository.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum ContentSource {
    Inline { text: String, source_ref: String },
    Remote { url: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitRequest {
    pub source: ContentSource,
    #[serde(default)]
    pub voices: Option<VoiceMap>,
}

/// Outcome of an artifact lookup.
pub enum ArtifactStatus {
    Ready(Arc<PodcastArtifact>),
    NotReady(TaskSnapshot),
    Failed(String),
    NotFound,
}

/// Drives the whole pipeline per task and owns the task registry,
/// cancellation, and the retry-vs-fallback-vs-fail policy.
pub struct PipelineService {
    content: Arc<dyn ContentRepository>,
    ai_scripter: Option<Arc<AiScripter>>,
    baseline_scripter: BaselineScripter,
    synthesizer: Arc<VoiceSynthesizer>,
    registry: Arc<TaskRegistry>,
    task_permits: Arc<Semaphore>,
    options: PipelineOptions,
}

impl PipelineService {
    pub fn new(
        content: Arc<dyn ContentRepository>,
        ai_scripter: Option<Arc<AiScripter>>,
        synthesizer: Arc<VoiceSynthesizer>,
        registry: Arc<TaskRegistry>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            content,
            ai_scripter,
            baseline_scripter: BaselineScripter,
            synthesizer,
            registry,
            task_permits: Arc::new(Semaphore::new(options.max_concurrent_tasks)),
            options,
        }
    }

    /// Register a task and schedule its pipeline run.
    pub fn submit(self: &Arc<Self>, request: SubmitRequest) -> Result<Uuid, PipelineError> {
        let task = self.registry.create().ok_or(PipelineError::Busy)?;
        let task_id = task.id;

        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut cancel = task.cancel_signal();

            // The global concurrency bound; a cancel while queued must not
            // leave the task waiting on a permit.
            let permit = tokio::select! {
                permit = service.task_permits.clone().acquire_owned() => permit,
                _ = cancel.cancelled() => {
                    task.fail("cancelled");
                    return;
                }
            };
            let _permit = match permit {
                Ok(permit) => permit,
                Err(_) => {
                    task.fail("scheduler shut down");
                    return;
                }
            };

            match service.run(&task, request).await {
                Ok(artifact) => task.complete(artifact),
                Err(PipelineError::Cancelled) => task.fail("cancelled"),
                Err(e) => task.fail(e.to_string()),
            }
        });

        Ok(task_id)
    }

    pub fn status(&self, id: Uuid) -> Option<TaskSnapshot> {
        self.registry.get(id).map(|task| task.snapshot())
    }

    pub fn artifact(&self, id: Uuid) -> ArtifactStatus {
        let Some(task) = self.registry.get(id) else {
            return ArtifactStatus::NotFound;
        };
        let snapshot = task.snapshot();
        match snapshot.state {
            TaskState::Completed => match task.artifact() {
                Some(artifact) => ArtifactStatus::Ready(artifact),
                None => ArtifactStatus::Failed("artifact missing".to_string()),
            },
            TaskState::Failed => ArtifactStatus::Failed(
                snapshot.error.unwrap_or_else(|| "unknown failure".to_string()),
            ),
            _ => ArtifactStatus::NotReady(snapshot),
        }
    }

    /// Request cooperative cancellation. Returns false for unknown ids.
    pub fn cancel(&self, id: Uuid) -> bool {
        match self.registry.get(id) {
            Some(task) => {
                task.request_cancel();
                tracing::info!(task_id = %id, "Task cancellation requested");
                true
            }
            None => false,
        }
    }
}

impl PipelineService {
    async fn run(
        &self,
        task: &Arc<crate::domain::pipeline::TaskHandle>,
        request: SubmitRequest,
    ) -> Result<Arc<PodcastArtifact>, PipelineError> {
        let voices = request
            .voices
            .unwrap_or_else(|| self.options.default_voices.clone());

        // Fetch
        task.set_state(TaskState::Fetching, "fetching content");
        task.set_progress(PROGRESS_FETCHING);
        let raw = self.fetch_stage(task, request.source).await?;

        let normalized = normalize(&raw);
        if normalized.is_empty() {
            return Err(PipelineError::NoContent);
        }

        // Script
        task.set_state(TaskState::Scripting, "writing dialogue script");
        task.set_progress(PROGRESS_SCRIPTING);
        let tagged = self.scripting_stage(task, &normalized).await?;

        let script = parse_script(&tagged);
        if script.is_empty() {
            return Err(PipelineError::EmptyScript);
        }

        // Synthesize
        task.set_state(
            TaskState::Synthesizing,
            format!("synthesizing {} utterances", script.len()),
        );
        task.set_progress(PROGRESS_SYNTHESIZING);

        let progress_task = task.clone();
        let on_progress = move |done: usize, total: usize| {
            let band = (PROGRESS_ASSEMBLING - PROGRESS_SYNTHESIZING) as usize;
            let progress = PROGRESS_SYNTHESIZING as usize + done * band / total.max(1);
            progress_task.set_progress(progress as u8);
        };

        let inner_cancel = task.cancel_signal();
        let mut stage_cancel = task.cancel_signal();
        let outcome = match stage(
            "synthesis",
            self.options.synthesis_timeout,
            &mut stage_cancel,
            self.synthesizer
                .synthesize_script(&script, &voices, &inner_cancel, &on_progress),
        )
        .await
        {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(SynthesisError::Cancelled)) => return Err(PipelineError::Cancelled),
            Ok(Err(e)) => return Err(PipelineError::Synthesis(e)),
            Err(e) => return Err(e),
        };

        if outcome.substituted_voices > 0 {
            task.add_degradation(Degradation::VoiceSubstituted);
        }

        // Assemble
        task.set_state(TaskState::Assembling, "assembling artifact");
        task.set_progress(PROGRESS_ASSEMBLING);
        let artifact = PodcastArtifact::assemble(
            &outcome.segments,
            &script,
            self.options.utterance_pause_ms,
            raw.source_ref.clone(),
        );

        tracing::info!(
            task_id = %task.id,
            segments = artifact.segment_count,
            duration_ms = artifact.total_duration_ms,
            "Podcast artifact assembled"
        );

        Ok(Arc::new(artifact))
    }

    async fn fetch_stage(
        &self,
        task: &Arc<crate::domain::pipeline::TaskHandle>,
        source: ContentSource,
    ) -> Result<RawContent, PipelineError> {
        match source {
            ContentSource::Inline { text, source_ref } => Ok(RawContent::new(text, source_ref)),
            ContentSource::Remote { url } => {
                let mut cancel = task.cancel_signal();
                let fetched = stage(
                    "fetch",
                    self.options.fetch_timeout,
                    &mut cancel,
                    self.content.fetch(&url),
                )
                .await?;
                fetched.map_err(|e| PipelineError::Fetch(e.to_string()))
            }
        }
    }

    /// AI scripting with baseline fallback. The fallback is degraded, not
    /// fatal: a missing or exhausted AI provider never fails the task.
    async fn scripting_stage(
        &self,
        task: &Arc<crate::domain::pipeline::TaskHandle>,
        normalized: &crate::domain::script::NormalizedText,
    ) -> Result<String, PipelineError> {
        if let Some(ai) = &self.ai_scripter {
            let mut cancel = task.cancel_signal();
            match stage(
                "scripting",
                self.options.scripting_timeout,
                &mut cancel,
                ai.write_script(normalized),
            )
            .await
            {
                Ok(Ok(tagged)) => return Ok(tagged),
                Ok(Err(ScriptingError::Unavailable(msg))) => {
                    tracing::warn!(
                        task_id = %task.id,
                        reason = %msg,
                        "AI scripting unavailable; falling back to baseline"
                    );
                }
                Err(PipelineError::Cancelled) => return Err(PipelineError::Cancelled),
                Err(PipelineError::StageTimeout(_)) => {
                    tracing::warn!(
                        task_id = %task.id,
                        "AI scripting timed out; falling back to baseline"
                    );
                }
                Err(e) => return Err(e),
            }
        } else {
            tracing::info!(task_id = %task.id, "AI scripting not configured; using baseline");
        }

        task.add_degradation(Degradation::AiEnhancementUnavailable);
        Ok(self.baseline_scripter.write_script(normalized).await?)
    }
}

/// Run one pipeline stage under its own timeout, aborting promptly on
/// cancellation.
async fn stage<T>(
    name: &'static str,
    timeout: Duration,
    cancel: &mut CancelSignal,
    fut: impl Future<Output = T>,
) -> Result<T, PipelineError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(PipelineError::Cancelled),
        result = tokio::time::timeout(timeout, fut) => {
            result.map_err(|_| PipelineError::StageTimeout(name))
        }
    }
}
