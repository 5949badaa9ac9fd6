use crate::domain::audio::PodcastArtifact;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

/// Pipeline task state machine. `Failed` is reachable from every
/// non-terminal state; the orchestrator is the only writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Queued,
    Fetching,
    Scripting,
    Synthesizing,
    Assembling,
    Completed,
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Queued => "queued",
            TaskState::Fetching => "fetching",
            TaskState::Scripting => "scripting",
            TaskState::Synthesizing => "synthesizing",
            TaskState::Assembling => "assembling",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Non-fatal fallback recorded on a task: the run finished, but not the way
/// it was asked to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Degradation {
    AiEnhancementUnavailable,
    VoiceSubstituted,
}

impl Degradation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Degradation::AiEnhancementUnavailable => "ai_enhancement_unavailable",
            Degradation::VoiceSubstituted => "voice_substituted",
        }
    }
}

/// Cooperative cancellation handle cloned into every blocking stage.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves when the owning task is cancelled. If the task handle is
    /// gone the signal can never fire, so this pends forever.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Caller-visible view of a task, cloned out under the lock.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub id: Uuid,
    pub state: TaskState,
    pub progress: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub degradations: Vec<Degradation>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

struct TaskInner {
    state: TaskState,
    progress: u8,
    message: String,
    error: Option<String>,
    degradations: Vec<Degradation>,
    artifact: Option<Arc<PodcastArtifact>>,
    updated_at: DateTime<Utc>,
}

/// One submitted pipeline run. State and progress are mutated only by the
/// orchestrator; everyone else reads snapshots.
pub struct TaskHandle {
    pub id: Uuid,
    created_at: DateTime<Utc>,
    inner: RwLock<TaskInner>,
    cancel_tx: watch::Sender<bool>,
}

impl TaskHandle {
    pub fn new() -> Arc<Self> {
        let (cancel_tx, _) = watch::channel(false);
        Arc::new(Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            inner: RwLock::new(TaskInner {
                state: TaskState::Queued,
                progress: 0,
                message: "queued".to_string(),
                error: None,
                degradations: Vec::new(),
                artifact: None,
                updated_at: Utc::now(),
            }),
            cancel_tx,
        })
    }

    pub fn cancel_signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.cancel_tx.subscribe(),
        }
    }

    /// Request cooperative cancellation. The orchestrator observes the
    /// signal and moves the task to `Failed` with reason `cancelled`.
    pub fn request_cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    pub fn is_cancel_requested(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    pub fn set_state(&self, state: TaskState, message: impl Into<String>) {
        let mut inner = self.inner.write();
        if inner.state.is_terminal() {
            return;
        }
        inner.state = state;
        inner.message = message.into();
        inner.updated_at = Utc::now();
        tracing::debug!(task_id = %self.id, state = %state, "Task state changed");
    }

    /// Progress only ever moves forward.
    pub fn set_progress(&self, progress: u8) {
        let mut inner = self.inner.write();
        if inner.state.is_terminal() {
            return;
        }
        let clamped = progress.min(100);
        if clamped > inner.progress {
            inner.progress = clamped;
            inner.updated_at = Utc::now();
        }
    }

    pub fn add_degradation(&self, degradation: Degradation) {
        let mut inner = self.inner.write();
        if !inner.degradations.contains(&degradation) {
            inner.degradations.push(degradation);
        }
        inner.message = format!("Degraded: {}", degradation.as_str());
        inner.updated_at = Utc::now();
        tracing::warn!(
            task_id = %self.id,
            degradation = degradation.as_str(),
            "Task degraded"
        );
    }

    pub fn complete(&self, artifact: Arc<PodcastArtifact>) {
        let mut inner = self.inner.write();
        if inner.state.is_terminal() {
            return;
        }
        inner.state = TaskState::Completed;
        inner.progress = 100;
        inner.message = "completed".to_string();
        inner.artifact = Some(artifact);
        inner.updated_at = Utc::now();
        tracing::info!(task_id = %self.id, "Task completed");
    }

    pub fn fail(&self, reason: impl Into<String>) {
        let mut inner = self.inner.write();
        if inner.state.is_terminal() {
            return;
        }
        let reason = reason.into();
        inner.state = TaskState::Failed;
        inner.message = "failed".to_string();
        inner.error = Some(reason.clone());
        inner.updated_at = Utc::now();
        tracing::warn!(task_id = %self.id, reason = %reason, "Task failed");
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        let inner = self.inner.read();
        TaskSnapshot {
            id: self.id,
            state: inner.state,
            progress: inner.progress,
            message: inner.message.clone(),
            error: inner.error.clone(),
            degradations: inner.degradations.clone(),
            created_at: self.created_at,
            updated_at: inner.updated_at,
        }
    }

    pub fn artifact(&self) -> Option<Arc<PodcastArtifact>> {
        self.inner.read().artifact.clone()
    }

    fn is_expired(&self, retention: Duration) -> bool {
        let inner = self.inner.read();
        if !inner.state.is_terminal() {
            return false;
        }
        let age = Utc::now().signed_duration_since(inner.updated_at);
        age.to_std().map(|age| age >= retention).unwrap_or(false)
    }
}

/// Registry of live tasks, keyed by id.
pub struct TaskRegistry {
    tasks: RwLock<HashMap<Uuid, Arc<TaskHandle>>>,
    max_tasks: usize,
    retention: Duration,
    cleanup_interval: Duration,
}

impl TaskRegistry {
    pub fn new(max_tasks: usize, retention: Duration, cleanup_interval: Duration) -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            max_tasks,
            retention,
            cleanup_interval,
        }
    }

    /// Register a new task. Fails when the registry is at capacity and
    /// nothing is expired enough to make room.
    pub fn create(&self) -> Option<Arc<TaskHandle>> {
        let mut tasks = self.tasks.write();

        if tasks.len() >= self.max_tasks {
            self.cleanup_expired_internal(&mut tasks);
            if tasks.len() >= self.max_tasks {
                return None;
            }
        }

        let task = TaskHandle::new();
        tasks.insert(task.id, task.clone());
        tracing::info!(task_id = %task.id, "Task registered");
        Some(task)
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<TaskHandle>> {
        self.tasks.read().get(&id).cloned()
    }

    pub fn count(&self) -> usize {
        self.tasks.read().len()
    }

    pub fn cleanup_expired(&self) {
        let mut tasks = self.tasks.write();
        self.cleanup_expired_internal(&mut tasks);
    }

    fn cleanup_expired_internal(&self, tasks: &mut HashMap<Uuid, Arc<TaskHandle>>) {
        let retention = self.retention;
        let expired: Vec<Uuid> = tasks
            .iter()
            .filter(|(_, t)| t.is_expired(retention))
            .map(|(id, _)| *id)
            .collect();

        for id in expired {
            tasks.remove(&id);
            tracing::info!(task_id = %id, "Archived expired task");
        }
    }

    /// Background sweep removing terminal tasks past their retention.
    /// Returns a shutdown sender for the sweep task.
    pub fn start_cleanup_task(self: &Arc<Self>) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let registry = Arc::clone(self);
        let interval = registry.cleanup_interval;

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            interval_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        let before = registry.count();
                        registry.cleanup_expired();
                        let after = registry.count();
                        if before != after {
                            tracing::info!(
                                removed = before - after,
                                remaining = after,
                                "Task registry cleanup"
                            );
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!("Task registry cleanup shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_registry(max: usize) -> TaskRegistry {
        TaskRegistry::new(max, Duration::from_secs(3600), Duration::from_secs(60))
    }

    #[test]
    fn test_task_lifecycle_states() {
        let task = TaskHandle::new();
        assert_eq!(task.snapshot().state, TaskState::Queued);

        task.set_state(TaskState::Fetching, "fetching content");
        task.set_state(TaskState::Scripting, "writing dialogue");
        assert_eq!(task.snapshot().state, TaskState::Scripting);
        assert_eq!(task.snapshot().message, "writing dialogue");
    }

    #[test]
    fn test_progress_is_monotonic() {
        let task = TaskHandle::new();
        task.set_progress(40);
        task.set_progress(25);
        assert_eq!(task.snapshot().progress, 40);

        task.set_progress(90);
        assert_eq!(task.snapshot().progress, 90);

        task.set_progress(250);
        assert_eq!(task.snapshot().progress, 100);
    }

    #[test]
    fn test_terminal_state_is_sticky() {
        let task = TaskHandle::new();
        task.fail("no content");
        task.set_state(TaskState::Synthesizing, "should be ignored");
        task.set_progress(99);

        let snapshot = task.snapshot();
        assert_eq!(snapshot.state, TaskState::Failed);
        assert_eq!(snapshot.error.as_deref(), Some("no content"));
        assert_ne!(snapshot.progress, 99);
    }

    #[test]
    fn test_degradation_is_recorded_and_visible() {
        let task = TaskHandle::new();
        task.add_degradation(Degradation::AiEnhancementUnavailable);
        task.add_degradation(Degradation::AiEnhancementUnavailable);

        let snapshot = task.snapshot();
        assert_eq!(snapshot.degradations.len(), 1);
        assert_eq!(snapshot.message, "Degraded: ai_enhancement_unavailable");
    }

    #[tokio::test]
    async fn test_cancel_signal_observed() {
        let task = TaskHandle::new();
        let mut signal = task.cancel_signal();
        assert!(!signal.is_cancelled());

        task.request_cancel();
        assert!(signal.is_cancelled());
        // Resolves immediately once cancelled.
        signal.cancelled().await;
    }

    #[test]
    fn test_registry_create_get_and_capacity() {
        let registry = test_registry(2);
        let a = registry.create().unwrap();
        let _b = registry.create().unwrap();

        assert!(registry.create().is_none(), "registry at capacity");
        assert_eq!(registry.count(), 2);
        assert_eq!(registry.get(a.id).unwrap().id, a.id);
    }

    #[test]
    fn test_registry_reclaims_expired_terminal_tasks() {
        let registry = TaskRegistry::new(1, Duration::ZERO, Duration::from_secs(60));
        let first = registry.create().unwrap();
        first.complete(Arc::new(crate::domain::audio::PodcastArtifact {
            audio: Vec::new(),
            total_duration_ms: 0,
            word_count: 0,
            segment_count: 0,
            source_ref: "test".to_string(),
        }));

        // Zero retention: the completed task makes room immediately.
        assert!(registry.create().is_some());
        assert!(registry.get(first.id).is_none());
    }
}
