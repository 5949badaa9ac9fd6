use super::cache::SegmentCache;
use super::error::SynthesisError;
use super::model::{AudioSegment, CacheKey, VoiceMap, VoiceProfile};
use crate::domain::pipeline::CancelSignal;
use crate::domain::script::{Script, Utterance};
use crate::infrastructure::repositories::SynthesisRepository;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Spoken-pace estimate shared with artifact duration accounting.
const CHARACTERS_PER_MINUTE: f64 = 1000.0;

/// Sample rate of provider MP3 output.
const SAMPLE_RATE_HZ: u32 = 22_050;

/// What to do when a voice fails persistently (invalid voice, quota).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisMode {
    /// Substitute the configured default voice and record a degradation.
    BestEffort,
    /// Fail the utterance, which fails the task.
    Strict,
}

#[derive(Debug, Clone)]
pub struct SynthesisOptions {
    /// Parallel provider calls per task.
    pub worker_limit: usize,
    /// Attempt budget per utterance for transient failures.
    pub max_attempts: u32,
    /// Base delay for exponential backoff between transient retries.
    pub initial_backoff: Duration,
    pub mode: SynthesisMode,
    /// Fallback profile used by best-effort substitution.
    pub default_voice: VoiceProfile,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            worker_limit: 4,
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            mode: SynthesisMode::BestEffort,
            default_voice: VoiceProfile::new("Joanna", "conversational"),
        }
    }
}

/// Per-script synthesis result, ordered by script position.
pub struct SynthesisOutcome {
    pub segments: Vec<Arc<AudioSegment>>,
    /// Utterances that fell back to the default voice.
    pub substituted_voices: usize,
}

/// Turns a script into ordered audio segments through the segment cache and
/// the synthesis provider.
pub struct VoiceSynthesizer {
    provider: Arc<dyn SynthesisRepository>,
    cache: Arc<SegmentCache>,
    options: SynthesisOptions,
}

impl VoiceSynthesizer {
    pub fn new(
        provider: Arc<dyn SynthesisRepository>,
        cache: Arc<SegmentCache>,
        options: SynthesisOptions,
    ) -> Self {
        Self {
            provider,
            cache,
            options,
        }
    }

    /// Synthesize every utterance with bounded concurrency.
    ///
    /// Workers run up to `worker_limit` provider calls in parallel; each
    /// result is indexed back to its script position, so assembly order
    /// never depends on completion order. `on_progress` receives
    /// `(completed, total)` as utterances finish.
    pub async fn synthesize_script(
        &self,
        script: &Script,
        voices: &VoiceMap,
        cancel: &CancelSignal,
        on_progress: &(dyn Fn(usize, usize) + Send + Sync),
    ) -> Result<SynthesisOutcome, SynthesisError> {
        let total = script.len();
        let semaphore = Arc::new(Semaphore::new(self.options.worker_limit));
        let mut join_set: JoinSet<(usize, Result<(Arc<AudioSegment>, bool), SynthesisError>)> =
            JoinSet::new();

        for (index, utterance) in script.utterances.iter().enumerate() {
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();
            let utterance = utterance.clone();
            let profile = voices.resolve(utterance.speaker).clone();
            let worker = self.worker_context();

            join_set.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return (index, Err(SynthesisError::Cancelled)),
                };
                if cancel.is_cancelled() {
                    return (index, Err(SynthesisError::Cancelled));
                }
                let result = worker.synthesize_one(&utterance, &profile, cancel).await;
                (index, result)
            });
        }

        let mut segments: Vec<Option<Arc<AudioSegment>>> = vec![None; total];
        let mut substituted_voices = 0usize;
        let mut completed = 0usize;

        while let Some(joined) = join_set.join_next().await {
            let (index, result) = joined
                .map_err(|e| SynthesisError::Unavailable(format!("synthesis worker panic: {e}")))?;
            match result {
                Ok((segment, substituted)) => {
                    segments[index] = Some(segment);
                    if substituted {
                        substituted_voices += 1;
                    }
                    completed += 1;
                    on_progress(completed, total);
                }
                Err(e) => {
                    join_set.abort_all();
                    return Err(e);
                }
            }
        }

        let segments = segments
            .into_iter()
            .map(|s| s.ok_or_else(|| SynthesisError::Unavailable("missing segment".into())))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::info!(
            utterances = total,
            substituted_voices = substituted_voices,
            "Script synthesis completed"
        );

        Ok(SynthesisOutcome {
            segments,
            substituted_voices,
        })
    }

    fn worker_context(&self) -> SynthesisWorker {
        SynthesisWorker {
            provider: self.provider.clone(),
            cache: self.cache.clone(),
            options: self.options.clone(),
        }
    }
}

/// Owned clone of the synthesizer's dependencies for spawned workers.
struct SynthesisWorker {
    provider: Arc<dyn SynthesisRepository>,
    cache: Arc<SegmentCache>,
    options: SynthesisOptions,
}

impl SynthesisWorker {
    /// Cache-or-synthesize one utterance. Returns the segment and whether
    /// the default voice was substituted.
    async fn synthesize_one(
        &self,
        utterance: &Utterance,
        profile: &VoiceProfile,
        cancel: CancelSignal,
    ) -> Result<(Arc<AudioSegment>, bool), SynthesisError> {
        let style = utterance
            .style_hint
            .as_deref()
            .unwrap_or(&profile.style_id)
            .to_string();
        let requested = VoiceProfile::new(profile.voice_id.clone(), style);

        match self.cached_synthesis(&utterance.text, &requested, cancel.clone()).await {
            Ok(segment) => Ok((segment, false)),
            Err(e) if e.is_persistent() && self.options.mode == SynthesisMode::BestEffort => {
                tracing::warn!(
                    voice = %requested.voice_id,
                    default_voice = %self.options.default_voice.voice_id,
                    error = %e,
                    "Persistent voice failure; substituting default voice"
                );
                let fallback = self.options.default_voice.clone();
                let segment = self
                    .cached_synthesis(&utterance.text, &fallback, cancel)
                    .await?;
                Ok((segment, true))
            }
            Err(e) => Err(e),
        }
    }

    /// Cache keys are derived from the voice actually used, so substituted
    /// audio never masquerades as the requested voice.
    async fn cached_synthesis(
        &self,
        text: &str,
        voice: &VoiceProfile,
        cancel: CancelSignal,
    ) -> Result<Arc<AudioSegment>, SynthesisError> {
        let key = CacheKey::for_request(text, &voice.voice_id, &voice.style_id);
        self.cache
            .get_or_synthesize(&key, self.call_provider_with_retry(text, voice, cancel))
            .await
    }

    async fn call_provider_with_retry(
        &self,
        text: &str,
        voice: &VoiceProfile,
        mut cancel: CancelSignal,
    ) -> Result<AudioSegment, SynthesisError> {
        let mut last_error = SynthesisError::Unavailable("no attempts made".into());

        for attempt in 1..=self.options.max_attempts {
            if cancel.is_cancelled() {
                return Err(SynthesisError::Cancelled);
            }

            let call = self.provider.synthesize(text, voice);
            let result = tokio::select! {
                result = call => result,
                _ = cancel.cancelled() => return Err(SynthesisError::Cancelled),
            };

            match result {
                Ok(bytes) => {
                    return Ok(AudioSegment::new(
                        bytes,
                        estimate_duration_ms(text),
                        SAMPLE_RATE_HZ,
                    ));
                }
                Err(e) => {
                    let classified = SynthesisError::from(e);
                    match classified {
                        SynthesisError::Transient(_) if attempt < self.options.max_attempts => {
                            let delay =
                                self.options.initial_backoff * 2u32.saturating_pow(attempt - 1);
                            tracing::warn!(
                                attempt = attempt,
                                delay_ms = delay.as_millis() as u64,
                                voice = %voice.voice_id,
                                "Transient synthesis failure; backing off"
                            );
                            tokio::select! {
                                _ = tokio::time::sleep(delay) => {}
                                _ = cancel.cancelled() => return Err(SynthesisError::Cancelled),
                            }
                            last_error = classified;
                        }
                        SynthesisError::Transient(_) => {
                            last_error = classified;
                        }
                        other => return Err(other),
                    }
                }
            }
        }

        Err(last_error)
    }
}

/// Duration estimate from character count at the assumed narration pace.
fn estimate_duration_ms(text: &str) -> u64 {
    (text.len() as f64 / CHARACTERS_PER_MINUTE * 60_000.0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::audio::cache::CacheOptions;
    use crate::domain::pipeline::TaskHandle;
    use crate::domain::script::Speaker;
    use crate::infrastructure::repositories::{
        SegmentStore, StoreError, SynthesisProviderError,
    };
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct MemStore {
        entries: Mutex<HashMap<CacheKey, AudioSegment>>,
    }

    #[async_trait]
    impl SegmentStore for MemStore {
        async fn load(&self, key: &CacheKey) -> Result<Option<AudioSegment>, StoreError> {
            Ok(self.entries.lock().get(key).cloned())
        }
        async fn save(&self, key: &CacheKey, segment: &AudioSegment) -> Result<(), StoreError> {
            self.entries.lock().insert(key.clone(), segment.clone());
            Ok(())
        }
        async fn remove(&self, key: &CacheKey) -> Result<(), StoreError> {
            self.entries.lock().remove(key);
            Ok(())
        }
        async fn prune(&self, _: Duration, _: usize) -> Result<usize, StoreError> {
            Ok(0)
        }
    }

    /// Provider that answers with the utterance text as bytes, optionally
    /// failing scripted voices.
    struct FakeProvider {
        calls: AtomicUsize,
        transient_failures_remaining: AtomicUsize,
        invalid_voices: Vec<String>,
        delay_ms: u64,
    }

    impl FakeProvider {
        fn ok() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                transient_failures_remaining: AtomicUsize::new(0),
                invalid_voices: Vec::new(),
                delay_ms: 0,
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SynthesisRepository for FakeProvider {
        async fn synthesize(
            &self,
            text: &str,
            voice: &VoiceProfile,
        ) -> Result<Vec<u8>, SynthesisProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            if self.invalid_voices.contains(&voice.voice_id) {
                return Err(SynthesisProviderError::InvalidVoice(voice.voice_id.clone()));
            }

            let remaining = self.transient_failures_remaining.load(Ordering::SeqCst);
            if remaining > 0 {
                self.transient_failures_remaining
                    .fetch_sub(1, Ordering::SeqCst);
                return Err(SynthesisProviderError::Transient("blip".into()));
            }

            if self.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            }
            Ok(format!("{}|{}", voice.voice_id, text).into_bytes())
        }
    }

    fn synthesizer(provider: Arc<FakeProvider>, options: SynthesisOptions) -> VoiceSynthesizer {
        let cache = Arc::new(SegmentCache::new(
            Arc::new(MemStore::default()),
            CacheOptions::default(),
        ));
        VoiceSynthesizer::new(provider, cache, options)
    }

    fn fast_options() -> SynthesisOptions {
        SynthesisOptions {
            initial_backoff: Duration::from_millis(1),
            ..SynthesisOptions::default()
        }
    }

    fn two_turn_script() -> Script {
        Script::new(vec![
            Utterance::new(Speaker::Host, "Welcome to the show."),
            Utterance::new(Speaker::Expert, "Happy to be here."),
        ])
    }

    fn no_progress() -> impl Fn(usize, usize) + Send + Sync {
        |_, _| {}
    }

    #[tokio::test]
    async fn test_segments_come_back_in_script_order() {
        // First utterance synthesizes slower than the second; order must
        // still follow the script.
        let provider = Arc::new(FakeProvider {
            delay_ms: 20,
            ..FakeProvider::ok()
        });
        let synthesizer = synthesizer(provider, fast_options());
        let script = two_turn_script();
        let task = TaskHandle::new();

        let outcome = synthesizer
            .synthesize_script(
                &script,
                &VoiceMap::default(),
                &task.cancel_signal(),
                &no_progress(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.segments.len(), 2);
        assert_eq!(
            outcome.segments[0].bytes,
            b"Joanna|Welcome to the show.".to_vec()
        );
        assert_eq!(
            outcome.segments[1].bytes,
            b"Matthew|Happy to be here.".to_vec()
        );
        assert_eq!(outcome.substituted_voices, 0);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let provider = Arc::new(FakeProvider {
            transient_failures_remaining: AtomicUsize::new(2),
            ..FakeProvider::ok()
        });
        let synthesizer = synthesizer(provider.clone(), fast_options());
        let script = Script::new(vec![Utterance::new(Speaker::Host, "Retry me.")]);
        let task = TaskHandle::new();

        let outcome = synthesizer
            .synthesize_script(
                &script,
                &VoiceMap::default(),
                &task.cancel_signal(),
                &no_progress(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.segments.len(), 1);
        assert_eq!(provider.call_count(), 3, "two transient failures, then success");
    }

    #[tokio::test]
    async fn test_best_effort_substitutes_default_voice() {
        let provider = Arc::new(FakeProvider {
            invalid_voices: vec!["Brianna".to_string()],
            ..FakeProvider::ok()
        });
        let options = SynthesisOptions {
            default_voice: VoiceProfile::new("Joanna", "conversational"),
            ..fast_options()
        };
        let synthesizer = synthesizer(provider, options);
        let script = Script::new(vec![Utterance::new(Speaker::Host, "Hello.")]);
        let voices = VoiceMap {
            host: VoiceProfile::new("Brianna", "neutral"),
            expert: VoiceProfile::new("Matthew", "neutral"),
        };
        let task = TaskHandle::new();

        let outcome = synthesizer
            .synthesize_script(&script, &voices, &task.cancel_signal(), &no_progress())
            .await
            .unwrap();

        assert_eq!(outcome.substituted_voices, 1);
        assert_eq!(outcome.segments[0].bytes, b"Joanna|Hello.".to_vec());
    }

    #[tokio::test]
    async fn test_strict_mode_fails_on_persistent_error() {
        let provider = Arc::new(FakeProvider {
            invalid_voices: vec!["Brianna".to_string()],
            ..FakeProvider::ok()
        });
        let options = SynthesisOptions {
            mode: SynthesisMode::Strict,
            ..fast_options()
        };
        let synthesizer = synthesizer(provider, options);
        let script = Script::new(vec![Utterance::new(Speaker::Host, "Hello.")]);
        let voices = VoiceMap {
            host: VoiceProfile::new("Brianna", "neutral"),
            expert: VoiceProfile::new("Matthew", "neutral"),
        };
        let task = TaskHandle::new();

        let result = synthesizer
            .synthesize_script(&script, &voices, &task.cancel_signal(), &no_progress())
            .await;

        assert!(matches!(result, Err(SynthesisError::InvalidVoice(_))));
    }

    #[tokio::test]
    async fn test_exhausted_transient_budget_surfaces_error() {
        let provider = Arc::new(FakeProvider {
            transient_failures_remaining: AtomicUsize::new(10),
            ..FakeProvider::ok()
        });
        let synthesizer = synthesizer(provider.clone(), fast_options());
        let script = Script::new(vec![Utterance::new(Speaker::Host, "Never works.")]);
        let task = TaskHandle::new();

        let result = synthesizer
            .synthesize_script(
                &script,
                &VoiceMap::default(),
                &task.cancel_signal(),
                &no_progress(),
            )
            .await;

        assert!(matches!(result, Err(SynthesisError::Transient(_))));
        assert_eq!(provider.call_count(), 3, "bounded attempt budget");
    }

    #[tokio::test]
    async fn test_cancellation_stops_synthesis() {
        let provider = Arc::new(FakeProvider {
            delay_ms: 200,
            ..FakeProvider::ok()
        });
        let synthesizer = synthesizer(provider, fast_options());
        let script = two_turn_script();
        let task = TaskHandle::new();
        let signal = task.cancel_signal();

        let cancel_after = {
            let task = task.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                task.request_cancel();
            })
        };

        let result = synthesizer
            .synthesize_script(&script, &VoiceMap::default(), &signal, &no_progress())
            .await;

        cancel_after.await.unwrap();
        assert!(matches!(result, Err(SynthesisError::Cancelled)));
    }

    #[tokio::test]
    async fn test_progress_reports_each_completion() {
        let provider = Arc::new(FakeProvider::ok());
        let synthesizer = synthesizer(provider, fast_options());
        let script = two_turn_script();
        let task = TaskHandle::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_cb = seen.clone();
        synthesizer
            .synthesize_script(
                &script,
                &VoiceMap::default(),
                &task.cancel_signal(),
                &move |done, total| seen_cb.lock().push((done, total)),
            )
            .await
            .unwrap();

        assert_eq!(*seen.lock(), vec![(1, 2), (2, 2)]);
    }
}
