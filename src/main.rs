use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use docucast_backend::domain::audio::{
    CacheOptions, SegmentCache, SynthesisMode, SynthesisOptions, VoiceMap, VoiceProfile,
    VoiceSynthesizer,
};
use docucast_backend::domain::pipeline::{PipelineOptions, PipelineService, TaskRegistry};
use docucast_backend::domain::script::{AiScripter, ScripterOptions};
use docucast_backend::infrastructure::config::{Config, LogFormat, TtsProvider};
use docucast_backend::infrastructure::http::start_http_server;
use docucast_backend::infrastructure::repositories::{
    CompletionRepository, FsSegmentStore, HttpContentRepository, OpenAiCompletionRepository,
    OpenAiSynthesisRepository, PollySynthesisRepository, SynthesisRepository,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    init_logging(&config);

    tracing::info!(
        "Starting DocuCast Backend on {}:{}",
        config.host,
        config.port
    );

    let config = Arc::new(config);

    // OpenAI client backs the dialogue scripter and, optionally, TTS
    let openai_client = config.openai_api_key.as_ref().map(|key| {
        Arc::new(async_openai::Client::with_config(
            async_openai::config::OpenAIConfig::new().with_api_key(key),
        ))
    });

    // === DEPENDENCY INJECTION SETUP ===
    // 1. Synthesis provider
    tracing::info!(provider = ?config.tts_provider, "Instantiating synthesis provider...");
    let (provider, provider_defaults): (Arc<dyn SynthesisRepository>, VoiceMap) =
        match config.tts_provider {
            TtsProvider::Polly => {
                tracing::info!(region = %config.aws_region, "Initializing AWS Polly client");

                let has_access_key = std::env::var("AWS_ACCESS_KEY_ID").is_ok();
                let has_secret_key = std::env::var("AWS_SECRET_ACCESS_KEY").is_ok();
                if !has_access_key || !has_secret_key {
                    tracing::warn!("AWS credentials not found in environment variables. Will attempt to use other credential providers (instance metadata, etc.)");
                }

                let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
                    .region(aws_config::Region::new(config.aws_region.clone()))
                    .load()
                    .await;
                let polly_client = Arc::new(aws_sdk_polly::Client::new(&aws_config));

                (
                    Arc::new(PollySynthesisRepository::new(polly_client)),
                    VoiceMap::default(),
                )
            }
            TtsProvider::OpenAi => {
                let client = openai_client
                    .clone()
                    .ok_or("TTS_PROVIDER=openai requires OPENAI_API_KEY")?;
                (
                    Arc::new(OpenAiSynthesisRepository::new(
                        client,
                        config.openai_tts_model.clone(),
                    )),
                    VoiceMap {
                        host: VoiceProfile::new("nova", "conversational"),
                        expert: VoiceProfile::new("onyx", "conversational"),
                    },
                )
            }
        };

    let mut default_voices = provider_defaults;
    if let Some(voice) = &config.host_voice {
        default_voices.host = VoiceProfile::new(voice.clone(), "conversational");
    }
    if let Some(voice) = &config.expert_voice {
        default_voices.expert = VoiceProfile::new(voice.clone(), "conversational");
    }

    // 2. Segment cache over the filesystem store
    tracing::info!(dir = %config.cache_dir, "Instantiating segment cache...");
    let store = Arc::new(FsSegmentStore::new(&config.cache_dir)?);
    let cache = Arc::new(SegmentCache::new(
        store,
        CacheOptions {
            disk_max_age: Duration::from_secs(config.cache_max_age_days * 24 * 3600),
            disk_max_entries: config.cache_max_entries,
            ..CacheOptions::default()
        },
    ));
    let _prune_shutdown = cache.start_prune_task();

    // 3. Synthesizer
    let synthesis_options = SynthesisOptions {
        mode: if config.synthesis_strict {
            SynthesisMode::Strict
        } else {
            SynthesisMode::BestEffort
        },
        default_voice: default_voices.host.clone(),
        ..SynthesisOptions::default()
    };
    let synthesizer = Arc::new(VoiceSynthesizer::new(provider, cache, synthesis_options));

    // 4. Scripter (AI when a key is configured, baseline fallback otherwise)
    let ai_scripter = openai_client.map(|client| {
        let completions: Arc<dyn CompletionRepository> = Arc::new(
            OpenAiCompletionRepository::new(client, config.openai_chat_model.clone()),
        );
        Arc::new(AiScripter::new(completions, ScripterOptions::default()))
    });
    if ai_scripter.is_none() {
        tracing::warn!("OPENAI_API_KEY not set; dialogue scripting will use the baseline writer");
    }

    // 5. Task registry with background expiry
    let registry = Arc::new(TaskRegistry::new(
        256,
        Duration::from_secs(3600),
        Duration::from_secs(60),
    ));
    let _cleanup_shutdown = registry.start_cleanup_task();

    // 6. Pipeline service
    tracing::info!("Instantiating pipeline service...");
    let content = Arc::new(HttpContentRepository::new(reqwest::Client::new()));
    let pipeline = Arc::new(PipelineService::new(
        content,
        ai_scripter,
        synthesizer,
        registry.clone(),
        PipelineOptions {
            max_concurrent_tasks: config.max_concurrent_tasks,
            default_voices,
            ..PipelineOptions::default()
        },
    ));

    // 7. Controller
    let podcast_controller = Arc::new(docucast_backend::controllers::PodcastController::new(
        pipeline,
    ));

    // Start HTTP server with all routes
    start_http_server(config, registry, podcast_controller).await?;

    Ok(())
}

fn init_logging(config: &Config) {
    if config.log_format == LogFormat::Json {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "docucast_backend=debug,tower_http=debug".into()),
            )
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "docucast_backend=debug,tower_http=debug".into()),
            )
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }
}
