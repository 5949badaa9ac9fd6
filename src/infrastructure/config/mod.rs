use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub environment: Environment,
    pub log_format: LogFormat,
    pub aws_region: String,
    // OpenAI
    pub openai_api_key: Option<String>,
    pub openai_chat_model: String,
    pub openai_tts_model: String,
    // Synthesis
    pub tts_provider: TtsProvider,
    pub synthesis_strict: bool,
    pub host_voice: Option<String>,
    pub expert_voice: Option<String>,
    // Segment cache
    pub cache_dir: String,
    pub cache_max_age_days: u64,
    pub cache_max_entries: usize,
    // Pipeline
    pub max_concurrent_tasks: usize,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum TtsProvider {
    Polly,
    OpenAi,
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::dotenv().ok();

        let config = Config {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()?,
            environment: env::var("ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string())
                .parse::<String>()
                .map(|s| match s.as_str() {
                    "production" => Environment::Production,
                    _ => Environment::Development,
                })?,
            log_format: env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .parse::<String>()
                .map(|s| match s.as_str() {
                    "json" => LogFormat::Json,
                    _ => LogFormat::Pretty,
                })?,
            aws_region: env::var("AWS_REGION").unwrap_or_else(|_| "eu-west-1".to_string()),
            openai_api_key: env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
            openai_chat_model: env::var("OPENAI_CHAT_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            openai_tts_model: env::var("OPENAI_TTS_MODEL").unwrap_or_else(|_| "tts-1".to_string()),
            tts_provider: env::var("TTS_PROVIDER")
                .unwrap_or_else(|_| "polly".to_string())
                .parse::<String>()
                .map(|s| match s.to_lowercase().as_str() {
                    "openai" => TtsProvider::OpenAi,
                    _ => TtsProvider::Polly,
                })?,
            synthesis_strict: env::var("SYNTHESIS_STRICT")
                .unwrap_or_else(|_| "false".to_string())
                .parse::<String>()
                .map(|s| s.to_lowercase() == "true")
                .unwrap_or(false),
            host_voice: env::var("HOST_VOICE").ok().filter(|v| !v.is_empty()),
            expert_voice: env::var("EXPERT_VOICE").ok().filter(|v| !v.is_empty()),
            cache_dir: env::var("CACHE_DIR").unwrap_or_else(|_| "./segment-cache".to_string()),
            cache_max_age_days: env::var("CACHE_MAX_AGE_DAYS")
                .unwrap_or_else(|_| "7".to_string())
                .parse()?,
            cache_max_entries: env::var("CACHE_MAX_ENTRIES")
                .unwrap_or_else(|_| "10000".to_string())
                .parse()?,
            max_concurrent_tasks: env::var("MAX_CONCURRENT_TASKS")
                .unwrap_or_else(|_| "4".to_string())
                .parse()?,
        };

        Ok(config)
    }

    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }
}
