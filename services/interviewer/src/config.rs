//! Interviewer configuration, loaded from the environment.

use lune_core::generator::RequestEffort;
use lune_core::prompts::{PERSONA, Prompts, TRANSCRIPTION_VOCABULARY};
use lune_core::session_state::InterviewConfig;
use openai_realtime::types::audio::{TranscriptionModel, Voice};
use secrecy::SecretString;
use std::path::PathBuf;

/// The size of each audio chunk sent from the microphone input stream.
pub const INPUT_CHUNK_SIZE: usize = 1024;
/// The size of each audio chunk for the audio output stream.
pub const OUTPUT_CHUNK_SIZE: usize = 1024;
/// The latency for the output audio buffer in milliseconds.
pub const OUTPUT_LATENCY_MS: usize = 1000;
/// Capacity of the realtime client's event channels.
pub const EVENT_CAPACITY: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: SecretString,
    pub realtime_model: String,
    pub voice: Voice,
    pub transcription_model: TranscriptionModel,
    /// Base URL of the interview API, without a trailing slash.
    pub api_base_url: String,
    pub transcript_dir: PathBuf,
    pub prompts_dir: PathBuf,
    pub report_model: String,
    pub report_fallback_model: String,
    pub reasoning_effort: RequestEffort,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// *   `OPENAI_API_KEY`: required, used to mint a client secret per interview.
    /// *   `REALTIME_MODEL`: defaults to "gpt-realtime".
    /// *   `REALTIME_VOICE`: defaults to "shimmer".
    /// *   `TRANSCRIPTION_MODEL`: defaults to "gpt-4o-transcribe".
    /// *   `API_BASE_URL`: where finalize is posted, defaults to "http://127.0.0.1:3000".
    /// *   `TRANSCRIPT_DIR`: CSV exports, defaults to "transcripts".
    /// *   `PROMPTS_DIR`: defaults to "prompts".
    /// *   `REPORT_MODEL` / `REPORT_FALLBACK_MODEL` / `REPORT_REASONING_EFFORT`: used by the MCP server.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let var = |key: &str, default: &str| non_empty(key).unwrap_or_else(|| default.to_string());

        let openai_api_key = non_empty("OPENAI_API_KEY")
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))?;

        let reasoning_effort = var("REPORT_REASONING_EFFORT", "medium")
            .parse::<RequestEffort>()
            .map_err(|e| ConfigError::InvalidValue("REPORT_REASONING_EFFORT".to_string(), e))?;

        // Both parsers are infallible and keep unknown names as custom values.
        let voice = var("REALTIME_VOICE", "shimmer")
            .parse::<Voice>()
            .unwrap_or(Voice::Shimmer);
        let transcription_model = var("TRANSCRIPTION_MODEL", "gpt-4o-transcribe")
            .parse::<TranscriptionModel>()
            .unwrap_or(TranscriptionModel::Gpt4oTranscribe);

        Ok(Self {
            openai_api_key,
            realtime_model: var("REALTIME_MODEL", "gpt-realtime"),
            voice,
            transcription_model,
            api_base_url: var("API_BASE_URL", "http://127.0.0.1:3000")
                .trim_end_matches('/')
                .to_string(),
            transcript_dir: PathBuf::from(var("TRANSCRIPT_DIR", "transcripts")),
            prompts_dir: PathBuf::from(var("PROMPTS_DIR", "prompts")),
            report_model: var("REPORT_MODEL", "gpt-5.2"),
            report_fallback_model: var("REPORT_FALLBACK_MODEL", "gpt-5-mini"),
            reasoning_effort,
        })
    }

    /// The controller configuration for every interview attempt in this process.
    pub fn interview_config(&self, prompts: &Prompts) -> InterviewConfig {
        InterviewConfig {
            instructions: prompts.interviewer.clone(),
            persona: Some(PERSONA.to_string()),
            model: self.realtime_model.clone(),
            voice: self.voice.clone(),
            transcription_model: self.transcription_model.clone(),
            transcription_prompt: TRANSCRIPTION_VOCABULARY.to_string(),
        }
    }
}
