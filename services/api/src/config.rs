use lune_core::generator::RequestEffort;
use secrecy::SecretString;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Where interview records are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    File,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// Optional at boot; `/token` and finalize answer 500 without it.
    pub openai_api_key: Option<SecretString>,
    pub report_model: String,
    pub report_fallback_model: String,
    pub reasoning_effort: RequestEffort,
    pub data_dir: PathBuf,
    pub store_backend: StoreBackend,
    pub store_ttl: Duration,
    pub prompts_dir: PathBuf,
}

impl Config {
    /// Loads configuration from the process environment and an optional `.env`.
    ///
    /// *   `BIND_ADDRESS`: defaults to "0.0.0.0:3000".
    /// *   `OPENAI_API_KEY`: used for token minting and report generation.
    /// *   `REPORT_MODEL` / `REPORT_FALLBACK_MODEL`: default "gpt-5.2" / "gpt-5-mini".
    /// *   `REPORT_REASONING_EFFORT`: one of "minimal", "low", "medium" (default), "high".
    /// *   `DATA_DIR`: root of the file store, defaults to "data".
    /// *   `STORE_BACKEND`: "file" (default) or "memory".
    /// *   `STORE_TTL_SECS`: record lifetime for the memory backend, defaults to 7200.
    /// *   `PROMPTS_DIR`: defaults to "prompts".
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let invalid = |key: &str, reason: String| ConfigError::InvalidValue(key.to_string(), reason);

        let bind_address = var("BIND_ADDRESS", "0.0.0.0:3000")
            .parse::<SocketAddr>()
            .map_err(|e| invalid("BIND_ADDRESS", e.to_string()))?;

        let openai_api_key = lookup("OPENAI_API_KEY")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(SecretString::from);

        let reasoning_effort = var("REPORT_REASONING_EFFORT", "medium")
            .parse::<RequestEffort>()
            .map_err(|e| invalid("REPORT_REASONING_EFFORT", e))?;

        let store_backend = match var("STORE_BACKEND", "file").to_lowercase().as_str() {
            "file" => StoreBackend::File,
            "memory" => StoreBackend::Memory,
            other => {
                return Err(invalid(
                    "STORE_BACKEND",
                    format!("'{}' is not one of file, memory", other),
                ));
            }
        };

        let ttl_secs = var("STORE_TTL_SECS", "7200")
            .parse::<u64>()
            .map_err(|e| invalid("STORE_TTL_SECS", e.to_string()))?;

        Ok(Self {
            bind_address,
            openai_api_key,
            report_model: var("REPORT_MODEL", "gpt-5.2"),
            report_fallback_model: var("REPORT_FALLBACK_MODEL", "gpt-5-mini"),
            reasoning_effort,
            data_dir: PathBuf::from(var("DATA_DIR", "data")),
            store_backend,
            store_ttl: Duration::from_secs(ttl_secs),
            prompts_dir: PathBuf::from(var("PROMPTS_DIR", "prompts")),
        })
    }
}
