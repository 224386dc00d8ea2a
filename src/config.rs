//! Gateway configuration loaded from the environment.
//!
//! All knobs come from environment variables (optionally via a `.env`
//! file loaded at startup). Defaults are production-reasonable; values
//! are validated once at boot so misconfiguration fails fast.

use std::fmt::Display;
use std::str::FromStr;

use thiserror::Error;

use crate::core::providers::HttpSpeechConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    Invalid { key: String, message: String },

    #[error("{key} is required when {flag} is enabled")]
    Missing { key: String, flag: String },
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    // Server settings
    pub host: String,
    pub port: u16,
    /// CORS allowed origins (comma-separated list or "*" for all).
    /// None means same-origin only.
    pub cors_allowed_origins: Option<String>,

    // Admission rate limiting (fixed window, per origin)
    pub rate_limit_max_requests_per_window: u32,
    pub rate_limit_window_seconds: u64,

    // Streaming queue + workers
    pub session_queue_maxsize: usize,
    pub session_queue_worker_count: usize,

    /// How long terminal session records are retained in memory.
    pub session_retention_seconds: u64,

    // Circuit breaker
    pub circuit_failure_threshold: u32,
    pub circuit_reset_timeout_seconds: u64,
    pub circuit_half_open_max_trials: u32,

    // Provider pipeline
    pub provider_chunk_timeout_ms: u64,
    pub provider_max_attempts: u32,
    pub provider_retry_base_ms: u64,
    /// Require that the requested voice belongs to the requested provider.
    pub voice_provider_strict: bool,

    // Providers
    pub mock_tone_enabled: bool,
    pub http_speech: Option<HttpSpeechConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_allowed_origins: None,
            rate_limit_max_requests_per_window: 50,
            rate_limit_window_seconds: 60,
            session_queue_maxsize: 100,
            session_queue_worker_count: 8,
            session_retention_seconds: 600,
            circuit_failure_threshold: 5,
            circuit_reset_timeout_seconds: 30,
            circuit_half_open_max_trials: 1,
            provider_chunk_timeout_ms: 10_000,
            provider_max_attempts: 3,
            provider_retry_base_ms: 100,
            voice_provider_strict: false,
            mock_tone_enabled: true,
            http_speech: None,
        }
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for unset keys.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let http_speech = if env_flag("HTTP_SPEECH_ENABLED", false) {
            let url = env_opt("HTTP_SPEECH_URL").ok_or(ConfigError::Missing {
                key: "HTTP_SPEECH_URL".to_string(),
                flag: "HTTP_SPEECH_ENABLED".to_string(),
            })?;
            Some(HttpSpeechConfig {
                url,
                api_key: env_opt("HTTP_SPEECH_API_KEY"),
                voice_id: env_opt("HTTP_SPEECH_VOICE")
                    .unwrap_or_else(|| "http-speech-1".to_string()),
                language: env_opt("HTTP_SPEECH_LANGUAGE").unwrap_or_else(|| "en-US".to_string()),
                sample_rate_hz: env_parse("HTTP_SPEECH_SAMPLE_RATE_HZ", 22_050)?,
            })
        } else {
            None
        };

        let config = Self {
            host: env_opt("HOST").unwrap_or(defaults.host),
            port: env_parse("PORT", defaults.port)?,
            cors_allowed_origins: env_opt("CORS_ALLOWED_ORIGINS"),
            rate_limit_max_requests_per_window: env_parse(
                "RATE_LIMIT_MAX_REQUESTS_PER_WINDOW",
                defaults.rate_limit_max_requests_per_window,
            )?,
            rate_limit_window_seconds: env_parse(
                "RATE_LIMIT_WINDOW_SECONDS",
                defaults.rate_limit_window_seconds,
            )?,
            session_queue_maxsize: env_parse(
                "SESSION_QUEUE_MAXSIZE",
                defaults.session_queue_maxsize,
            )?,
            session_queue_worker_count: env_parse(
                "SESSION_QUEUE_WORKER_COUNT",
                defaults.session_queue_worker_count,
            )?,
            session_retention_seconds: env_parse(
                "SESSION_RETENTION_SECONDS",
                defaults.session_retention_seconds,
            )?,
            circuit_failure_threshold: env_parse(
                "CIRCUIT_FAILURE_THRESHOLD",
                defaults.circuit_failure_threshold,
            )?,
            circuit_reset_timeout_seconds: env_parse(
                "CIRCUIT_RESET_TIMEOUT_SECONDS",
                defaults.circuit_reset_timeout_seconds,
            )?,
            circuit_half_open_max_trials: env_parse(
                "CIRCUIT_HALF_OPEN_MAX_TRIALS",
                defaults.circuit_half_open_max_trials,
            )?,
            provider_chunk_timeout_ms: env_parse(
                "PROVIDER_CHUNK_TIMEOUT_MS",
                defaults.provider_chunk_timeout_ms,
            )?,
            provider_max_attempts: env_parse(
                "PROVIDER_MAX_ATTEMPTS",
                defaults.provider_max_attempts,
            )?,
            provider_retry_base_ms: env_parse(
                "PROVIDER_RETRY_BASE_MS",
                defaults.provider_retry_base_ms,
            )?,
            voice_provider_strict: env_flag("VOICE_PROVIDER_STRICT", false),
            mock_tone_enabled: env_flag("MOCK_TONE_ENABLED", true),
            http_speech,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, message: &str| ConfigError::Invalid {
            key: key.to_string(),
            message: message.to_string(),
        };
        if self.rate_limit_max_requests_per_window == 0 {
            return Err(invalid("RATE_LIMIT_MAX_REQUESTS_PER_WINDOW", "must be >= 1"));
        }
        if self.rate_limit_window_seconds == 0 {
            return Err(invalid("RATE_LIMIT_WINDOW_SECONDS", "must be >= 1"));
        }
        if self.session_queue_maxsize == 0 {
            return Err(invalid("SESSION_QUEUE_MAXSIZE", "must be >= 1"));
        }
        if self.session_queue_worker_count == 0 {
            return Err(invalid("SESSION_QUEUE_WORKER_COUNT", "must be >= 1"));
        }
        if self.circuit_failure_threshold == 0 {
            return Err(invalid("CIRCUIT_FAILURE_THRESHOLD", "must be >= 1"));
        }
        if self.circuit_half_open_max_trials == 0 {
            return Err(invalid("CIRCUIT_HALF_OPEN_MAX_TRIALS", "must be >= 1"));
        }
        if self.provider_max_attempts == 0 {
            return Err(invalid("PROVIDER_MAX_ATTEMPTS", "must be >= 1"));
        }
        if !self.mock_tone_enabled && self.http_speech.is_none() {
            return Err(invalid("MOCK_TONE_ENABLED", "at least one provider must be enabled"));
        }
        Ok(())
    }

    /// Bind address for the HTTP server.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_flag(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(raw) => !matches!(raw.trim(), "" | "0" | "false" | "no" | "off"),
        Err(_) => default,
    }
}

fn env_parse<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match env_opt(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}
