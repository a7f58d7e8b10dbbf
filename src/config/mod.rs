// src/config/mod.rs
// Configuration for the sobriquet pipeline. All values load from the
// environment (and .env) with per-field defaults.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone)]
pub struct SobriquetConfig {
    // ── Feature toggle
    pub enabled: bool,

    // ── Mapping model
    /// Name of the model used for nickname-mapping analysis. Empty means not
    /// configured, which disables the pipeline at construction.
    pub mapping_model: String,

    // ── Analysis
    /// Chance that a chat turn is analyzed at all. Out-of-range values are
    /// treated as 1.0 at the call site.
    pub analysis_probability: f64,
    pub history_limit: usize,
    pub min_length: usize,
    pub max_length: usize,

    // ── Queue / consumer
    pub queue_capacity: usize,
    pub poll_interval: Duration,
    pub error_backoff: Duration,
    pub shutdown_timeout: Duration,

    // ── Prompt injection
    pub max_in_prompt: usize,
    pub probability_smoothing: f64,

    // ── Identity
    /// Salt for the one-way person-key hash. Rotating it orphans every
    /// existing record; treat rotation as a breaking migration.
    pub profile_id_salt: String,
    pub bot_user_id: String,
    pub bot_display_name: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("max_in_prompt must be a positive integer (got {0})")]
    InvalidMaxInPrompt(usize),
    #[error("probability_smoothing must be non-negative (got {0})")]
    NegativeSmoothing(f64),
    #[error("sobriquet length bounds are invalid (min {0}, max {1})")]
    InvalidLengthBounds(usize, usize),
    #[error("no mapping model configured")]
    MissingModel,
}

fn env_var_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    match std::env::var(key) {
        Ok(val) => {
            let clean_val = val.split('#').next().unwrap_or("").trim();
            match clean_val.parse::<T>() {
                Ok(parsed) => parsed,
                Err(_) => {
                    eprintln!("Config: {} = '{}' (parse failed, using default)", key, val);
                    default
                }
            }
        }
        Err(_) => default,
    }
}

impl Default for SobriquetConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mapping_model: "gpt-5-mini".to_string(),
            analysis_probability: 1.0,
            history_limit: 20,
            min_length: 1,
            max_length: 15,
            queue_capacity: 100,
            poll_interval: Duration::from_secs(1),
            error_backoff: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(5),
            max_in_prompt: 5,
            probability_smoothing: 0.1,
            profile_id_salt: "change-me-profile-id-salt".to_string(),
            bot_user_id: String::new(),
            bot_display_name: "bot".to_string(),
        }
    }
}

impl SobriquetConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        Self {
            enabled: env_var_or("MONIKER_ENABLED", defaults.enabled),
            mapping_model: env_var_or("MONIKER_MAPPING_MODEL", defaults.mapping_model),
            analysis_probability: env_var_or(
                "MONIKER_ANALYSIS_PROBABILITY",
                defaults.analysis_probability,
            ),
            history_limit: env_var_or("MONIKER_HISTORY_LIMIT", defaults.history_limit),
            min_length: env_var_or("MONIKER_MIN_LENGTH", defaults.min_length),
            max_length: env_var_or("MONIKER_MAX_LENGTH", defaults.max_length),
            queue_capacity: env_var_or("MONIKER_QUEUE_CAPACITY", defaults.queue_capacity),
            poll_interval: Duration::from_millis(env_var_or("MONIKER_POLL_INTERVAL_MS", 1000)),
            error_backoff: Duration::from_millis(env_var_or("MONIKER_ERROR_BACKOFF_MS", 5000)),
            shutdown_timeout: Duration::from_millis(env_var_or("MONIKER_SHUTDOWN_TIMEOUT_MS", 5000)),
            max_in_prompt: env_var_or("MONIKER_MAX_IN_PROMPT", defaults.max_in_prompt),
            probability_smoothing: env_var_or(
                "MONIKER_PROBABILITY_SMOOTHING",
                defaults.probability_smoothing,
            ),
            profile_id_salt: env_var_or("MONIKER_PROFILE_ID_SALT", defaults.profile_id_salt),
            bot_user_id: env_var_or("MONIKER_BOT_USER_ID", defaults.bot_user_id),
            bot_display_name: env_var_or("MONIKER_BOT_DISPLAY_NAME", defaults.bot_display_name),
        }
    }

    /// Checked once when the pipeline is constructed. A failure here disables
    /// the pipeline for the life of the process rather than being retried.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_in_prompt == 0 {
            return Err(ConfigError::InvalidMaxInPrompt(self.max_in_prompt));
        }
        if self.probability_smoothing < 0.0 {
            return Err(ConfigError::NegativeSmoothing(self.probability_smoothing));
        }
        if self.min_length == 0 || self.min_length > self.max_length {
            return Err(ConfigError::InvalidLengthBounds(
                self.min_length,
                self.max_length,
            ));
        }
        if self.mapping_model.trim().is_empty() {
            return Err(ConfigError::MissingModel);
        }
        Ok(())
    }

    pub fn is_default_salt(&self) -> bool {
        self.profile_id_salt == SobriquetConfig::default().profile_id_salt
    }
}
