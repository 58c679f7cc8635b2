//! Configuration types.
//!
//! Everything comes from environment variables (optionally seeded from a
//! `.env` file by the binary).

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};

const DEFAULT_DB_PATH: &str = "./data/fitness-bot.db";
const DEFAULT_CALL_TIMEOUT_SECS: u64 = 60;
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 1800;

/// Telegram channel settings. Present only when a bot token is set.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    /// Usernames or numeric ids; `*` admits everyone.
    pub allowed_users: Vec<String>,
}

/// Bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub llm: LlmConfig,
    pub telegram: Option<TelegramConfig>,
    pub db_path: PathBuf,
    /// Progress model file. Prediction is disabled when unset.
    pub predictor_path: Option<PathBuf>,
    /// Upper bound on one plan generator or predictor call.
    pub call_timeout: Duration,
    /// Idle time before a user's worker and lock slot are released.
    pub idle_timeout: Duration,
    /// Port for the read-only REST API. Disabled when unset.
    pub http_port: Option<u16>,
    pub cli_enabled: bool,
    /// Directory for rolling log files. Logs go to stderr only when unset.
    pub log_dir: Option<PathBuf>,
}

impl BotConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Empty values count as unset.
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let backend: LlmBackend = match var("FITNESS_BOT_LLM_BACKEND") {
            Some(raw) => raw.parse().map_err(|message| ConfigError::InvalidValue {
                key: "FITNESS_BOT_LLM_BACKEND".into(),
                message,
            })?,
            None => LlmBackend::OpenAi,
        };
        let key_var = backend.api_key_var();
        let api_key = var(key_var).ok_or_else(|| ConfigError::MissingEnvVar(key_var.into()))?;
        let model = var("FITNESS_BOT_MODEL").unwrap_or_else(|| backend.default_model().to_string());

        let telegram = var("TELEGRAM_API_TOKEN")
            .or_else(|| var("TELEGRAM_BOT_TOKEN"))
            .map(|token| TelegramConfig {
                bot_token: SecretString::from(token),
                allowed_users: parse_list(var("TELEGRAM_ALLOWED_USERS").as_deref().unwrap_or("*")),
            });

        Ok(Self {
            llm: LlmConfig {
                backend,
                api_key: SecretString::from(api_key),
                model,
            },
            telegram,
            db_path: var("FITNESS_BOT_DB_PATH")
                .unwrap_or_else(|| DEFAULT_DB_PATH.to_string())
                .into(),
            predictor_path: var("FITNESS_BOT_PREDICTOR_PATH").map(PathBuf::from),
            call_timeout: Duration::from_secs(parse_var(
                "FITNESS_BOT_CALL_TIMEOUT_SECS",
                var("FITNESS_BOT_CALL_TIMEOUT_SECS"),
                DEFAULT_CALL_TIMEOUT_SECS,
            )?),
            idle_timeout: Duration::from_secs(parse_var(
                "FITNESS_BOT_IDLE_TIMEOUT_SECS",
                var("FITNESS_BOT_IDLE_TIMEOUT_SECS"),
                DEFAULT_IDLE_TIMEOUT_SECS,
            )?),
            http_port: var("FITNESS_BOT_HTTP_PORT")
                .map(|raw| parse_var("FITNESS_BOT_HTTP_PORT", Some(raw), 0))
                .transpose()?,
            cli_enabled: parse_bool("FITNESS_BOT_CLI", var("FITNESS_BOT_CLI"), true)?,
            log_dir: var("FITNESS_BOT_LOG_DIR").map(PathBuf::from),
        })
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_var<T>(key: &str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{raw}': {e}"),
        }),
        None => Ok(default),
    }
}

fn parse_bool(key: &str, raw: Option<String>, default: bool) -> Result<bool, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{raw}' is not a boolean"),
        }),
    }
}
