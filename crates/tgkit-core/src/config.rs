use std::{env, path::PathBuf, time::Duration};

use crate::{errors::Error, Result};

/// Typed configuration for the bot runtime.
///
/// Loaded once at startup and shared as `Arc<Config>`.
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub telegram_bot_token: String,
    /// Empty means the bot answers everyone.
    pub telegram_allowed_users: Vec<i64>,

    // Home chat / topic restriction
    pub telegram_chat_id: Option<i64>,
    pub telegram_topic_id: Option<i32>,

    // Rate limiting
    pub rate_limit_enabled: bool,
    pub rate_limit_requests: u32,
    pub rate_limit_window: Duration,

    // Chat log sink
    pub log_chat_id: Option<i64>,
    pub log_thread_id: Option<i32>,
    pub log_chat_level: String,
    pub log_flush_interval: Duration,
    pub log_buffer_lines: usize,

    // Runtime
    pub instance_lock_file: PathBuf,

    // Telegram limits
    pub telegram_message_limit: usize,
    pub telegram_safe_limit: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv();
        Self::from_vars(env_str)
    }

    /// Build the config from an arbitrary variable source (the process env in production).
    pub fn from_vars(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let vars = Vars(&get);

        let telegram_bot_token = vars.str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }
        let telegram_allowed_users = parse_csv_i64(vars.str("TELEGRAM_ALLOWED_USERS"));

        let telegram_chat_id = vars.parsed::<i64>("TELEGRAM_CHAT_ID")?;
        let telegram_topic_id = vars.parsed::<i32>("TELEGRAM_TOPIC_ID")?;
        if telegram_topic_id.is_some() && telegram_chat_id.is_none() {
            return Err(Error::Config(
                "TELEGRAM_TOPIC_ID requires TELEGRAM_CHAT_ID".to_string(),
            ));
        }

        let rate_limit_enabled = vars.bool("RATE_LIMIT_ENABLED").unwrap_or(true);
        let rate_limit_requests = vars.parsed::<u32>("RATE_LIMIT_REQUESTS")?.unwrap_or(20);
        let rate_limit_window =
            Duration::from_secs(vars.parsed::<u64>("RATE_LIMIT_WINDOW")?.unwrap_or(60));

        let log_chat_id = vars.parsed::<i64>("LOG_CHAT_ID")?;
        let log_thread_id = vars.parsed::<i32>("LOG_THREAD_ID")?;
        let log_chat_level = vars
            .str("LOG_CHAT_LEVEL")
            .and_then(non_empty)
            .unwrap_or_else(|| "warn".to_string())
            .to_lowercase();
        if !matches!(
            log_chat_level.as_str(),
            "error" | "warn" | "info" | "debug" | "trace"
        ) {
            return Err(Error::Config(format!(
                "LOG_CHAT_LEVEL must be one of error|warn|info|debug|trace, got {log_chat_level}"
            )));
        }
        let log_flush_interval = Duration::from_millis(
            vars.parsed::<u64>("LOG_FLUSH_INTERVAL_MS")?
                .unwrap_or(5000)
                .max(100),
        );
        let log_buffer_lines = vars.parsed::<usize>("LOG_BUFFER_LINES")?.unwrap_or(200).max(1);

        let instance_lock_file = PathBuf::from(
            vars.str("INSTANCE_LOCK_FILE")
                .and_then(non_empty)
                .unwrap_or_else(|| "/tmp/tgkit.pid".to_string()),
        );

        let telegram_message_limit = vars.parsed::<usize>("TELEGRAM_MESSAGE_LIMIT")?.unwrap_or(4096);
        let telegram_safe_limit = vars
            .parsed::<usize>("TELEGRAM_SAFE_LIMIT")?
            .unwrap_or(4000)
            .min(telegram_message_limit);

        Ok(Self {
            telegram_bot_token,
            telegram_allowed_users,
            telegram_chat_id,
            telegram_topic_id,
            rate_limit_enabled,
            rate_limit_requests,
            rate_limit_window,
            log_chat_id,
            log_thread_id,
            log_chat_level,
            log_flush_interval,
            log_buffer_lines,
            instance_lock_file,
            telegram_message_limit,
            telegram_safe_limit,
        })
    }
}

/// Configuration for the MTProto (user account) side used by the setup CLI.
#[derive(Clone, Debug)]
pub struct MtprotoConfig {
    pub api_id: i32,
    pub api_hash: String,
    pub session_file: PathBuf,
    pub phone: Option<String>,
    pub botfather_username: String,

    pub reply_timeout: Duration,
    pub step_delay: Duration,
    pub settle_delay: Duration,
}

impl MtprotoConfig {
    pub fn load() -> Result<Self> {
        load_dotenv();
        Self::from_vars(env_str)
    }

    pub fn from_vars(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let vars = Vars(&get);

        let api_id = vars.parsed::<i32>("TELEGRAM_API_ID")?.ok_or_else(|| {
            Error::Config("TELEGRAM_API_ID environment variable is required".to_string())
        })?;
        let api_hash = vars
            .str("TELEGRAM_API_HASH")
            .and_then(non_empty)
            .ok_or_else(|| {
                Error::Config("TELEGRAM_API_HASH environment variable is required".to_string())
            })?;

        let session_file = PathBuf::from(
            vars.str("TELEGRAM_SESSION_FILE")
                .and_then(non_empty)
                .unwrap_or_else(|| "tgkit.session".to_string()),
        );
        let phone = vars.str("TELEGRAM_PHONE").and_then(non_empty);
        let botfather_username = vars
            .str("BOTFATHER_USERNAME")
            .and_then(non_empty)
            .map(|s| s.trim_start_matches('@').to_string())
            .unwrap_or_else(|| "BotFather".to_string());

        let reply_timeout = Duration::from_millis(
            vars.parsed::<u64>("BOTFATHER_REPLY_TIMEOUT_MS")?
                .unwrap_or(15_000),
        );
        let step_delay =
            Duration::from_millis(vars.parsed::<u64>("BOTFATHER_STEP_DELAY_MS")?.unwrap_or(1500));
        let settle_delay =
            Duration::from_millis(vars.parsed::<u64>("BOTFATHER_SETTLE_MS")?.unwrap_or(500));

        Ok(Self {
            api_id,
            api_hash,
            session_file,
            phone,
            botfather_username,
            reply_timeout,
            step_delay,
            settle_delay,
        })
    }
}

/// Read the bot token on its own (used by tools that only talk to the Bot API).
pub fn bot_token_from_env() -> Result<String> {
    load_dotenv();
    env_str("TELEGRAM_BOT_TOKEN")
        .and_then(non_empty)
        .ok_or_else(|| Error::Config("TELEGRAM_BOT_TOKEN environment variable is required".to_string()))
}

struct Vars<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Vars<'_, F> {
    fn str(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn bool(&self, key: &str) -> Option<bool> {
        self.str(key).map(|s| {
            matches!(
                s.trim().to_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
    }

    /// Missing or blank is `None`; present but malformed is a config error.
    fn parsed<T: std::str::FromStr>(&self, key: &str) -> Result<Option<T>> {
        let Some(raw) = self.str(key).and_then(non_empty) else {
            return Ok(None);
        };
        raw.trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::Config(format!("{key} has an invalid value: {raw}")))
    }
}

fn load_dotenv() {
    // Existing env vars win over `.env` entries.
    let _ = dotenvy::dotenv();
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
