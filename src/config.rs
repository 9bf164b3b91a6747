use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use tracing::warn;

const HOUR_MS: u64 = 60 * 60 * 1000;
const DAY_MS: u64 = 24 * HOUR_MS;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub moderation: ModerationConfig,
    pub tracking: TrackingConfig,
    pub status_mention: StatusMentionConfig,
    pub rate_limits: RateLimitsConfig,
    pub ai: AiConfig,
    pub snapshot: SnapshotConfig,
    pub commands: CommandsConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub ws_path: String,
    pub max_frame_bytes: usize,
    pub request_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8787".into(),
            ws_path: "/bridge".into(),
            max_frame_bytes: 1024 * 1024,
            request_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModerationConfig {
    pub flood_threshold: usize,
    pub flood_window_ms: u64,
    pub max_warnings: u32,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            flood_threshold: 5,
            flood_window_ms: 10_000,
            max_warnings: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub window_ms: u64,
    pub cleanup_interval_ms: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            window_ms: DAY_MS,
            cleanup_interval_ms: HOUR_MS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StatusMentionConfig {
    pub max_per_day: usize,
    pub window_ms: u64,
}

impl Default for StatusMentionConfig {
    fn default() -> Self {
        Self {
            max_per_day: 3,
            window_ms: DAY_MS,
        }
    }
}

/// Quota over a window plus an optional minimum spacing between calls.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitConfig {
    pub max_requests: usize,
    pub window_ms: u64,
    #[serde(default)]
    pub cooldown_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitsConfig {
    pub ai: LimitConfig,
    pub correction: LimitConfig,
    pub commands: LimitConfig,
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        Self {
            ai: LimitConfig { max_requests: 10, window_ms: HOUR_MS, cooldown_ms: 5_000 },
            correction: LimitConfig { max_requests: 5, window_ms: HOUR_MS, cooldown_ms: 10_000 },
            commands: LimitConfig { max_requests: 30, window_ms: 60_000, cooldown_ms: 0 },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub api_url: String,
    pub api_key_env: String,
    pub model: String,
    pub timeout_ms: u64,
    pub chat_max_tokens: u32,
    pub correction_max_tokens: u32,
    pub correction_min_words: usize,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.groq.com/openai/v1/chat/completions".into(),
            api_key_env: "GROQ_API_KEY".into(),
            model: "llama-3.3-70b-versatile".into(),
            timeout_ms: 30_000,
            chat_max_tokens: 500,
            correction_max_tokens: 150,
            correction_min_words: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub path: String,
    pub interval_ms: u64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            path: "./data/snapshot.json".into(),
            interval_ms: 5 * 60 * 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    pub prefix: String,
    pub bot_mention: String,
    pub max_chunk_len: usize,
    pub chunk_delay_ms: u64,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            prefix: "!".into(),
            bot_mention: "@warden".into(),
            max_chunk_len: 4000,
            chunk_delay_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enable: bool,
    pub bind_addr: String,
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enable: false,
            bind_addr: "127.0.0.1:9187".into(),
            path: "/metrics".into(),
        }
    }
}

pub fn load_config() -> Result<Config> {
    let explicit = env::var("CONFIG_PATH").ok();
    let config_path = explicit.clone().unwrap_or_else(|| "config.toml".to_string());

    if explicit.is_none() && !Path::new(&config_path).exists() {
        warn!("No config.toml found, using built-in defaults");
        return Ok(Config::default());
    }

    let config_content = fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read config file: {}", config_path))?;

    parse_config(&config_content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content)
        .with_context(|| "Failed to parse configuration")?;

    if config.moderation.max_warnings == 0 {
        anyhow::bail!("moderation.max_warnings must be at least 1");
    }
    if config.moderation.flood_threshold == 0 {
        anyhow::bail!("moderation.flood_threshold must be at least 1");
    }
    if config.commands.prefix.trim().is_empty() {
        anyhow::bail!("commands.prefix must not be empty");
    }
    if config.commands.bot_mention.trim().is_empty() {
        anyhow::bail!("commands.bot_mention must not be empty");
    }

    Ok(config)
}
