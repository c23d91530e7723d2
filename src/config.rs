use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read config file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse config file '{}': {}", path.display(), source)
            }
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::Validation(_) => None,
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    discord_token: String,
    /// Use a vxTwitter-compatible mirror instead of scraping directly.
    #[serde(default)]
    use_vx_twitter: bool,
    /// Base URL of the vxTwitter mirror (e.g. "https://api.vxtwitter.com").
    vx_twitter_api_url: Option<String>,
    /// Attempt cap for the scrape backend.
    #[serde(default = "default_retry_limit")]
    retry_limit: u32,
    /// Custom emoji for inline engagement counts; used only when all three are set.
    #[serde(default)]
    external_emoji: ExternalEmojiFile,
    /// Path to the SQLite database. Defaults to "embeds.db".
    database_path: Option<String>,
    /// Directory for log files. Defaults to "logs".
    log_dir: Option<String>,
}

#[derive(Deserialize, Default)]
struct ExternalEmojiFile {
    like: Option<String>,
    retweet: Option<String>,
    reply: Option<String>,
}

fn default_retry_limit() -> u32 {
    3
}

/// Emoji prepended to like/retweet/reply counts in rendered embeds.
#[derive(Debug, Clone, Default)]
pub struct ExternalEmoji {
    pub like: Option<String>,
    pub retweet: Option<String>,
    pub reply: Option<String>,
}

impl ExternalEmoji {
    /// All three emoji, or `None` when any is missing.
    pub fn complete(&self) -> Option<(&str, &str, &str)> {
        match (&self.like, &self.retweet, &self.reply) {
            (Some(like), Some(retweet), Some(reply)) => Some((like, retweet, reply)),
            _ => None,
        }
    }
}

pub struct Config {
    pub discord_token: String,
    pub use_vx_twitter: bool,
    pub vx_twitter_api_url: Option<String>,
    pub retry_limit: u32,
    pub external_emoji: ExternalEmoji,
    pub database_path: PathBuf,
    pub log_dir: PathBuf,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: config_path.clone(), source: e })?;

        if file.discord_token.is_empty() {
            return Err(ConfigError::Validation("discord_token is required".into()));
        }

        let database_path = file
            .database_path
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("embeds.db"));
        let log_dir = file
            .log_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("logs"));

        Ok(Self {
            discord_token: file.discord_token,
            use_vx_twitter: file.use_vx_twitter,
            vx_twitter_api_url: file.vx_twitter_api_url,
            retry_limit: file.retry_limit,
            external_emoji: ExternalEmoji {
                like: file.external_emoji.like,
                retweet: file.external_emoji.retweet,
                reply: file.external_emoji.reply,
            },
            database_path,
            log_dir,
        })
    }
}
