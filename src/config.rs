//! Configuration and settings management
//!
//! Loads settings from config files and environment variables and defines
//! the bot's tuning constants.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Telegram Bot API token
    pub telegram_token: String,

    /// Base URL of a self-hosted Bot API server (lifts the 50 MB upload cap)
    pub telegram_api_url: Option<String>,

    /// Comma-separated list of allowed user IDs; empty means everyone
    #[serde(rename = "allowed_users")]
    pub allowed_users_str: Option<String>,

    /// Netscape cookie file handed to yt-dlp for authenticated extraction
    pub cookies_file: Option<PathBuf>,

    /// Root directory for per-request download folders
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// yt-dlp executable (name on `PATH` or absolute path)
    #[serde(default = "default_ytdlp_path")]
    pub ytdlp_path: String,

    /// Hard limit for a single yt-dlp run
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,

    /// Largest file the bot will try to upload, in megabytes
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: u64,

    /// `--max-filesize` passed to yt-dlp for audio downloads, in megabytes
    #[serde(default = "default_audio_max_filesize_mb")]
    pub audio_max_filesize_mb: u64,

    /// How long an unanswered format choice stays valid
    #[serde(default = "default_pending_link_ttl_secs")]
    pub pending_link_ttl_secs: u64,

    /// Capacity of the pending link store
    #[serde(default = "default_pending_link_max_entries")]
    pub pending_link_max_entries: u64,
}

fn default_download_dir() -> PathBuf {
    PathBuf::from(DEFAULT_DOWNLOAD_DIR)
}

fn default_ytdlp_path() -> String {
    "yt-dlp".to_string()
}

const fn default_download_timeout_secs() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT_SECS
}

const fn default_max_upload_mb() -> u64 {
    TELEGRAM_UPLOAD_LIMIT_MB
}

const fn default_audio_max_filesize_mb() -> u64 {
    DEFAULT_AUDIO_MAX_FILESIZE_MB
}

const fn default_pending_link_ttl_secs() -> u64 {
    DEFAULT_PENDING_LINK_TTL_SECS
}

const fn default_pending_link_max_entries() -> u64 {
    DEFAULT_PENDING_LINK_MAX_ENTRIES
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use media_fetch_bot::config::Settings;
    ///
    /// let settings = Settings::new().expect("Failed to load configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or `TELEGRAM_TOKEN` is missing.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            // Local overrides, not checked into git
            .add_source(File::with_name("config/local").required(false))
            // `APP__DOWNLOAD_DIR=/tmp/dl` style overrides
            .add_source(Environment::with_prefix("APP").separator("__"))
            // Plain `TELEGRAM_TOKEN`, `COOKIES_FILE`, ... (empty values count as unset)
            .add_source(Environment::default().ignore_empty(true))
            .build()?;

        let settings: Self = s.try_deserialize()?;

        if settings.telegram_token.trim().is_empty() {
            return Err(ConfigError::Message("TELEGRAM_TOKEN is empty".to_string()));
        }

        Ok(settings)
    }

    /// Returns a set of Telegram IDs that are allowed to use the bot
    #[must_use]
    pub fn allowed_users(&self) -> HashSet<i64> {
        self.allowed_users_str
            .as_ref()
            .map(|s| {
                s.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
                    .filter(|token| !token.is_empty())
                    .filter_map(|id| id.parse::<i64>().ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether `user_id` may use the bot. An empty access list opens the bot to everyone.
    #[must_use]
    pub fn is_user_allowed(&self, user_id: i64) -> bool {
        let allowed = self.allowed_users();
        allowed.is_empty() || allowed.contains(&user_id)
    }

    /// Upload limit in bytes
    #[must_use]
    pub const fn max_upload_bytes(&self) -> u64 {
        self.max_upload_mb * 1024 * 1024
    }
}

/// Default root for download job directories
pub const DEFAULT_DOWNLOAD_DIR: &str = "downloads";
/// Default timeout for one yt-dlp run (15 minutes)
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 900;
/// Upload limit of the public Bot API
pub const TELEGRAM_UPLOAD_LIMIT_MB: u64 = 50;
/// Default yt-dlp `--max-filesize` for audio
pub const DEFAULT_AUDIO_MAX_FILESIZE_MB: u64 = 50;
/// Default lifetime of a pending link (10 minutes)
pub const DEFAULT_PENDING_LINK_TTL_SECS: u64 = 600;
/// Default capacity of the pending link store
pub const DEFAULT_PENDING_LINK_MAX_ENTRIES: u64 = 10_000;

// Telegram API retry configuration
/// Initial backoff for Telegram API retries
pub const TELEGRAM_API_INITIAL_BACKOFF_MS: u64 = 500;
/// Maximum backoff for Telegram API retries
pub const TELEGRAM_API_MAX_BACKOFF_MS: u64 = 4000;
/// Maximum attempts for a Telegram API operation
pub const TELEGRAM_API_MAX_RETRIES: usize = 3;

/// Telegram message length limit used when echoing errors back (real limit is 4096)
pub const TELEGRAM_MESSAGE_SAFE_LEN: usize = 3500;

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn settings_with_users(users: Option<&str>) -> Settings {
        Settings {
            telegram_token: "dummy".to_string(),
            telegram_api_url: None,
            allowed_users_str: users.map(ToString::to_string),
            cookies_file: None,
            download_dir: default_download_dir(),
            ytdlp_path: default_ytdlp_path(),
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            max_upload_mb: TELEGRAM_UPLOAD_LIMIT_MB,
            audio_max_filesize_mb: DEFAULT_AUDIO_MAX_FILESIZE_MB,
            pending_link_ttl_secs: DEFAULT_PENDING_LINK_TTL_SECS,
            pending_link_max_entries: DEFAULT_PENDING_LINK_MAX_ENTRIES,
        }
    }

    // Single test touching process env to avoid races between tests
    #[test]
    fn test_config_env_loading() -> Result<(), Box<dyn std::error::Error>> {
        env::set_var("TELEGRAM_TOKEN", "dummy_token");
        env::set_var("COOKIES_FILE", "/srv/cookies.txt");
        env::set_var("MAX_UPLOAD_MB", "2000");
        env::set_var("DOWNLOAD_DIR", "");

        let settings = Settings::new()?;
        assert_eq!(settings.telegram_token, "dummy_token");
        assert_eq!(settings.cookies_file, Some(PathBuf::from("/srv/cookies.txt")));
        assert_eq!(settings.max_upload_mb, 2000);
        // Empty env var falls back to the default
        assert_eq!(settings.download_dir, PathBuf::from(DEFAULT_DOWNLOAD_DIR));
        assert_eq!(settings.ytdlp_path, "yt-dlp");
        assert_eq!(settings.download_timeout_secs, DEFAULT_DOWNLOAD_TIMEOUT_SECS);

        env::remove_var("COOKIES_FILE");
        env::remove_var("MAX_UPLOAD_MB");
        env::remove_var("DOWNLOAD_DIR");

        env::set_var("TELEGRAM_TOKEN", "  ");
        assert!(Settings::new().is_err());

        env::remove_var("TELEGRAM_TOKEN");
        Ok(())
    }

    #[test]
    fn test_list_parsing() {
        let settings = settings_with_users(Some("333; 444, 555 abc"));
        let allowed = settings.allowed_users();
        assert!(allowed.contains(&333));
        assert!(allowed.contains(&444));
        assert!(allowed.contains(&555));
        assert_eq!(allowed.len(), 3);
    }

    #[test]
    fn test_empty_access_list_is_open() {
        assert!(settings_with_users(None).is_user_allowed(42));
        assert!(settings_with_users(Some(" , ")).is_user_allowed(42));
    }

    #[test]
    fn test_access_list_restricts() {
        let settings = settings_with_users(Some("111,222"));
        assert!(settings.is_user_allowed(111));
        assert!(!settings.is_user_allowed(333));
    }

    #[test]
    fn test_max_upload_bytes() {
        assert_eq!(settings_with_users(None).max_upload_bytes(), 50 * 1024 * 1024);
    }
}
