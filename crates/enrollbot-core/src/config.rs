//! EnrollBot configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{EnrollBotError, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrollBotConfig {
    #[serde(default)]
    pub telegram: TelegramSettings,
    #[serde(default)]
    pub scraper: ScraperSettings,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub storage: StorageSettings,
}

impl EnrollBotConfig {
    /// Load config from the default path (~/.enrollbot/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| EnrollBotError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| EnrollBotError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Apply `ENROLLBOT_*` environment overrides.
    pub fn with_env(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (env in production, a map in tests).
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        // TOKEN is what the first deployments used.
        if let Some(token) = lookup("ENROLLBOT_TELEGRAM_TOKEN").or_else(|| lookup("TOKEN")) {
            self.telegram.bot_token = token;
        }
        if let Some(dir) = lookup("ENROLLBOT_DATA_DIR") {
            self.storage.data_dir = dir;
        }
        self
    }

    /// Checks needed before the bot can talk to Telegram.
    pub fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            return Err(EnrollBotError::Config(
                "telegram.bot_token is empty (set it in config.toml or ENROLLBOT_TELEGRAM_TOKEN)"
                    .into(),
            ));
        }
        if self.scheduler.check_interval_secs == 0 {
            return Err(EnrollBotError::Config(
                "scheduler.check_interval_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the EnrollBot home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".enrollbot")
    }
}

/// Telegram Bot API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramSettings {
    #[serde(default)]
    pub bot_token: String,
    /// Seconds to wait between long-poll requests.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
}

fn default_poll_interval() -> u64 { 1 }

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            poll_interval: default_poll_interval(),
        }
    }
}

/// Status page scraper settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperSettings {
    #[serde(default = "default_status_url")]
    pub url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_status_url() -> String { "https://publicbg.mjs.bg/BgInfo/Home/Enroll".into() }
fn default_timeout_secs() -> u64 { 30 }
fn default_user_agent() -> String { format!("EnrollBot/{}", env!("CARGO_PKG_VERSION")) }

impl Default for ScraperSettings {
    fn default() -> Self {
        Self {
            url: default_status_url(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

/// Polling scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Trigger for new poll jobs, "MIN HOUR * * *" in UTC.
    #[serde(default = "default_cron")]
    pub cron: String,
    /// How often the scheduler loop looks for due jobs.
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
}

fn default_cron() -> String { "0 18 * * *".into() }
fn default_check_interval() -> u64 { 30 }

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            cron: default_cron(),
            check_interval_secs: default_check_interval(),
        }
    }
}

/// Where the SQLite databases live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_data_dir() -> String { "~/.enrollbot".into() }

impl Default for StorageSettings {
    fn default() -> Self {
        Self { data_dir: default_data_dir() }
    }
}

impl StorageSettings {
    /// Data directory with `~` expanded.
    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.data_dir).to_string())
    }

    pub fn state_db_path(&self) -> PathBuf {
        self.data_path().join("state.db")
    }

    pub fn scheduler_db_path(&self) -> PathBuf {
        self.data_path().join("scheduler.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = EnrollBotConfig::default();
        assert_eq!(config.scheduler.cron, "0 18 * * *");
        assert_eq!(config.scraper.url, "https://publicbg.mjs.bg/BgInfo/Home/Enroll");
        assert_eq!(config.telegram.poll_interval, 1);
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            [telegram]
            bot_token = "123:abc"

            [scheduler]
            cron = "30 6 * * *"
        "#;
        let config: EnrollBotConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.telegram.bot_token, "123:abc");
        assert_eq!(config.scheduler.cron, "30 6 * * *");
        assert_eq!(config.scheduler.check_interval_secs, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_token_is_invalid() {
        let config: EnrollBotConfig = toml::from_str("").unwrap();
        assert!(matches!(config.validate(), Err(EnrollBotError::Config(_))));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> =
            HashMap::from([("TOKEN", "legacy"), ("ENROLLBOT_DATA_DIR", "/tmp/eb")]);
        let config = EnrollBotConfig::default()
            .with_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.telegram.bot_token, "legacy");
        assert_eq!(config.storage.state_db_path(), PathBuf::from("/tmp/eb/state.db"));

        let env: HashMap<&str, &str> =
            HashMap::from([("TOKEN", "legacy"), ("ENROLLBOT_TELEGRAM_TOKEN", "new")]);
        let config = EnrollBotConfig::default()
            .with_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.telegram.bot_token, "new");
    }

    #[test]
    fn test_home_dir() {
        let home = EnrollBotConfig::home_dir();
        assert!(home.to_string_lossy().contains("enrollbot"));
    }
}
