//! Sidecar configuration
//!
//! Configuration is layered:
//! 1. Built-in defaults
//! 2. Optional TOML file
//! 3. Environment variables (`VAULT_PATH`, `DEBOUNCE_SECONDS`, ...)
//!
//! The result is validated once at startup and then treated as immutable.

use crate::error::{BackupError, Result};
use crate::integrations::NotifyStatus;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory tree being watched and backed up
    pub vault_path: PathBuf,

    /// Directory for the health write-through cache and daemon lock
    pub state_dir: PathBuf,

    /// Log what would happen instead of committing or snapshotting
    pub dry_run: bool,

    pub watch: WatchConfig,
    pub git: GitConfig,
    pub backup: BackupConfig,
    pub retention: RetentionPolicy,
    pub health: HealthConfig,
    pub llm: LlmConfig,
    pub notify: NotifyConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vault_path: PathBuf::from("/vault"),
            state_dir: PathBuf::from("/app/state"),
            dry_run: false,
            watch: WatchConfig::default(),
            git: GitConfig::default(),
            backup: BackupConfig::default(),
            retention: RetentionPolicy::default(),
            health: HealthConfig::default(),
            llm: LlmConfig::default(),
            notify: NotifyConfig::default(),
        }
    }
}

/// Change detection and debounce settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Quiet period after the last change before a cycle is dispatched
    pub debounce_secs: u64,

    /// How often the scheduler re-evaluates the quiet period
    pub poll_interval_secs: u64,

    /// Path components that are never backed up (matched whole, not as prefixes)
    pub ignore_segments: Vec<String>,

    /// Relative paths that are never backed up (matched as path suffixes)
    pub ignore_paths: Vec<String>,

    /// Additional gitignore-style patterns
    pub ignore_patterns: Vec<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_secs: 300,
            poll_interval_secs: 2,
            ignore_segments: vec![".git".to_string(), ".trash".to_string()],
            ignore_paths: vec![
                ".obsidian/workspace.json".to_string(),
                ".obsidian/workspace-mobile.json".to_string(),
            ],
            ignore_patterns: vec![],
        }
    }
}

/// Commit identity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    pub user_name: String,
    pub user_email: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            user_name: "Obsidian Backup".to_string(),
            user_email: "backup@local".to_string(),
        }
    }
}

/// Backup engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Provenance tags attached to every snapshot. The first tag scopes pruning.
    pub tags: Vec<String>,

    /// Upper bound for any single git/restic invocation
    pub command_timeout_secs: u64,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            tags: vec!["obsidian".to_string(), "auto-backup".to_string()],
            command_timeout_secs: 1800,
        }
    }
}

/// Snapshot retention counts passed to the backup engine's prune
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionPolicy {
    pub daily: u32,
    pub weekly: u32,
    pub monthly: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            daily: 7,
            weekly: 4,
            monthly: 12,
        }
    }
}

/// Health endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub port: u16,
    pub bind: String,

    /// Backup age after which pending changes make the sidecar unhealthy
    pub unhealthy_after_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            bind: "0.0.0.0".to_string(),
            unhealthy_after_secs: 86_400,
        }
    }
}

/// Commit message summarizer settings
///
/// Either an Anthropic API key or an OpenAI-compatible URL enables the summarizer.
/// The OpenAI-compatible endpoint wins when both are present.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub anthropic_api_key: Option<String>,
    pub anthropic_api_url: String,
    pub anthropic_model: String,

    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub model: String,

    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            anthropic_api_key: None,
            anthropic_api_url: "https://api.anthropic.com/v1/messages".to_string(),
            anthropic_model: "claude-haiku-4-5-20251001".to_string(),
            api_url: None,
            api_key: None,
            model: "anthropic/claude-haiku-4.5".to_string(),
            timeout_secs: 10,
        }
    }
}

impl LlmConfig {
    pub fn enabled(&self) -> bool {
        self.anthropic_api_key.is_some() || self.api_url.is_some()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Which notifications get delivered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyLevel {
    #[default]
    All,
    /// Errors and warnings
    Errors,
    Success,
    #[serde(rename = "none")]
    Off,
}

impl NotifyLevel {
    /// Parse a level name. Unknown names fall back to `All`.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "errors" => Self::Errors,
            "success" => Self::Success,
            "none" => Self::Off,
            _ => Self::All,
        }
    }

    pub fn permits(&self, status: NotifyStatus) -> bool {
        match self {
            Self::All => true,
            Self::Errors => status != NotifyStatus::Success,
            Self::Success => status == NotifyStatus::Success,
            Self::Off => false,
        }
    }
}

/// Outbound webhook settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub level: NotifyLevel,
    pub discord_webhook_url: Option<String>,
    pub discord_username: Option<String>,
    pub discord_avatar_url: Option<String>,
    pub slack_webhook_url: Option<String>,
    pub webhook_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            level: NotifyLevel::All,
            discord_webhook_url: None,
            discord_username: None,
            discord_avatar_url: None,
            slack_webhook_url: None,
            webhook_url: None,
            timeout_secs: 10,
        }
    }
}

impl NotifyConfig {
    pub fn enabled(&self) -> bool {
        self.discord_webhook_url.is_some()
            || self.slack_webhook_url.is_some()
            || self.webhook_url.is_some()
    }
}

impl Config {
    /// Load configuration: defaults, then the TOML file (if any), then the process
    /// environment, then validation.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                Self::from_toml_str(&raw)
                    .with_context(|| format!("Failed to parse config file {}", path.display()))?
            }
            None => Self::default(),
        };

        config.apply_env_with(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Overlay environment variables using the given lookup
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("VAULT_PATH") {
            self.vault_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("STATE_DIR") {
            self.state_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("DRY_RUN") {
            self.dry_run = matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes");
        }
        if let Some(v) = lookup("DEBOUNCE_SECONDS") {
            self.watch.debounce_secs = parse_int("DEBOUNCE_SECONDS", &v)?;
        }
        if let Some(v) = lookup("HEALTH_PORT") {
            self.health.port = parse_int("HEALTH_PORT", &v)?;
        }
        if let Some(v) = lookup("GIT_USER_NAME") {
            self.git.user_name = v;
        }
        if let Some(v) = lookup("GIT_USER_EMAIL") {
            self.git.user_email = v;
        }
        if let Some(v) = lookup("RETENTION_DAILY") {
            self.retention.daily = parse_int("RETENTION_DAILY", &v)?;
        }
        if let Some(v) = lookup("RETENTION_WEEKLY") {
            self.retention.weekly = parse_int("RETENTION_WEEKLY", &v)?;
        }
        if let Some(v) = lookup("RETENTION_MONTHLY") {
            self.retention.monthly = parse_int("RETENTION_MONTHLY", &v)?;
        }

        if let Some(v) = lookup("ANTHROPIC_API_KEY") {
            self.llm.anthropic_api_key = Some(v);
        }
        if let Some(v) = lookup("ANTHROPIC_API_URL") {
            self.llm.anthropic_api_url = v;
        }
        if let Some(v) = lookup("ANTHROPIC_MODEL") {
            self.llm.anthropic_model = v;
        }
        if let Some(v) = lookup("LLM_API_URL") {
            self.llm.api_url = Some(v);
        }
        if let Some(v) = lookup("LLM_API_KEY") {
            self.llm.api_key = Some(v);
        }
        if let Some(v) = lookup("LLM_MODEL") {
            self.llm.model = v;
        }

        if let Some(v) = lookup("NOTIFY_LEVEL") {
            self.notify.level = NotifyLevel::parse_lenient(&v);
        }
        if let Some(v) = lookup("DISCORD_WEBHOOK_URL") {
            self.notify.discord_webhook_url = Some(v);
        }
        if let Some(v) = lookup("DISCORD_WEBHOOK_USERNAME") {
            self.notify.discord_username = Some(v);
        }
        if let Some(v) = lookup("DISCORD_WEBHOOK_AVATAR_URL") {
            self.notify.discord_avatar_url = Some(v);
        }
        if let Some(v) = lookup("SLACK_WEBHOOK_URL") {
            self.notify.slack_webhook_url = Some(v);
        }
        if let Some(v) = lookup("WEBHOOK_URL") {
            self.notify.webhook_url = Some(v);
        }

        Ok(())
    }

    /// Validate value ranges
    pub fn validate(&self) -> Result<()> {
        if self.vault_path.as_os_str().is_empty() {
            return Err(BackupError::InvalidConfig("vault_path must not be empty".into()));
        }
        if !(1..=86_400).contains(&self.watch.debounce_secs) {
            return Err(BackupError::InvalidConfig(format!(
                "watch.debounce_secs must be between 1 and 86400, got {}",
                self.watch.debounce_secs
            )));
        }
        if !(1..=60).contains(&self.watch.poll_interval_secs) {
            return Err(BackupError::InvalidConfig(format!(
                "watch.poll_interval_secs must be between 1 and 60, got {}",
                self.watch.poll_interval_secs
            )));
        }
        if self.health.port == 0 {
            return Err(BackupError::InvalidConfig("health.port must not be 0".into()));
        }
        if self.health.unhealthy_after_secs == 0 {
            return Err(BackupError::InvalidConfig(
                "health.unhealthy_after_secs must be positive".into(),
            ));
        }
        let r = &self.retention;
        if r.daily == 0 && r.weekly == 0 && r.monthly == 0 {
            return Err(BackupError::InvalidConfig(
                "retention must keep at least one daily, weekly or monthly snapshot".into(),
            ));
        }
        if self.backup.command_timeout_secs == 0 {
            return Err(BackupError::InvalidConfig(
                "backup.command_timeout_secs must be positive".into(),
            ));
        }
        if self.backup.tags.is_empty() {
            return Err(BackupError::InvalidConfig("backup.tags must not be empty".into()));
        }
        Ok(())
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_secs(self.watch.debounce_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.watch.poll_interval_secs)
    }

    pub fn unhealthy_threshold(&self) -> Duration {
        Duration::from_secs(self.health.unhealthy_after_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.backup.command_timeout_secs)
    }

    /// Copy with API keys masked, for display
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.llm.anthropic_api_key.is_some() {
            copy.llm.anthropic_api_key = Some("***".to_string());
        }
        if copy.llm.api_key.is_some() {
            copy.llm.api_key = Some("***".to_string());
        }
        // Webhook URLs carry their token in the path
        for url in [
            &mut copy.notify.discord_webhook_url,
            &mut copy.notify.slack_webhook_url,
            &mut copy.notify.webhook_url,
        ] {
            if let Some(value) = url.as_mut() {
                *value = mask_url(value);
            }
        }
        copy
    }
}

/// Keep scheme and host, hide credentials, path and query
fn mask_url(url: &str) -> String {
    match url.split_once("://") {
        Some((scheme, rest)) => {
            let authority = rest.split(['/', '?', '#']).next().unwrap_or("");
            let host = authority.rsplit('@').next().unwrap_or(authority);
            format!("{scheme}://{host}/***")
        }
        None => "***".to_string(),
    }
}

fn parse_int<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim().parse().map_err(|_| {
        BackupError::InvalidConfig(format!("{name} must be an integer, got '{raw}'"))
    })
}
