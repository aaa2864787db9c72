//! Configuration loading for the supply watchdog.
//! Reads watchdog.toml from `--config`, the WATCHDOG_CONFIG env var, or the
//! current directory, in that order.

use anyhow::Context;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use watchdog_engine::WatchdogPolicy;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub policy: WatchdogPolicy,
    #[serde(default)]
    pub notification: NotificationConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize)]
pub struct DatabaseConfig {
    /// May be omitted when DATABASE_URL is set.
    pub url: Option<SecretString>,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_max_connections() -> usize { 4 }

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: None, max_connections: default_max_connections() }
    }
}

impl DatabaseConfig {
    pub fn url(&self) -> anyhow::Result<&str> {
        self.url
            .as_ref()
            .map(|u| u.expose_secret())
            .context("database.url is not set (add it to watchdog.toml or set DATABASE_URL)")
    }
}

#[derive(Debug, Deserialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub recipients: Vec<String>,
    /// Without a webhook, notifications are written to the log.
    pub webhook_url: Option<String>,
    pub webhook_token: Option<SecretString>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// How long the process waits for queued notifications before exiting.
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 { 30 }
fn default_drain_timeout_secs()   -> u64 { 30 }

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            recipients: Vec::new(),
            webhook_url: None,
            webhook_token: None,
            request_timeout_secs: default_request_timeout_secs(),
            drain_timeout_secs: default_drain_timeout_secs(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct OutputConfig {
    pub report_dir: Option<PathBuf>,
}


const DEFAULT_CONFIG_PATH: &str = "watchdog.toml";

/// Split a comma-separated recipient list, dropping blanks.
pub fn parse_recipients(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .collect()
}

impl Config {
    /// Load and validate configuration, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => std::env::var("WATCHDOG_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH)),
        };

        if !path.exists() {
            anyhow::bail!(
                "Config file not found: {}\n\
                 Copy watchdog.example.toml to watchdog.toml and edit it.",
                path.display()
            );
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let mut config = Self::from_toml(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        config.apply_overrides(
            std::env::var("DATABASE_URL").ok(),
            std::env::var("WATCHDOG_RECIPIENTS").ok(),
        );
        Ok(config)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.policy.validate()?;
        Ok(config)
    }

    /// Environment values win over the file.
    pub fn apply_overrides(&mut self, database_url: Option<String>, recipients: Option<String>) {
        if let Some(url) = database_url.filter(|u| !u.trim().is_empty()) {
            self.database.url = Some(SecretString::from(url));
        }
        if let Some(raw) = recipients {
            self.notification.recipients = parse_recipients(&raw);
        }
    }
}
