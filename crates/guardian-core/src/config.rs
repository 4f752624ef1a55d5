//! Application configuration management.
//!
//! This module handles loading and saving the dashboard configuration:
//! the backend URL, the last used username, and the sync policy (cache
//! lifetimes, refresh cadences, action settle delay).
//!
//! Configuration is stored at `~/.config/guardian-dash/config.json`.
//! `GUARDIAN_API_URL` overrides the stored backend URL.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cache::CacheTtls;
use crate::models::DEFAULT_ACTION_LOG_LIMIT;

/// Application name used for config/cache directory paths
pub const APP_NAME: &str = "guardian-dash";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Backend started by the local runner listens here.
const DEFAULT_API_URL: &str = "http://127.0.0.1:8001";

/// Environment variable overriding `api_base_url`
pub const API_URL_ENV: &str = "GUARDIAN_API_URL";

/// Upper bound for every policy duration, one year
const MAX_POLICY_SECS: u64 = 365 * 24 * 60 * 60;

/// Timing and sizing knobs for the sync engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncPolicy {
    pub status_ttl_secs: u64,
    pub action_logs_ttl_secs: u64,
    pub status_interval_secs: u64,
    pub action_logs_interval_secs: u64,
    /// Wait after a successful action before re-fetching, so the backend settles.
    pub action_settle_secs: u64,
    pub action_log_limit: usize,
    pub request_timeout_secs: u64,
    /// Persisted sessions older than this are not restored.
    pub token_lifetime_minutes: i64,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            status_ttl_secs: 60 * 60,
            action_logs_ttl_secs: 5 * 60,
            status_interval_secs: 60 * 60,
            action_logs_interval_secs: 5 * 60,
            action_settle_secs: 3,
            action_log_limit: DEFAULT_ACTION_LOG_LIMIT,
            request_timeout_secs: 30,
            token_lifetime_minutes: 30,
        }
    }
}

impl SyncPolicy {
    /// Reject durations that are negative or too large to schedule.
    pub fn validate(&self) -> Result<()> {
        for (name, secs) in [
            ("status_ttl_secs", self.status_ttl_secs),
            ("action_logs_ttl_secs", self.action_logs_ttl_secs),
            ("status_interval_secs", self.status_interval_secs),
            ("action_logs_interval_secs", self.action_logs_interval_secs),
            ("action_settle_secs", self.action_settle_secs),
            ("request_timeout_secs", self.request_timeout_secs),
        ] {
            policy_seconds(name, secs)?;
        }
        self.token_lifetime()?;
        Ok(())
    }

    pub fn cache_ttls(&self) -> Result<CacheTtls> {
        Ok(CacheTtls {
            status: policy_seconds("status_ttl_secs", self.status_ttl_secs)?,
            action_logs: policy_seconds("action_logs_ttl_secs", self.action_logs_ttl_secs)?,
        })
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs.max(1))
    }

    pub fn action_logs_interval(&self) -> Duration {
        Duration::from_secs(self.action_logs_interval_secs.max(1))
    }

    pub fn action_settle_delay(&self) -> Duration {
        Duration::from_secs(self.action_settle_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn token_lifetime(&self) -> Result<chrono::Duration> {
        let minutes = self.token_lifetime_minutes;
        u64::try_from(minutes)
            .ok()
            .filter(|&m| m <= MAX_POLICY_SECS / 60)
            .and_then(|_| chrono::Duration::try_minutes(minutes))
            .ok_or_else(|| anyhow::anyhow!("policy.token_lifetime_minutes is out of range: {}", minutes))
    }
}

fn policy_seconds(name: &str, secs: u64) -> Result<chrono::Duration> {
    i64::try_from(secs)
        .ok()
        .filter(|_| secs <= MAX_POLICY_SECS)
        .and_then(chrono::Duration::try_seconds)
        .ok_or_else(|| anyhow::anyhow!("policy.{} is out of range: {}", name, secs))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_api_url")]
    pub api_base_url: String,
    #[serde(default)]
    pub last_username: Option<String>,
    /// Overrides the platform cache directory.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    #[serde(default)]
    pub policy: SyncPolicy,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: default_api_url(),
            last_username: None,
            cache_dir: None,
            policy: SyncPolicy::default(),
        }
    }
}

impl Config {
    /// Load the stored config (or defaults) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path).context("Failed to read config file")?;
            serde_json::from_str(&contents).context("Failed to parse config file")?
        } else {
            Self::default()
        };
        config.policy.validate().context("Invalid sync policy in config file")?;
        config.apply_env();
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                self.api_base_url = url.trim().to_string();
            }
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.cache_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}
