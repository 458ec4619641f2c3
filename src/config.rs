//! Application configuration.
//!
//! Layered with the `config` crate: built-in defaults, then the TOML file
//! (`--config` or `~/.config/calsync/config.toml`), then `CALSYNC_*`
//! environment variables such as `CALSYNC_CALDAV__PASSWORD`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use calsync_core::CalendarNames;
use calsync_core::similarity::DEFAULT_DEDUP_THRESHOLD;
use calsync_sources::SourcesConfig;
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

const DEFAULT_HORIZON_DAYS: u32 = 90;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub caldav: CalDavConfig,
    #[serde(default)]
    pub calendars: CalendarNames,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub sources: SourcesConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CalDavConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub username: String,
    pub password: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CalDavConfig {
    fn default() -> Self {
        CalDavConfig {
            url: String::new(),
            username: String::new(),
            password: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl CalDavConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// `(url, username, password)`, failing if any is missing.
    pub fn credentials(&self) -> Result<(&str, &str, &str)> {
        if self.url.trim().is_empty() {
            bail!("caldav.url is not set (config file or CALSYNC_CALDAV__URL)");
        }
        if self.username.trim().is_empty() {
            bail!("caldav.username is not set (config file or CALSYNC_CALDAV__USERNAME)");
        }
        let password = self
            .password
            .as_deref()
            .context("caldav.password is not set (config file or CALSYNC_CALDAV__PASSWORD)")?;
        Ok((&self.url, &self.username, password))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncSettings {
    /// Title similarity an entry must exceed to count as the same event
    #[serde(default = "default_threshold")]
    pub dedup_threshold: f64,
    /// How far ahead sources are asked for events
    #[serde(default = "default_horizon_days")]
    pub max_future_days: u32,
    #[serde(default = "default_timeout_secs")]
    pub http_timeout_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            dedup_threshold: DEFAULT_DEDUP_THRESHOLD,
            max_future_days: DEFAULT_HORIZON_DAYS,
            http_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl SyncSettings {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

fn default_threshold() -> f64 {
    DEFAULT_DEDUP_THRESHOLD
}

fn default_horizon_days() -> u32 {
    DEFAULT_HORIZON_DAYS
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// `~/.config/calsync/config.toml`
pub fn default_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .context("Could not determine config directory")?
        .join("calsync");
    Ok(config_dir.join("config.toml"))
}

/// Load and validate configuration.
///
/// An explicitly given file must exist; the default file is optional.
pub fn load(path: Option<&Path>) -> Result<AppConfig> {
    let (path, required) = match path {
        Some(p) => (expand_path(p), true),
        None => (default_config_path()?, false),
    };

    let config: AppConfig = Config::builder()
        .add_source(File::from(path.as_path()).format(FileFormat::Toml).required(required))
        .add_source(
            Environment::with_prefix("CALSYNC")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?
        .try_deserialize()
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;

    config.validate()?;
    Ok(config)
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        let threshold = self.sync.dedup_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            bail!("sync.dedup_threshold must be in (0, 1], got {}", threshold);
        }
        if self.sync.max_future_days == 0 {
            bail!("sync.max_future_days must be at least 1");
        }
        if self.calendars.confirmed == self.calendars.possible {
            bail!(
                "calendars.confirmed and calendars.possible must differ (both are '{}')",
                self.calendars.confirmed
            );
        }
        Ok(())
    }
}

/// Expand a leading `~` in a path.
fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}
