//! Studio configuration.

use crate::error::{GenStudioError, Result};
use crate::image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Output directory used when none is configured.
pub const DEFAULT_OUTPUT_DIR: &str = "generated_images";

/// Color scheme selection for the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    /// Detect from the terminal environment at startup.
    #[default]
    Auto,
    /// Dark palette.
    Dark,
    /// Light palette.
    Light,
}

/// Settings loaded from `config.json`, with credential env vars layered on top.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding generated images and `gallery.jsonl`.
    pub output_dir: PathBuf,
    /// Stability AI key; `STABILITY_API_KEY` wins when set.
    pub stability_api_key: Option<String>,
    /// fal.ai key; `FAL_KEY` wins when set.
    pub fal_api_key: Option<String>,
    /// Stability generate endpoint.
    pub stability_endpoint: Option<String>,
    /// fal.ai queue base URL.
    pub fal_queue_url: Option<String>,
    /// Format requested from Stability.
    pub output_format: ImageFormat,
    /// Run the comparison request alongside the primary one.
    pub concurrent_comparison: bool,
    /// fal.ai status polling interval.
    pub poll_interval_ms: u64,
    /// Longest wait for a fal.ai job.
    pub timeout_secs: u64,
    /// Front-end color scheme.
    pub theme: ThemeMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            stability_api_key: None,
            fal_api_key: None,
            stability_endpoint: None,
            fal_queue_url: None,
            output_format: ImageFormat::Png,
            concurrent_comparison: false,
            poll_interval_ms: 1000,
            timeout_secs: 600,
            theme: ThemeMode::Auto,
        }
    }
}

impl Config {
    /// Loads the config from `path`, or from the default location when `None`.
    ///
    /// A missing file yields the defaults. Credential env vars are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let config = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content).map_err(|e| {
                GenStudioError::Config(format!("{}: {}", path.display(), e))
            })?
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Self::default()
        };

        Ok(config.with_env_overrides(|name| std::env::var(name).ok()))
    }

    /// Writes the config as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Default config file location: `<config_dir>/genstudio/config.json`.
    pub fn config_path() -> Result<PathBuf> {
        let base = dirs::config_dir()
            .ok_or_else(|| GenStudioError::Config("no config directory on this platform".into()))?;
        Ok(base.join("genstudio").join("config.json"))
    }

    /// Applies credential env vars through `lookup`. Empty values are ignored.
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(key) = non_empty("STABILITY_API_KEY") {
            self.stability_api_key = Some(key);
        }
        if let Some(key) = non_empty("FAL_KEY") {
            self.fal_api_key = Some(key);
        }
        self
    }

    /// fal.ai polling interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// fal.ai job timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
