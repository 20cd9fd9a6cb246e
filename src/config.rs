//! Run configuration.
//!
//! Fetch behaviour (timeouts, concurrency, retries, user agent) comes from an
//! optional YAML file; everything else comes from the command line. Both end
//! up in one [`RunConfig`] that is passed explicitly into the pipeline.
//!
//! ```yaml
//! fetch_timeout_secs: 30
//! run_timeout_secs: 600
//! concurrency: 8
//! max_retries: 3
//! retry_base_delay_ms: 1000
//! user_agent: "race_results/0.3"
//! ```

use crate::error::ConfigError;
use clap::ValueEnum;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, instrument};

/// Fetch settings as written in the YAML file. Missing keys take defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchSettings {
    pub fetch_timeout_secs: u64,
    pub run_timeout_secs: u64,
    pub concurrency: usize,
    pub max_retries: usize,
    pub retry_base_delay_ms: u64,
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: 30,
            run_timeout_secs: 600,
            concurrency: 8,
            max_retries: 3,
            retry_base_delay_ms: 1000,
            user_agent: format!("race_results/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl FetchSettings {
    pub fn from_yaml(text: &str, path: &str) -> Result<Self, ConfigError> {
        let settings: Self = serde_yaml::from_str(text).map_err(|source| ConfigError::Yaml {
            path: path.to_string(),
            source,
        })?;
        settings.validate()
    }

    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;
        let settings = Self::from_yaml(&text, &path.display().to_string())?;
        info!(?settings, "Loaded fetch settings");
        Ok(settings)
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".into()));
        }
        if self.fetch_timeout_secs == 0 || self.run_timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be positive".into()));
        }
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::Invalid("user_agent must not be empty".into()));
        }
        Ok(self)
    }
}

/// Log levels accepted by `--verbose`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Verbosity {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

impl Verbosity {
    /// `EnvFilter` directive for this level. `tracing` has no level above
    /// error, so critical maps onto it.
    pub fn filter_directive(self) -> &'static str {
        match self {
            Verbosity::Debug => "debug",
            Verbosity::Info => "info",
            Verbosity::Warning => "warn",
            Verbosity::Error | Verbosity::Critical => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Html,
    Json,
}

impl OutputFormat {
    /// `.json` files get JSON, everything else HTML.
    pub fn infer(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => OutputFormat::Json,
            _ => OutputFormat::Html,
        }
    }
}

/// Everything a run needs besides the adapter, roster and date range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub verbosity: Verbosity,
    pub output: PathBuf,
    pub format: OutputFormat,
    pub fetch_timeout: Duration,
    pub run_timeout: Duration,
    pub concurrency: usize,
    pub max_retries: usize,
    pub retry_base_delay: Duration,
    pub user_agent: String,
}

impl RunConfig {
    pub fn new(
        settings: FetchSettings,
        verbosity: Verbosity,
        output: PathBuf,
        format: Option<OutputFormat>,
    ) -> Self {
        let format = format.unwrap_or_else(|| OutputFormat::infer(&output));
        Self {
            verbosity,
            output,
            format,
            fetch_timeout: Duration::from_secs(settings.fetch_timeout_secs),
            run_timeout: Duration::from_secs(settings.run_timeout_secs),
            concurrency: settings.concurrency,
            max_retries: settings.max_retries,
            retry_base_delay: Duration::from_millis(settings.retry_base_delay_ms),
            user_agent: settings.user_agent,
        }
    }
}
