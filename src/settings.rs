//! Layered runtime settings
//!
//! Resolution order (later wins): built-in defaults, an optional settings
//! file (`fww.toml`/`fww.yaml`/`fww.json` in the working directory, or the
//! path given with `--config`), `FWW_*` environment variables, and finally
//! command-line flags.

use anyhow::{Context, Result, bail};
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default panel port of the firewall service
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:48080";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Root URL of the firewall service
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Seconds between poll cycles
    pub poll_interval_secs: u64,
    /// Per-request timeout, 0 disables it
    pub request_timeout_secs: u64,
    /// Default payload size for speed-test rounds
    pub speedtest_size_mb: u32,
    /// Number of rounds in multi mode
    pub speedtest_rounds: usize,
    /// How long transient notifications stay visible
    pub toast_millis: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            username: None,
            password: None,
            poll_interval_secs: 3,
            request_timeout_secs: 60,
            speedtest_size_mb: 20,
            speedtest_rounds: 5,
            toast_millis: 1500,
        }
    }
}

impl Settings {
    /// Loads settings from defaults, file and environment
    ///
    /// An explicitly named file must exist; the implicit `fww.*` file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = ::config::Config::try_from(&Settings::default())
            .context("Failed to build default settings")?;

        let mut builder = ::config::Config::builder().add_source(defaults);
        builder = match path {
            Some(path) => builder.add_source(::config::File::from(path).required(true)),
            None => builder.add_source(::config::File::with_name("fww").required(false)),
        };
        builder = builder.add_source(
            ::config::Environment::with_prefix("FWW").try_parsing(true),
        );

        let settings: Settings = builder
            .build()
            .context("Failed to read settings")?
            .try_deserialize()
            .context("Invalid settings")?;

        settings.validate()?;
        debug!("Loaded settings: {:?}", settings.redacted());
        Ok(settings)
    }

    /// Applies command-line overrides on top of the loaded values
    pub fn with_overrides(
        mut self,
        base_url: Option<String>,
        username: Option<String>,
        password: Option<String>,
    ) -> Result<Self> {
        if let Some(url) = base_url {
            self.base_url = url;
        }
        if username.is_some() {
            self.username = username;
        }
        if password.is_some() {
            self.password = password;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        let url = self.base_url.trim();
        if url.is_empty() {
            bail!("base_url must not be empty");
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            bail!("base_url must start with http:// or https:// (got '{}')", url);
        }
        if self.poll_interval_secs == 0 {
            bail!("poll_interval_secs must be at least 1");
        }
        if self.speedtest_rounds == 0 {
            bail!("speedtest_rounds must be at least 1");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn toast_duration(&self) -> Duration {
        Duration::from_millis(self.toast_millis)
    }

    /// Copy that is safe to log
    fn redacted(&self) -> Settings {
        Settings {
            password: self.password.as_ref().map(|_| "***".to_string()),
            ..self.clone()
        }
    }
}
