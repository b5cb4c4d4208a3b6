//! ---
//! ripc_section: "01-core-functionality"
//! ripc_subsection: "module"
//! ripc_type: "source"
//! ripc_scope: "code"
//! ripc_description: "Shared configuration and logging for IPC tooling."
//! ripc_version: "v0.1.0"
//! ripc_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use ripc_msg::connect::DEFAULT_BROKER_PORT;
use ripc_msg::{BrokerConfig, TimeoutPolicy, DEFAULT_THREAD};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSecondsWithFrac};
use tracing::debug;

use crate::logging::LogFormat;

fn default_timeout() -> Duration {
    Duration::from_secs(1)
}

fn default_thread() -> String {
    DEFAULT_THREAD.to_owned()
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

/// Configuration shared by IPC processes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub broker: BrokerSection,
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    /// `None` when no file was found and defaults apply.
    pub source: Option<PathBuf>,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "RIPC_CONFIG";

    /// Load configuration from disk, respecting the `RIPC_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration together with the file it came from.
    ///
    /// `RIPC_CONFIG` must name a readable file when set. Otherwise the first
    /// existing candidate wins, and defaults apply when none exists.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        for candidate in candidates {
            let path = candidate.as_ref();
            if path.exists() {
                let config = Self::from_path(path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path.to_path_buf()),
                });
            }
        }

        debug!("no configuration file found; using defaults");
        Ok(LoadedAppConfig {
            config: Self::default(),
            source: None,
        })
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        contents
            .parse::<Self>()
            .with_context(|| format!("failed to load config file {}", path.display()))
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.client.validate()?;
        self.broker.validate()
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Where to find the broker. Unset fields fall back to the `RIPC_*`
/// environment variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrokerSection {
    #[serde(default)]
    pub socket_path: Option<PathBuf>,
    /// Network host; takes precedence over the socket when set.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
}

impl BrokerSection {
    /// Resolve the connection parameters once for the whole process.
    pub fn resolve(&self) -> BrokerConfig {
        self.resolve_with(BrokerConfig::from_env)
    }

    fn resolve_with(&self, from_env: impl FnOnce() -> BrokerConfig) -> BrokerConfig {
        if let Some(host) = &self.host {
            return BrokerConfig::tcp(host.clone(), self.port.unwrap_or(DEFAULT_BROKER_PORT));
        }
        if let Some(path) = &self.socket_path {
            return BrokerConfig::unix_socket(path.clone());
        }
        from_env()
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.as_deref().is_some_and(|host| host.trim().is_empty()) {
            return Err(anyhow!("broker host must not be empty"));
        }
        if self.port.is_some() && self.host.is_none() {
            return Err(anyhow!("broker port is set but no broker host"));
        }
        Ok(())
    }
}

/// Defaults for client invocations.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSection {
    /// Reply timeout in (fractional) seconds.
    #[serde(default = "default_timeout")]
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub default_timeout: Duration,
    #[serde(default = "default_thread")]
    pub thread: String,
    #[serde(default)]
    pub timeout_policy: TimeoutPolicy,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            default_timeout: default_timeout(),
            thread: default_thread(),
            timeout_policy: TimeoutPolicy::default(),
        }
    }
}

impl ClientSection {
    pub fn validate(&self) -> Result<()> {
        if self.default_timeout.is_zero() {
            return Err(anyhow!("client default_timeout must be positive"));
        }
        if self.thread.trim().is_empty() {
            return Err(anyhow!("client thread name must not be empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    /// Directory for a rolling daily log file; stderr only when unset.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
            directory: None,
            file_prefix: None,
        }
    }
}
