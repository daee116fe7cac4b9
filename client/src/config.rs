//! Portal configuration, read from YAML.

use crate::{defaults, portal};
use chainlet_types::Deployment;
use serde::{Deserialize, Serialize};
use std::{path::Path, str::FromStr, time::Duration};
use thiserror::Error;
use tracing::Level;
use url::Url;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub deployment: Deployment,
    /// JSON-RPC endpoint of the wallet. Without one the portal runs read-only.
    #[serde(default)]
    pub wallet_url: Option<String>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_wallet_watch_interval_ms")]
    pub wallet_watch_interval_ms: u64,
    #[serde(default = "default_enter_game_delay_ms")]
    pub enter_game_delay_ms: u64,
    #[serde(default = "default_mailbox_size")]
    pub mailbox_size: usize,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid log level: {value}")]
    InvalidLogLevel { value: String },
    #[error("{field} must be > 0 (got {value})")]
    InvalidNonZero { field: &'static str, value: u64 },
    #[error("{field} must be a valid URL: {value}")]
    InvalidUrl { field: &'static str, value: String },
    #[error("{field} URL scheme must be http or https: {value}")]
    InvalidUrlScheme { field: &'static str, value: String },
    #[error("contract address must not be the zero address")]
    InvalidContract,
}

pub struct ValidatedConfig {
    pub deployment: Deployment,
    pub wallet_url: Option<Url>,
    pub poll_interval: Duration,
    pub wallet_watch_interval: Duration,
    pub enter_game_delay: Duration,
    pub mailbox_size: usize,
    pub log_level: Level,
}

fn default_poll_interval_ms() -> u64 {
    defaults::DEFAULT_POLL_INTERVAL_MS
}

fn default_wallet_watch_interval_ms() -> u64 {
    defaults::DEFAULT_WALLET_WATCH_INTERVAL_MS
}

fn default_enter_game_delay_ms() -> u64 {
    defaults::DEFAULT_ENTER_GAME_DELAY_MS
}

fn default_mailbox_size() -> usize {
    defaults::DEFAULT_MAILBOX_SIZE
}

fn default_log_level() -> String {
    defaults::DEFAULT_LOG_LEVEL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            deployment: Deployment::default(),
            wallet_url: None,
            poll_interval_ms: default_poll_interval_ms(),
            wallet_watch_interval_ms: default_wallet_watch_interval_ms(),
            enter_game_delay_ms: default_enter_game_delay_ms(),
            mailbox_size: default_mailbox_size(),
            log_level: default_log_level(),
        }
    }
}

fn ensure_nonzero(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidNonZero { field, value });
    }
    Ok(())
}

fn ensure_http(field: &'static str, url: &Url) -> Result<(), ConfigError> {
    match url.scheme() {
        "http" | "https" => {}
        _ => {
            return Err(ConfigError::InvalidUrlScheme {
                field,
                value: url.to_string(),
            })
        }
    }
    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl {
            field,
            value: url.to_string(),
        });
    }
    Ok(())
}

fn parse_http_url(field: &'static str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|_| ConfigError::InvalidUrl {
        field,
        value: value.to_string(),
    })?;
    ensure_http(field, &url)?;
    Ok(url)
}

impl Config {
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(contents)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&contents)
    }

    pub fn validate(self) -> Result<ValidatedConfig, ConfigError> {
        ensure_nonzero("poll_interval_ms", self.poll_interval_ms)?;
        ensure_nonzero("wallet_watch_interval_ms", self.wallet_watch_interval_ms)?;
        ensure_nonzero("mailbox_size", self.mailbox_size as u64)?;
        ensure_http("deployment.chain.rpc_endpoint", &self.deployment.chain.rpc_endpoint)?;
        ensure_http("deployment.game_url", &self.deployment.game_url)?;
        if self.deployment.contract.is_zero() {
            return Err(ConfigError::InvalidContract);
        }
        let wallet_url = self
            .wallet_url
            .as_deref()
            .map(|value| parse_http_url("wallet_url", value))
            .transpose()?;
        let log_level =
            Level::from_str(&self.log_level).map_err(|_| ConfigError::InvalidLogLevel {
                value: self.log_level.clone(),
            })?;

        Ok(ValidatedConfig {
            deployment: self.deployment,
            wallet_url,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            wallet_watch_interval: Duration::from_millis(self.wallet_watch_interval_ms),
            enter_game_delay: Duration::from_millis(self.enter_game_delay_ms),
            mailbox_size: self.mailbox_size,
            log_level,
        })
    }
}

impl ValidatedConfig {
    /// Settings for the portal actor.
    pub fn portal(&self) -> portal::Config {
        portal::Config {
            deployment: self.deployment.clone(),
            poll_interval: self.poll_interval,
            enter_game_delay: self.enter_game_delay,
            mailbox_size: self.mailbox_size,
        }
    }
}
