use anyhow::{Context, Result};
use reqwest::Url;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::registry::NodeIdentifier;
use crate::types::MatchPolicy;

pub const DEFAULT_NETWORK: &str = "mainnet";
pub const DEFAULT_TOLERANCE: u64 = 10;
pub const DEFAULT_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_RESTART_TIMEOUT_SECS: u64 = 60;

/// Settings from one source (TOML file or command line). Unset fields fall
/// through to the next source.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialConfig {
    pub network: Option<String>,
    pub node_id: Option<String>,
    pub local_url: Option<String>,
    pub reference_url: Option<String>,
    pub registry_url: Option<String>,
    pub tolerance: Option<u64>,
    pub restart_command: Option<Vec<String>>,
    pub interval_secs: Option<u64>,
    pub fetch_timeout_secs: Option<u64>,
    pub restart_timeout_secs: Option<u64>,
    pub registry_match: Option<MatchPolicy>,
    pub dry_run: Option<bool>,
}

impl PartialConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {:?}", path))?;
        let cfg = toml::from_str(&text).with_context(|| format!("Failed to parse {:?}", path))?;
        Ok(cfg)
    }

    /// Fields set in `over` win.
    pub fn overlay(self, over: PartialConfig) -> PartialConfig {
        PartialConfig {
            network: over.network.or(self.network),
            node_id: over.node_id.or(self.node_id),
            local_url: over.local_url.or(self.local_url),
            reference_url: over.reference_url.or(self.reference_url),
            registry_url: over.registry_url.or(self.registry_url),
            tolerance: over.tolerance.or(self.tolerance),
            restart_command: over.restart_command.or(self.restart_command),
            interval_secs: over.interval_secs.or(self.interval_secs),
            fetch_timeout_secs: over.fetch_timeout_secs.or(self.fetch_timeout_secs),
            restart_timeout_secs: over.restart_timeout_secs.or(self.restart_timeout_secs),
            registry_match: over.registry_match.or(self.registry_match),
            dry_run: over.dry_run.or(self.dry_run),
        }
    }
}

/// Everything the watchdog needs to know about the node it guards. Built
/// once at startup and never changed.
#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    pub network: String,
    pub node_id: NodeIdentifier,
    pub local_url: String,
    pub reference_url: String,
    pub registry_url: String,
    pub tolerance: u64,
    pub restart_command: Vec<String>,
    pub interval: Duration,
    pub fetch_timeout: Duration,
    pub restart_timeout: Duration,
    pub registry_match: MatchPolicy,
    pub dry_run: bool,
}

impl WatchdogConfig {
    /// Validate merged settings. `default_node_id` is only called when no
    /// node id was given.
    pub fn resolve<F>(partial: PartialConfig, default_node_id: F) -> Result<Self>
    where
        F: FnOnce() -> Result<String>,
    {
        let node_id = match partial.node_id {
            Some(id) => id,
            None => default_node_id().context("Failed to determine node id")?,
        };
        let node_id = NodeIdentifier::new(node_id)?;

        let local_url = required_url("local_url", partial.local_url)?;
        let reference_url = required_url("reference_url", partial.reference_url)?;
        let registry_url = required_url("registry_url", partial.registry_url)?;

        let restart_command = partial
            .restart_command
            .ok_or(ConfigError::Missing("restart_command"))?;
        if restart_command.first().map_or(true, |p| p.trim().is_empty()) {
            return Err(ConfigError::EmptyRestartCommand.into());
        }

        Ok(Self {
            network: partial.network.unwrap_or_else(|| DEFAULT_NETWORK.to_string()),
            node_id,
            local_url,
            reference_url,
            registry_url,
            tolerance: partial.tolerance.unwrap_or(DEFAULT_TOLERANCE),
            restart_command,
            interval: seconds("interval_secs", partial.interval_secs, DEFAULT_INTERVAL_SECS)?,
            fetch_timeout: seconds(
                "fetch_timeout_secs",
                partial.fetch_timeout_secs,
                DEFAULT_FETCH_TIMEOUT_SECS,
            )?,
            restart_timeout: seconds(
                "restart_timeout_secs",
                partial.restart_timeout_secs,
                DEFAULT_RESTART_TIMEOUT_SECS,
            )?,
            registry_match: partial.registry_match.unwrap_or_default(),
            dry_run: partial.dry_run.unwrap_or(false),
        })
    }
}

fn required_url(key: &'static str, value: Option<String>) -> Result<String, ConfigError> {
    let value = value.ok_or(ConfigError::Missing(key))?;
    let url = Url::parse(&value).map_err(|e| ConfigError::InvalidUrl {
        key,
        value: value.clone(),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl {
            key,
            value,
            reason: format!("unsupported scheme {}", url.scheme()),
        });
    }
    Ok(value)
}

fn seconds(key: &'static str, value: Option<u64>, default: u64) -> Result<Duration, ConfigError> {
    match value.unwrap_or(default) {
        0 => Err(ConfigError::ZeroDuration(key)),
        secs => Ok(Duration::from_secs(secs)),
    }
}
