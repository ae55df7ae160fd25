//! Load config from file and environment.

use std::path::PathBuf;
use std::time::Duration;

use scout_core::{DiscoveryConfig, DEFAULT_CAPABILITY};
use serde::Deserialize;
use tracing::{debug, warn};

/// Discovery configuration. File: ~/.config/syncscout/config.toml or /etc/syncscout/config.toml.
/// Env overrides: SYNCSCOUT_CAPABILITY, SYNCSCOUT_TICK_MS, SYNCSCOUT_FETCH_TIMEOUT_TICKS.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Capability identifier a peer must advertise (default: SyncML service class UUID).
    #[serde(default = "default_capability")]
    pub capability: String,
    /// Tick period in milliseconds (default 1000).
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Ticks before an unanswered property fetch is abandoned (default 0 = wait forever).
    #[serde(default)]
    pub fetch_timeout_ticks: u64,
}

fn default_capability() -> String {
    DEFAULT_CAPABILITY.to_owned()
}
fn default_tick_interval_ms() -> u64 {
    1000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capability: default_capability(),
            tick_interval_ms: default_tick_interval_ms(),
            fetch_timeout_ticks: 0,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn core_config(&self) -> DiscoveryConfig {
        DiscoveryConfig {
            capability: self.capability.clone(),
            fetch_timeout_ticks: self.fetch_timeout_ticks,
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    /// Apply overrides from a variable lookup. Unparseable values are ignored.
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(s) = var("SYNCSCOUT_CAPABILITY") {
            if !s.is_empty() {
                self.capability = s;
            }
        }
        if let Some(s) = var("SYNCSCOUT_TICK_MS") {
            match s.parse::<u64>() {
                Ok(v) => self.tick_interval_ms = v,
                Err(_) => warn!(value = %s, "Ignoring invalid SYNCSCOUT_TICK_MS"),
            }
        }
        if let Some(s) = var("SYNCSCOUT_FETCH_TIMEOUT_TICKS") {
            match s.parse::<u64>() {
                Ok(v) => self.fetch_timeout_ticks = v,
                Err(_) => warn!(value = %s, "Ignoring invalid SYNCSCOUT_FETCH_TIMEOUT_TICKS"),
            }
        }
    }
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> Config {
    load_from(&config_paths(), |k| std::env::var(k).ok())
}

/// `load` with the file candidates and variable lookup supplied by the caller.
pub fn load_from(paths: &[PathBuf], var: impl Fn(&str) -> Option<String>) -> Config {
    let mut c = match load_file(paths) {
        Ok(Some(c)) => c,
        Ok(None) => Config::default(),
        Err(e) => {
            warn!(error = %e, "Falling back to default config");
            Config::default()
        }
    };
    c.apply_env(var);
    c
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/syncscout/config.toml"));
    }
    out.push(PathBuf::from("/etc/syncscout/config.toml"));
    out
}

/// First existing config file wins.
fn load_file(paths: &[PathBuf]) -> Result<Option<Config>, ConfigError> {
    for p in paths {
        if p.exists() {
            debug!(path = %p.display(), "Loading config file");
            let s = std::fs::read_to_string(p).map_err(|source| ConfigError::Read {
                path: p.clone(),
                source,
            })?;
            return Config::from_toml_str(&s).map(Some);
        }
    }
    Ok(None)
}
