//! Configuration management for the lm83d daemon.
//!
//! Handles loading, parsing, and validation of the YAML file describing
//! which adapters to scan, how often to refresh and where to publish channels.

use std::{
    collections::BTreeSet,
    env, fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use anyhow::{Context, Result};
use log::LevelFilter;
use serde::{Deserialize, Serialize};

use crate::drivers::lm83::{ForcedKind, NORMAL_ADDRESSES, is_candidate};

/// Main configuration structure for the lm83d daemon.
///
/// # Example
///
/// ```yaml
/// version: 1
/// log_level: info
/// update_interval_ms: 1000
/// monitor_interval_ms: 2000
/// adapters:
///   - bus: 0
///     addresses: [0x18, 0x4c]
///     force:
///       - address: 0x29
///         kind: any
/// dbus:
///   enabled: true
///   bus: system
///   name: io.github.lm83d
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Configuration version for compatibility checking.
    pub version: u8,

    #[serde(default = "defaults::log_level")]
    pub log_level: String,

    /// Chip update interval. Cached readings are reused for 1.5 intervals.
    #[serde(default = "defaults::update_interval_ms")]
    pub update_interval_ms: u64,

    /// Period of the monitor task; 0 disables it.
    #[serde(default = "defaults::monitor_interval_ms")]
    pub monitor_interval_ms: u64,

    #[serde(default = "defaults::adapters")]
    pub adapters: Vec<AdapterCfg>,

    #[serde(default)]
    pub dbus: DBusCfg,
}

/// One i2c adapter to scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterCfg {
    /// Adapter number, as in `/dev/i2c-N`.
    pub bus: u8,

    /// Restricts probing to these candidate addresses.
    #[serde(default)]
    pub addresses: Option<Vec<u16>>,

    /// Addresses where detection (and possibly identification) is skipped.
    #[serde(default)]
    pub force: Vec<ForceCfg>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForceCfg {
    pub address: u16,
    pub kind: ForcedKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DBusKind {
    System,
    Session,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DBusCfg {
    #[serde(default = "defaults::dbus_enabled")]
    pub enabled: bool,

    #[serde(default = "defaults::dbus_kind")]
    pub bus: DBusKind,

    #[serde(default = "defaults::dbus_name")]
    pub name: String,
}

impl Default for DBusCfg {
    fn default() -> Self {
        Self {
            enabled: defaults::dbus_enabled(),
            bus: defaults::dbus_kind(),
            name: defaults::dbus_name(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: 1,
            log_level: defaults::log_level(),
            update_interval_ms: defaults::update_interval_ms(),
            monitor_interval_ms: defaults::monitor_interval_ms(),
            adapters: defaults::adapters(),
            dbus: DBusCfg::default(),
        }
    }
}

impl AdapterCfg {
    /// Addresses to probe on this adapter, ascending and free of duplicates.
    pub fn scan_addresses(&self) -> Vec<u16> {
        let base = self
            .addresses
            .clone()
            .unwrap_or_else(|| NORMAL_ADDRESSES.to_vec());
        base.into_iter()
            .chain(self.force.iter().map(|f| f.address))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn forced_kind(&self, address: u16) -> Option<ForcedKind> {
        self.force
            .iter()
            .find(|f| f.address == address)
            .map(|f| f.kind)
    }
}

impl Config {
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    pub fn monitor_interval(&self) -> Option<Duration> {
        (self.monitor_interval_ms > 0).then(|| Duration::from_millis(self.monitor_interval_ms))
    }

    pub fn level_filter(&self) -> Result<LevelFilter> {
        LevelFilter::from_str(&self.log_level)
            .with_context(|| format!("Invalid log level '{}'", self.log_level))
    }

    /// Validates the configuration for consistency.
    ///
    /// Every address must belong to the candidate set of the chip.
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            anyhow::bail!("Unsupported config version {}", self.version);
        }
        if self.update_interval_ms == 0 {
            anyhow::bail!("update_interval_ms must be greater than zero");
        }
        self.level_filter()?;

        let mut seen = BTreeSet::new();
        for adapter in &self.adapters {
            if !seen.insert(adapter.bus) {
                anyhow::bail!("Adapter i2c-{} listed twice", adapter.bus);
            }
            let listed = adapter.addresses.iter().flatten();
            let forced = adapter.force.iter().map(|f| &f.address);
            if let Some(bad) = listed.chain(forced).find(|a| !is_candidate(**a)) {
                anyhow::bail!(
                    "Address 0x{bad:02x} on i2c-{} is not a candidate address for the LM83",
                    adapter.bus
                );
            }
        }

        if self.dbus.enabled && self.dbus.name.trim().is_empty() {
            anyhow::bail!("dbus.name cannot be empty");
        }
        Ok(())
    }

    /// Loads configuration from a file or the standard locations.
    ///
    /// Searches in order:
    /// 1. Provided path parameter
    /// 2. LM83D_CONFIG environment variable
    /// 3. XDG_CONFIG_HOME/lm83d/config.yml or ~/.config/lm83d/config.yml
    /// 4. /etc/lm83d/config.yml
    ///
    /// Falls back to [`Config::default`] when none exists.
    ///
    /// Nothing is logged here: this runs before the logger exists. Callers
    /// that want to report the source resolve it with [`locate_config`].
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        match path.or_else(locate_config) {
            Some(path) => Self::load_from_path(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML in: {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Configuration validation failed for: {}", path.display()))?;

        Ok(config)
    }
}

/// First existing configuration file in the standard locations.
pub fn locate_config() -> Option<PathBuf> {
    if let Ok(env_path) = env::var("LM83D_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    if let Some(mut cfg_dir) = env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| env::var_os("HOME").map(|h| Path::new(&h).join(".config")))
    {
        cfg_dir.push("lm83d/config.yml");
        if cfg_dir.exists() {
            return Some(cfg_dir);
        }
    }

    let etc = Path::new("/etc/lm83d/config.yml");
    etc.exists().then(|| etc.to_path_buf())
}

mod defaults {
    use super::{AdapterCfg, DBusKind};

    pub fn log_level() -> String {
        "info".to_string()
    }

    pub fn update_interval_ms() -> u64 {
        1000
    }

    pub fn monitor_interval_ms() -> u64 {
        2000
    }

    pub fn adapters() -> Vec<AdapterCfg> {
        vec![AdapterCfg {
            bus: 0,
            addresses: None,
            force: Vec::new(),
        }]
    }

    pub fn dbus_enabled() -> bool {
        true
    }

    pub fn dbus_kind() -> DBusKind {
        DBusKind::System
    }

    pub fn dbus_name() -> String {
        "io.github.lm83d".to_string()
    }
}
