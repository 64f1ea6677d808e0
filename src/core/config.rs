use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, TelemdError};

const DEFAULT_CGROUP_ROOT: &str = "/sys/fs/cgroup";
const DEFAULT_TELEMETRY_BUFFER: usize = 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub instruments: InstrumentsConfig,
    /// Root of the cgroup hierarchy the cgroup instruments scan
    pub cgroup_root: PathBuf,
    /// Capacity of the bounded telemetry channel
    pub telemetry_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            instruments: InstrumentsConfig::default(),
            cgroup_root: PathBuf::from(DEFAULT_CGROUP_ROOT),
            telemetry_buffer: DEFAULT_TELEMETRY_BUFFER,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentsConfig {
    pub net: DevicesConfig,
    pub disk: DevicesConfig,
    pub gpu: DevicesConfig,
    pub enable: Option<Vec<String>>,
    pub disable: Option<Vec<String>>,
    /// Sampling period per instrument key, in milliseconds
    pub periods: HashMap<String, u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DevicesConfig {
    pub devices: Vec<String>,
}

impl InstrumentsConfig {
    /// Configured period for an instrument. Zero is treated as unset.
    pub fn period(&self, key: &str) -> Option<Duration> {
        self.periods
            .get(key)
            .copied()
            .filter(|&ms| ms > 0)
            .map(Duration::from_millis)
    }

    pub fn set_period(&mut self, key: impl Into<String>, period: Duration) {
        self.periods.insert(key.into(), period.as_millis() as u64);
    }
}

impl Config {
    /// Load the configuration from the default location, then apply
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        let mut config = Self::read_or_default(&config_path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load the configuration from an explicit file. Unlike [`Config::load`],
    /// a missing file is an error.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(TelemdError::config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        let mut config = Self::read_or_default(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn read_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!("no config file at {}, using defaults", path.display());
            return Ok(Config::default());
        }

        let data = fs::read_to_string(path)?;
        if data.trim().is_empty() {
            return Ok(Config::default());
        }

        serde_json::from_str(&data).map_err(|e| {
            TelemdError::config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| TelemdError::config("could not determine config directory"))?;

        Ok(config_dir.join("telemd").join("config.json"))
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply `TELEMD_*` overrides fetched through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let instruments = &mut self.instruments;

        if let Some(value) = lookup("TELEMD_INSTRUMENTS_ENABLE") {
            instruments.enable = Some(split_list(&value));
        }
        if let Some(value) = lookup("TELEMD_INSTRUMENTS_DISABLE") {
            instruments.disable = Some(split_list(&value));
        }
        if let Some(value) = lookup("TELEMD_NET_DEVICES") {
            instruments.net.devices = split_list(&value);
        }
        if let Some(value) = lookup("TELEMD_DISK_DEVICES") {
            instruments.disk.devices = split_list(&value);
        }
        if let Some(value) = lookup("TELEMD_GPU_DEVICES") {
            instruments.gpu.devices = split_list(&value);
        }
        if let Some(value) = lookup("TELEMD_PERIODS") {
            for entry in split_list(&value) {
                match entry.split_once('=') {
                    Some((key, ms)) => match ms.trim().parse::<u64>() {
                        Ok(ms) => {
                            instruments.periods.insert(key.trim().to_string(), ms);
                        }
                        Err(_) => log::warn!("ignoring malformed period override '{}'", entry),
                    },
                    None => log::warn!("ignoring malformed period override '{}'", entry),
                }
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.telemetry_buffer == 0 {
            return Err(TelemdError::config("telemetry_buffer must be greater than 0"));
        }

        let mut zero: Vec<&str> = self
            .instruments
            .periods
            .iter()
            .filter(|(_, &ms)| ms == 0)
            .map(|(key, _)| key.as_str())
            .collect();
        if !zero.is_empty() {
            zero.sort_unstable();
            return Err(TelemdError::config(format!(
                "period must be greater than 0 for: {}",
                zero.join(", ")
            )));
        }

        Ok(())
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
