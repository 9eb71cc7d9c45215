// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Configuration module.
//!
//! Handles loading and saving peripheral settings.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bluetooth settings.
    pub bluetooth: BluetoothConfig,

    /// Telemetry simulation settings.
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BluetoothConfig {
    /// Local name advertised over Bluetooth.
    pub device_name: String,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            device_name: "Capture".to_string(),
        }
    }
}

/// Where battery readings come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatterySource {
    /// First battery under /sys/class/power_supply.
    Sysfs,
    /// Always `fallback_battery_level`.
    Fixed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub battery_period_ms: u64,
    pub upload_period_ms: u64,
    pub post_period_ms: u64,
    pub recording_time_period_ms: u64,
    pub device_state_period_ms: u64,

    pub battery_source: BatterySource,

    /// Battery level used when no reading is available.
    pub fallback_battery_level: u8,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            battery_period_ms: 5000,
            upload_period_ms: 1000,
            post_period_ms: 1000,
            recording_time_period_ms: 1000,
            device_state_period_ms: 5000,
            battery_source: BatterySource::Sysfs,
            fallback_battery_level: 100,
        }
    }
}

impl TelemetryConfig {
    /// Reject periods a timer cannot run on.
    pub fn validate(&self) -> Result<()> {
        let periods = [
            ("battery_period_ms", self.battery_period_ms),
            ("upload_period_ms", self.upload_period_ms),
            ("post_period_ms", self.post_period_ms),
            ("recording_time_period_ms", self.recording_time_period_ms),
            ("device_state_period_ms", self.device_state_period_ms),
        ];
        for (name, period) in periods {
            if period == 0 {
                anyhow::bail!("telemetry.{} must be greater than zero", name);
            }
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from file or create default.
    pub fn load() -> Result<Self> {
        let config_dir = Self::config_dir();
        std::fs::create_dir_all(&config_dir)?;
        Self::load_from(&config_dir.join("config.toml"))
    }

    /// Load configuration from `path`, writing defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_toml_str(&content)
        } else {
            let config = Self::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Parse configuration from TOML. Missing fields take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.telemetry.validate()?;
        Ok(config)
    }

    fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("capture-peripheral")
    }
}
