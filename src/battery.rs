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

//! Battery reading sources.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::{BatterySource, TelemetryConfig};

/// Default sysfs power supply directory.
const POWER_SUPPLY_DIR: &str = "/sys/class/power_supply";

/// Source of the current battery percentage.
pub trait BatteryReader: Send {
    /// Current battery level, 0-100.
    fn battery_level(&self) -> u8;
}

/// Always reports the same level.
#[derive(Debug, Clone, Copy)]
pub struct FixedBattery(pub u8);

impl BatteryReader for FixedBattery {
    fn battery_level(&self) -> u8 {
        self.0.min(100)
    }
}

/// Reads the first battery under `/sys/class/power_supply`.
#[derive(Debug, Clone)]
pub struct SysfsBattery {
    root: PathBuf,
    fallback: u8,
}

impl SysfsBattery {
    pub fn new(fallback: u8) -> Self {
        Self::with_root(POWER_SUPPLY_DIR, fallback)
    }

    pub fn with_root(root: impl Into<PathBuf>, fallback: u8) -> Self {
        Self {
            root: root.into(),
            fallback: fallback.min(100),
        }
    }

    fn read_capacity(&self) -> Option<u8> {
        let entries = fs::read_dir(&self.root).ok()?;
        for entry in entries.flatten() {
            let path = entry.path();
            if !is_battery(&path) {
                continue;
            }
            match fs::read_to_string(path.join("capacity")) {
                Ok(content) => match content.trim().parse::<u8>() {
                    Ok(level) => return Some(level.min(100)),
                    Err(e) => warn!("Invalid capacity in {:?}: {}", path, e),
                },
                Err(e) => debug!("No capacity for {:?}: {}", path, e),
            }
        }
        None
    }
}

fn is_battery(path: &Path) -> bool {
    fs::read_to_string(path.join("type"))
        .map(|t| t.trim() == "Battery")
        .unwrap_or(false)
}

impl BatteryReader for SysfsBattery {
    fn battery_level(&self) -> u8 {
        self.read_capacity().unwrap_or(self.fallback)
    }
}

/// Create the battery reader selected in the configuration.
pub fn create_reader(config: &TelemetryConfig) -> Box<dyn BatteryReader> {
    match config.battery_source {
        BatterySource::Sysfs => Box::new(SysfsBattery::new(config.fallback_battery_level)),
        BatterySource::Fixed => Box::new(FixedBattery(config.fallback_battery_level)),
    }
}
