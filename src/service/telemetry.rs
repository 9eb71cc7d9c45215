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

//! Simulated telemetry values.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use super::registry::CharacteristicKind;
use crate::battery::BatteryReader;

/// Labels reported on the device state characteristic.
pub const DEVICE_STATES: [&str; 5] = [
    "Uploading",
    "Needs Verification",
    "Processing",
    "Needs Review",
    "Completed",
];

/// Computes the next value of each notifiable characteristic.
pub struct Telemetry {
    battery: Box<dyn BatteryReader>,
    rng: StdRng,
    /// Seconds of recording, shared across job restarts.
    elapsed_recording_time: u64,
}

impl Telemetry {
    pub fn new(battery: Box<dyn BatteryReader>) -> Self {
        Self::with_rng(battery, StdRng::from_entropy())
    }

    pub fn with_rng(battery: Box<dyn BatteryReader>, rng: StdRng) -> Self {
        Self {
            battery,
            rng,
            elapsed_recording_time: 0,
        }
    }

    /// Produce a fresh value for `kind`, or `None` if it is not notifiable.
    pub fn sample(&mut self, kind: CharacteristicKind) -> Option<Vec<u8>> {
        let value = match kind {
            CharacteristicKind::BatteryLevel => {
                let jitter: u8 = self.rng.gen_range(1..=5);
                vec![self.battery.battery_level().saturating_sub(jitter)]
            }
            CharacteristicKind::UploadCount => vec![self.rng.gen_range(1..=4u8)],
            CharacteristicKind::PostCount => vec![self.rng.gen_range(6..=9u8)],
            CharacteristicKind::RecordingTime => {
                self.elapsed_recording_time += 1;
                self.elapsed_recording_time.to_le_bytes().to_vec()
            }
            CharacteristicKind::DeviceState => {
                let label = DEVICE_STATES.choose(&mut self.rng).copied().unwrap_or(DEVICE_STATES[0]);
                label.as_bytes().to_vec()
            }
            CharacteristicKind::StartInspection
            | CharacteristicKind::StopInspection
            | CharacteristicKind::SetWaypoint
            | CharacteristicKind::SetCheckpoint => return None,
        };
        Some(value)
    }

    pub fn elapsed_recording_time(&self) -> u64 {
        self.elapsed_recording_time
    }
}

impl std::fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Telemetry")
            .field("elapsed_recording_time", &self.elapsed_recording_time)
            .finish_non_exhaustive()
    }
}
