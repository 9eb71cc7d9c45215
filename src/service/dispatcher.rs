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

//! Write command decoding and execution.

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::registry::{CharacteristicKind, Registry};
use crate::bluetooth::ble_constants::{checkpoint, GattStatus};
use crate::error::{Result, ServiceError};

/// A decoded write command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    StartInspection,
    StopInspection,
    SetWaypoint,
    /// Checkpoint coordinates.
    SetCheckpoint { x: f32, y: f32 },
}

impl Command {
    /// Decode the payload written to a characteristic of `kind`.
    ///
    /// Only set checkpoint carries data; the other commands are bare triggers
    /// and accept any payload.
    pub fn decode(kind: CharacteristicKind, payload: &[u8]) -> Result<Option<Self>> {
        let command = match kind {
            CharacteristicKind::StartInspection => Self::StartInspection,
            CharacteristicKind::StopInspection => Self::StopInspection,
            CharacteristicKind::SetWaypoint => Self::SetWaypoint,
            CharacteristicKind::SetCheckpoint => {
                let (x, y) = decode_checkpoint(payload)?;
                Self::SetCheckpoint { x, y }
            }
            _ => return Ok(None),
        };
        Ok(Some(command))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StartInspection => "START_INSPECTION",
            Self::StopInspection => "STOP_INSPECTION",
            Self::SetWaypoint => "SET_WAYPOINT",
            Self::SetCheckpoint { .. } => "SET_CHECKPOINT",
        }
    }
}

/// Decode two big-endian f32 values from the start of `payload`.
fn decode_checkpoint(payload: &[u8]) -> Result<(f32, f32)> {
    let Some(bytes) = payload.get(..checkpoint::PAYLOAD_SIZE) else {
        return Err(ServiceError::InvalidPayload {
            expected: checkpoint::PAYLOAD_SIZE,
            actual: payload.len(),
        });
    };
    let (x, y) = bytes.split_at(checkpoint::COORDINATE_SIZE);
    let x = f32::from_be_bytes([x[0], x[1], x[2], x[3]]);
    let y = f32::from_be_bytes([y[0], y[1], y[2], y[3]]);
    Ok((x, y))
}

/// Encode checkpoint coordinates the way a central writes them.
pub fn encode_checkpoint(x: f32, y: f32) -> Vec<u8> {
    let mut payload = Vec::with_capacity(checkpoint::PAYLOAD_SIZE);
    payload.extend_from_slice(&x.to_be_bytes());
    payload.extend_from_slice(&y.to_be_bytes());
    payload
}

/// Side effects of a decoded command.
pub trait CommandHandler: Send {
    fn execute(&mut self, command: &Command);
}

/// Default handler: records the inspection state and logs each command.
#[derive(Debug, Default)]
pub struct InspectionLog {
    inspecting: bool,
    waypoints: u32,
    last_checkpoint: Option<(f32, f32)>,
}

impl InspectionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_inspecting(&self) -> bool {
        self.inspecting
    }

    pub fn waypoints(&self) -> u32 {
        self.waypoints
    }

    pub fn last_checkpoint(&self) -> Option<(f32, f32)> {
        self.last_checkpoint
    }
}

impl CommandHandler for InspectionLog {
    fn execute(&mut self, command: &Command) {
        match *command {
            Command::StartInspection => {
                if self.inspecting {
                    warn!("Start inspection while already inspecting");
                }
                self.inspecting = true;
                info!("Start inspection");
            }
            Command::StopInspection => {
                self.inspecting = false;
                info!("Stop inspection");
            }
            Command::SetWaypoint => {
                self.waypoints += 1;
                info!("Set waypoint #{}", self.waypoints);
            }
            Command::SetCheckpoint { x, y } => {
                self.last_checkpoint = Some((x, y));
                info!("Set checkpoint X: {} Y: {}", x, y);
            }
        }
    }
}

/// Validates inbound writes and hands them to a [`CommandHandler`].
pub struct Dispatcher {
    handler: Box<dyn CommandHandler>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(Box::new(InspectionLog::new()))
    }
}

impl Dispatcher {
    pub fn new(handler: Box<dyn CommandHandler>) -> Self {
        Self { handler }
    }

    /// Handle a write and report its status.
    pub fn handle_write(&mut self, registry: &mut Registry, id: Uuid, payload: &[u8]) -> GattStatus {
        match self.dispatch(registry, id, payload) {
            Ok(command) => {
                debug!("Executed {}", command.as_str());
                GattStatus::Success
            }
            Err(e) => {
                warn!("Rejected write to {}: {}", id, e);
                GattStatus::Error
            }
        }
    }

    /// Decode, record, and execute a write.
    pub fn dispatch(&mut self, registry: &mut Registry, id: Uuid, payload: &[u8]) -> Result<Command> {
        let characteristic = registry.get_mut(id)?;
        if !characteristic.is_write() {
            return Err(ServiceError::NotWritable(id));
        }
        let command =
            Command::decode(characteristic.kind(), payload)?.ok_or(ServiceError::NotWritable(id))?;

        characteristic.latest_value = payload.to_vec();
        self.handler.execute(&command);
        Ok(command)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}
