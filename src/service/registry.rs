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

//! Characteristic registry.
//!
//! Holds the fixed characteristic set of the Capture service. The structure is
//! built once; only each characteristic's `latest_value` changes afterwards.

use uuid::Uuid;

use crate::bluetooth::ble_constants::*;
use crate::error::{Result, ServiceError};

/// What a characteristic can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Peripheral pushes updates to subscribed centrals.
    Notify,
    /// Central sends commands.
    Write,
}

/// Access permission declared on a characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    None,
    ReadProtected,
    WriteProtected,
}

/// The role a characteristic plays in the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharacteristicKind {
    BatteryLevel,
    UploadCount,
    PostCount,
    RecordingTime,
    DeviceState,
    StartInspection,
    StopInspection,
    SetWaypoint,
    SetCheckpoint,
}

impl CharacteristicKind {
    /// All kinds in registration order.
    pub const ALL: [CharacteristicKind; 9] = [
        Self::BatteryLevel,
        Self::UploadCount,
        Self::PostCount,
        Self::RecordingTime,
        Self::DeviceState,
        Self::StartInspection,
        Self::StopInspection,
        Self::SetWaypoint,
        Self::SetCheckpoint,
    ];

    pub fn uuid(&self) -> Uuid {
        match self {
            Self::BatteryLevel => BATTERY_LEVEL_UUID,
            Self::UploadCount => UPLOAD_COUNT_UUID,
            Self::PostCount => POST_COUNT_UUID,
            Self::RecordingTime => RECORDING_TIME_UUID,
            Self::DeviceState => DEVICE_STATE_UUID,
            Self::StartInspection => START_INSPECTION_UUID,
            Self::StopInspection => STOP_INSPECTION_UUID,
            Self::SetWaypoint => SET_WAYPOINT_UUID,
            Self::SetCheckpoint => SET_CHECKPOINT_UUID,
        }
    }

    pub fn capability(&self) -> Capability {
        match self {
            Self::BatteryLevel
            | Self::UploadCount
            | Self::PostCount
            | Self::RecordingTime
            | Self::DeviceState => Capability::Notify,
            Self::StartInspection
            | Self::StopInspection
            | Self::SetWaypoint
            | Self::SetCheckpoint => Capability::Write,
        }
    }

    pub fn access(&self) -> Access {
        match self.capability() {
            Capability::Notify => Access::None,
            Capability::Write => Access::WriteProtected,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BatteryLevel => "battery level",
            Self::UploadCount => "upload count",
            Self::PostCount => "post count",
            Self::RecordingTime => "elapsed recording time",
            Self::DeviceState => "device state",
            Self::StartInspection => "start inspection",
            Self::StopInspection => "stop inspection",
            Self::SetWaypoint => "set waypoint",
            Self::SetCheckpoint => "set checkpoint",
        }
    }
}

/// A single characteristic of the service.
#[derive(Debug, Clone)]
pub struct Characteristic {
    id: Uuid,
    kind: CharacteristicKind,
    capability: Capability,
    access: Access,
    /// Last value notified or written.
    pub latest_value: Vec<u8>,
}

impl Characteristic {
    fn new(kind: CharacteristicKind) -> Self {
        Self {
            id: kind.uuid(),
            kind,
            capability: kind.capability(),
            access: kind.access(),
            latest_value: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> CharacteristicKind {
        self.kind
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub fn access(&self) -> Access {
        self.access
    }

    pub fn is_notify(&self) -> bool {
        self.capability == Capability::Notify
    }

    pub fn is_write(&self) -> bool {
        self.capability == Capability::Write
    }
}

/// The ordered characteristic set of one service.
#[derive(Debug, Clone)]
pub struct Registry {
    service_id: Uuid,
    label: &'static str,
    characteristics: Vec<Characteristic>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Build the Capture service characteristic set.
    pub fn new() -> Self {
        let characteristics = CharacteristicKind::ALL
            .iter()
            .map(|kind| Characteristic::new(*kind))
            .collect();

        Self {
            service_id: SERVICE_UUID,
            label: SERVICE_LABEL,
            characteristics,
        }
    }

    pub fn service_id(&self) -> Uuid {
        self.service_id
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Look up a characteristic by id.
    pub fn get(&self, id: Uuid) -> Result<&Characteristic> {
        self.characteristics
            .iter()
            .find(|c| c.id == id)
            .ok_or(ServiceError::UnknownCharacteristic(id))
    }

    /// Look up a characteristic by id for updating its value.
    pub fn get_mut(&mut self, id: Uuid) -> Result<&mut Characteristic> {
        self.characteristics
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(ServiceError::UnknownCharacteristic(id))
    }

    /// Characteristics in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Characteristic> {
        self.characteristics.iter()
    }

    /// Ids of every notifiable characteristic.
    pub fn notify_ids(&self) -> Vec<Uuid> {
        self.iter().filter(|c| c.is_notify()).map(|c| c.id).collect()
    }

    /// Ids of every writable characteristic.
    pub fn write_ids(&self) -> Vec<Uuid> {
        self.iter().filter(|c| c.is_write()).map(|c| c.id).collect()
    }

    pub fn len(&self) -> usize {
        self.characteristics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.characteristics.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_registry_layout() {
        let registry = Registry::new();

        assert_eq!(registry.len(), 9);
        assert_eq!(registry.notify_ids().len(), 5);
        assert_eq!(registry.write_ids().len(), 4);
        assert_eq!(registry.service_id(), SERVICE_UUID);
        assert_eq!(registry.label(), "Capture Services");
    }

    #[test]
    fn test_ids_are_unique() {
        let registry = Registry::new();
        let ids: HashSet<Uuid> = registry.iter().map(|c| c.id()).collect();
        assert_eq!(ids.len(), registry.len());
    }

    #[test]
    fn test_lookup() {
        let registry = Registry::new();

        let battery = registry.get(BATTERY_LEVEL_UUID).unwrap();
        assert_eq!(battery.kind(), CharacteristicKind::BatteryLevel);
        assert_eq!(battery.capability(), Capability::Notify);
        assert_eq!(battery.access(), Access::None);

        let checkpoint = registry.get(SET_CHECKPOINT_UUID).unwrap();
        assert!(checkpoint.is_write());
        assert_eq!(checkpoint.access(), Access::WriteProtected);
    }

    #[test]
    fn test_unknown_id() {
        let mut registry = Registry::new();
        let unknown = uuid_from_short(0xdead);

        assert_eq!(
            registry.get(unknown).unwrap_err(),
            ServiceError::UnknownCharacteristic(unknown)
        );
        assert!(registry.get_mut(unknown).is_err());
    }

    #[test]
    fn test_registration_order() {
        let registry = Registry::new();
        let kinds: Vec<_> = registry.iter().map(|c| c.kind()).collect();
        assert_eq!(kinds, CharacteristicKind::ALL.to_vec());
    }
}
