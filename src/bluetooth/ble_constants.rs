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

//! BLE service and characteristic UUIDs for the Capture service.
//!
//! All identifiers live on the Bluetooth base UUID
//! (`0000xxxx-0000-1000-8000-00805f9b34fb`).

use uuid::Uuid;

/// Build a UUID from a 16-bit short id on the Bluetooth base UUID.
pub const fn uuid_from_short(short: u16) -> Uuid {
    Uuid::from_u128(0x0000_0000_0000_1000_8000_0080_5f9b_34fb | ((short as u128) << 96))
}

/// Capture GATT service UUID.
pub const SERVICE_UUID: Uuid = uuid_from_short(0x2222);

/// Human-readable service label.
pub const SERVICE_LABEL: &str = "Capture Services";

/// Battery level characteristic UUID.
/// Properties: Notify
pub const BATTERY_LEVEL_UUID: Uuid = uuid_from_short(0x1111);

/// Upload count characteristic UUID.
/// Properties: Notify
pub const UPLOAD_COUNT_UUID: Uuid = uuid_from_short(0x1122);

/// Post count characteristic UUID.
/// Properties: Notify
pub const POST_COUNT_UUID: Uuid = uuid_from_short(0x1133);

/// Elapsed recording time characteristic UUID.
/// Properties: Notify
pub const RECORDING_TIME_UUID: Uuid = uuid_from_short(0x1144);

/// Device state characteristic UUID.
/// Properties: Notify
pub const DEVICE_STATE_UUID: Uuid = uuid_from_short(0x1155);

/// Start inspection characteristic UUID.
/// Properties: Write
pub const START_INSPECTION_UUID: Uuid = uuid_from_short(0x1166);

/// Stop inspection characteristic UUID.
/// Properties: Write
pub const STOP_INSPECTION_UUID: Uuid = uuid_from_short(0x1177);

/// Set waypoint characteristic UUID.
/// Properties: Write
pub const SET_WAYPOINT_UUID: Uuid = uuid_from_short(0x1188);

/// Set checkpoint characteristic UUID.
/// Properties: Write (two big-endian f32)
pub const SET_CHECKPOINT_UUID: Uuid = uuid_from_short(0x1199);

/// Status returned to the transport for a GATT operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GattStatus {
    Success = 0x00,
    Error = 0x85, // ATT "GATT_ERROR"
}

impl GattStatus {
    pub fn is_success(&self) -> bool {
        *self == GattStatus::Success
    }
}

/// Checkpoint payload layout.
pub mod checkpoint {
    /// Size of a single coordinate (IEEE-754 f32).
    pub const COORDINATE_SIZE: usize = 4;

    /// Minimum payload length: x followed by y.
    pub const PAYLOAD_SIZE: usize = 2 * COORDINATE_SIZE;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_format() {
        assert_eq!(
            SERVICE_UUID.to_string(),
            "00002222-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            SET_CHECKPOINT_UUID.to_string(),
            "00001199-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_status_code() {
        assert!(GattStatus::Success.is_success());
        assert!(!GattStatus::Error.is_success());
        assert_eq!(GattStatus::Error as u8, 0x85);
    }
}
