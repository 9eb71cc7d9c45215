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

//! Bluetooth module.
//!
//! GATT identifiers and status codes, notification queues, plus the BlueZ
//! GATT server when built with the `bluez` feature.

pub mod ble_constants;
#[cfg(feature = "bluez")]
mod gatt_server;
pub mod notify;

pub use ble_constants::GattStatus;
#[cfg(feature = "bluez")]
pub use gatt_server::GattServer;
pub use notify::{notification_channels, NotificationSink, NotifyQueues, QueueTransport};
