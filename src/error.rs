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

//! Error types for the service engine and peripheral bootstrap.

use thiserror::Error;
use uuid::Uuid;

use crate::service::CentralId;

/// Errors raised while handling a transport event.
///
/// None of these are fatal: the facade converts them into a
/// [`GattStatus::Error`](crate::bluetooth::GattStatus) and logs them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    #[error("Unknown characteristic: {0}")]
    UnknownCharacteristic(Uuid),

    #[error("Invalid payload: expected at least {expected} bytes, got {actual}")]
    InvalidPayload { expected: usize, actual: usize },

    #[error("Unknown central: {0}")]
    InvalidReference(CentralId),

    #[error("Characteristic {0} does not support notifications")]
    NotNotifiable(Uuid),

    #[error("Characteristic {0} is not writable")]
    NotWritable(Uuid),
}

/// Errors raised while bringing the peripheral up.
#[derive(Error, Debug)]
pub enum PeripheralError {
    #[error("Required Bluetooth permissions are not granted")]
    PermissionDenied,

    #[error("Bluetooth radio is disabled")]
    RadioDisabled,

    #[error("Advertising error: {0}")]
    Advertising(String),
}

pub type Result<T, E = ServiceError> = std::result::Result<T, E>;
