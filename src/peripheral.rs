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

//! Peripheral bootstrap: permission gate and advertising.

#![allow(async_fn_in_trait)]

use tracing::{debug, info, warn};

use crate::error::PeripheralError;

/// Reports whether the peripheral may start.
pub trait PermissionGate {
    /// Whether the required Bluetooth permissions are granted.
    async fn permissions_granted(&self) -> bool;

    /// Whether the radio is powered.
    async fn radio_enabled(&self) -> bool;
}

/// Starts and stops peripheral discoverability.
pub trait AdvertisingController {
    async fn start_advertising(&mut self) -> Result<(), PeripheralError>;

    async fn stop_advertising(&mut self) -> Result<(), PeripheralError>;
}

/// Brings the peripheral up once.
pub struct Peripheral<C> {
    controller: C,
    initialized: bool,
}

impl<C> Peripheral<C>
where
    C: PermissionGate + AdvertisingController,
{
    pub fn new(controller: C) -> Self {
        Self {
            controller,
            initialized: false,
        }
    }

    /// Verify permissions and radio state.
    pub async fn check_gate(&self) -> Result<(), PeripheralError> {
        if !self.controller.permissions_granted().await {
            warn!("Bluetooth permissions not granted");
            return Err(PeripheralError::PermissionDenied);
        }
        if !self.controller.radio_enabled().await {
            warn!("Bluetooth radio is disabled");
            return Err(PeripheralError::RadioDisabled);
        }
        Ok(())
    }

    /// Check the gate and start advertising.
    ///
    /// Returns `Ok(false)` if the peripheral was already initialized.
    pub async fn initialize(&mut self) -> Result<bool, PeripheralError> {
        if self.initialized {
            debug!("Peripheral already initialized");
            return Ok(false);
        }
        self.check_gate().await?;
        self.controller.start_advertising().await?;
        self.initialized = true;
        info!("Peripheral initialized, advertising started");
        Ok(true)
    }

    /// Stop advertising if it was started.
    pub async fn shutdown(&mut self) -> Result<(), PeripheralError> {
        if !self.initialized {
            return Ok(());
        }
        self.controller.stop_advertising().await?;
        self.initialized = false;
        info!("Advertising stopped");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut C {
        &mut self.controller
    }
}
