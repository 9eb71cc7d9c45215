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

//! BLE GATT server for the Capture service, backed by BlueZ.
//!
//! BlueZ multiplexes notification sessions of all centrals into one
//! `StartNotify` call and does not say which central enabled notifications.
//! A session is therefore attributed to the most recently connected central.

use anyhow::Result;
use bluer::adv::{Advertisement, AdvertisementHandle};
use bluer::gatt::local::{
    Application, ApplicationHandle, Characteristic, CharacteristicNotifier, CharacteristicNotify,
    CharacteristicNotifyMethod, CharacteristicWrite, CharacteristicWriteMethod,
    CharacteristicWriteRequest, ReqError, Service,
};
use bluer::{Adapter, AdapterEvent, Address, DeviceEvent, DeviceProperty};
use futures::StreamExt;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::ble_constants::{GattStatus, SERVICE_UUID};
use super::notify::{run_session, ConnectedCentrals, NotificationSink, NotifyQueues, NotifyReceiver};
use crate::error::PeripheralError;
use crate::events::ServiceHandle;
use crate::peripheral::{AdvertisingController, PermissionGate};
use crate::service::{CentralId, Registry};

impl NotificationSink for CharacteristicNotifier {
    type Error = bluer::Error;

    fn stopped(&self) -> impl Future<Output = ()> + Send {
        CharacteristicNotifier::stopped(self)
    }

    fn notify(&mut self, value: Vec<u8>) -> impl Future<Output = bluer::Result<()>> + Send {
        CharacteristicNotifier::notify(self, value)
    }
}

/// GATT server for the Capture service.
pub struct GattServer {
    adapter: Adapter,
    device_name: String,
    connected: ConnectedCentrals,
    adv_handle: Option<AdvertisementHandle>,
    _app_handle: Option<ApplicationHandle>,
    monitor: Option<JoinHandle<()>>,
}

impl GattServer {
    /// Open a BlueZ session on the default adapter.
    pub async fn new(device_name: &str) -> Result<Self> {
        info!("Initializing BLE GATT server...");

        let session = bluer::Session::new().await?;
        info!("BlueZ session created");

        let adapter = session.default_adapter().await?;
        info!("Using Bluetooth adapter: {}", adapter.name());

        Ok(Self {
            adapter,
            device_name: device_name.to_string(),
            connected: Arc::new(Mutex::new(Vec::new())),
            adv_handle: None,
            _app_handle: None,
            monitor: None,
        })
    }

    /// Set the adapter alias.
    pub async fn set_name(&self, name: &str) -> Result<()> {
        self.adapter.set_alias(name.to_string()).await?;
        info!("Bluetooth name set to: {}", name);
        Ok(())
    }

    /// Register the GATT application with BlueZ.
    pub async fn serve(
        &mut self,
        registry: &Registry,
        mut queues: NotifyQueues,
        handle: ServiceHandle,
    ) -> Result<()> {
        let mut characteristics = Vec::with_capacity(registry.len());
        for characteristic in registry.iter() {
            let id = characteristic.id();
            if characteristic.is_notify() {
                let Some(rx) = queues.take(id) else {
                    warn!("Missing notification queue for {}", id);
                    continue;
                };
                characteristics.push(Self::notify_characteristic(
                    id,
                    rx,
                    handle.clone(),
                    self.connected.clone(),
                ));
            } else {
                characteristics.push(Self::write_characteristic(id, handle.clone()));
            }
        }

        let service = Service {
            uuid: registry.service_id(),
            primary: true,
            characteristics,
            ..Default::default()
        };
        let app = Application {
            services: vec![service],
            ..Default::default()
        };

        self._app_handle = Some(self.adapter.serve_gatt_application(app).await?);
        info!("GATT service '{}' registered", registry.label());
        Ok(())
    }

    fn notify_characteristic(
        id: Uuid,
        rx: NotifyReceiver,
        handle: ServiceHandle,
        connected: ConnectedCentrals,
    ) -> Characteristic {
        Characteristic {
            uuid: id,
            notify: Some(CharacteristicNotify {
                notify: true,
                method: CharacteristicNotifyMethod::Fun(Box::new(move |notifier: CharacteristicNotifier| {
                    Box::pin(run_session(
                        id,
                        rx.clone(),
                        notifier,
                        connected.clone(),
                        handle.clone(),
                    ))
                })),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn write_characteristic(id: Uuid, handle: ServiceHandle) -> Characteristic {
        Characteristic {
            uuid: id,
            write: Some(CharacteristicWrite {
                write: true,
                write_without_response: true,
                method: CharacteristicWriteMethod::Fun(Box::new(
                    move |data: Vec<u8>, req: CharacteristicWriteRequest| {
                        let handle = handle.clone();

                        Box::pin(async move {
                            let central = CentralId::from_address(req.device_address.0);
                            match handle.write(central, id, data).await {
                                Ok(GattStatus::Success) => Ok(()),
                                Ok(GattStatus::Error) => Err(ReqError::Failed),
                                Err(e) => {
                                    error!("Failed to deliver write to {}: {}", id, e);
                                    Err(ReqError::Failed)
                                }
                            }
                        })
                    },
                )),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Translate BlueZ device connection changes into service events.
    pub async fn watch_connections(&mut self, handle: ServiceHandle) -> Result<()> {
        if self.monitor.is_some() {
            return Ok(());
        }

        let events = self.adapter.events().await?;
        let adapter = self.adapter.clone();
        let connected = self.connected.clone();

        self.monitor = Some(tokio::spawn(async move {
            futures::pin_mut!(events);
            while let Some(event) = events.next().await {
                match event {
                    AdapterEvent::DeviceAdded(address) => {
                        let adapter = adapter.clone();
                        let connected = connected.clone();
                        let handle = handle.clone();
                        tokio::spawn(async move {
                            if let Err(e) = watch_device(adapter, address, connected, handle).await {
                                debug!("Stopped watching {}: {}", address, e);
                            }
                        });
                    }
                    AdapterEvent::DeviceRemoved(address) => {
                        mark_disconnected(&connected, &handle, address).await;
                    }
                    _ => {}
                }
            }
            info!("Adapter event stream ended");
        }));

        info!("Watching for central connections");
        Ok(())
    }
}

impl Drop for GattServer {
    fn drop(&mut self) {
        if let Some(monitor) = self.monitor.take() {
            monitor.abort();
        }
    }
}

async fn watch_device(
    adapter: Adapter,
    address: Address,
    connected: ConnectedCentrals,
    handle: ServiceHandle,
) -> bluer::Result<()> {
    let device = adapter.device(address)?;
    if device.is_connected().await? {
        mark_connected(&connected, &handle, address).await;
    }

    let events = device.events().await?;
    futures::pin_mut!(events);
    while let Some(DeviceEvent::PropertyChanged(property)) = events.next().await {
        if let DeviceProperty::Connected(is_connected) = property {
            if is_connected {
                mark_connected(&connected, &handle, address).await;
            } else {
                mark_disconnected(&connected, &handle, address).await;
            }
        }
    }
    Ok(())
}

async fn mark_connected(connected: &ConnectedCentrals, handle: &ServiceHandle, address: Address) {
    let central = CentralId::from_address(address.0);
    {
        let mut connected = connected.lock();
        if connected.contains(&central) {
            return;
        }
        connected.push(central);
    }
    info!("Central connected: {}", address);
    if let Err(e) = handle.connect(central).await {
        error!("Failed to report connection of {}: {}", address, e);
    }
}

async fn mark_disconnected(connected: &ConnectedCentrals, handle: &ServiceHandle, address: Address) {
    let central = CentralId::from_address(address.0);
    let was_connected = {
        let mut connected = connected.lock();
        let before = connected.len();
        connected.retain(|c| *c != central);
        connected.len() != before
    };
    if !was_connected {
        return;
    }
    info!("Central disconnected: {}", address);
    if let Err(e) = handle.disconnect(central).await {
        error!("Failed to report disconnection of {}: {}", address, e);
    }
}

impl PermissionGate for GattServer {
    async fn permissions_granted(&self) -> bool {
        // Reading adapter properties requires access to bluetoothd over D-Bus
        match self.adapter.address().await {
            Ok(_) => true,
            Err(e) => {
                error!("Cannot access Bluetooth adapter: {}", e);
                false
            }
        }
    }

    async fn radio_enabled(&self) -> bool {
        self.adapter.is_powered().await.unwrap_or(false)
    }
}

impl AdvertisingController for GattServer {
    async fn start_advertising(&mut self) -> Result<(), PeripheralError> {
        let adv = Advertisement {
            service_uuids: vec![SERVICE_UUID].into_iter().collect(),
            discoverable: Some(true),
            local_name: Some(self.device_name.clone()),
            ..Default::default()
        };

        let handle = self
            .adapter
            .advertise(adv)
            .await
            .map_err(|e| PeripheralError::Advertising(e.to_string()))?;
        self.adv_handle = Some(handle);

        info!("BLE advertising started as '{}'", self.device_name);
        Ok(())
    }

    async fn stop_advertising(&mut self) -> Result<(), PeripheralError> {
        // Dropping the handle unregisters the advertisement
        if self.adv_handle.take().is_some() {
            info!("BLE advertising stopped");
        }
        Ok(())
    }
}
