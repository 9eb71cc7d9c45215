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

//! Capture Peripheral

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use capture_peripheral::battery;
use capture_peripheral::bluetooth::{notification_channels, GattServer};
use capture_peripheral::config::Config;
use capture_peripheral::events::spawn_service;
use capture_peripheral::peripheral::Peripheral;
use capture_peripheral::service::{
    CaptureService, Dispatcher, NotificationPeriods, Registry, Scheduler, Telemetry,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("capture_peripheral=info".parse()?),
        )
        .init();

    info!(
        "Starting Capture Peripheral v{}...",
        env!("CARGO_PKG_VERSION")
    );

    // Load configuration
    let config = Config::load()?;
    info!("Configuration loaded");

    // Build the service engine
    let telemetry = Telemetry::new(battery::create_reader(&config.telemetry));
    let scheduler = Scheduler::new(telemetry, NotificationPeriods::from_config(&config.telemetry));
    let registry = Registry::new();
    let (transport, queues) = notification_channels(&registry);
    let service = CaptureService::new(transport, scheduler, Dispatcher::default());
    let (handle, service_task) = spawn_service(service);

    // Bring up BlueZ
    let server = GattServer::new(&config.bluetooth.device_name).await?;
    let mut peripheral = Peripheral::new(server);
    peripheral.check_gate().await?;

    let server = peripheral.controller_mut();
    server.set_name(&config.bluetooth.device_name).await?;
    server.serve(&registry, queues, handle.clone()).await?;
    server.watch_connections(handle.clone()).await?;

    peripheral.initialize().await?;
    info!(
        "Capture service '{}' advertising as '{}'",
        registry.label(),
        config.bluetooth.device_name
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    peripheral.shutdown().await?;
    handle.shutdown().await;
    service_task.await?;

    info!("Capture Peripheral stopped");
    Ok(())
}
