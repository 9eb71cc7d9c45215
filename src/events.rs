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

//! Service event loop.
//!
//! The [`CaptureService`] is moved into a single task. Transport events and
//! timer fires are handled one at a time on that task, so no locking is needed
//! around service state.

use anyhow::{anyhow, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};
use uuid::Uuid;

use crate::bluetooth::GattStatus;
use crate::service::{CaptureService, CentralId, Transport, TransportEvent};

/// Capacity of the event channel.
const EVENT_QUEUE_SIZE: usize = 64;

enum Request {
    Event {
        event: TransportEvent,
        reply: oneshot::Sender<GattStatus>,
    },
    Shutdown,
}

/// Cloneable sender side of the service event loop.
#[derive(Clone)]
pub struct ServiceHandle {
    tx: mpsc::Sender<Request>,
}

impl ServiceHandle {
    /// Deliver an event and wait for its status.
    pub async fn send(&self, event: TransportEvent) -> Result<GattStatus> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Request::Event {
                event,
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow!("Service event loop stopped"))?;
        Ok(reply_rx.await?)
    }

    pub async fn connect(&self, central: CentralId) -> Result<GattStatus> {
        self.send(TransportEvent::Connected(central)).await
    }

    pub async fn disconnect(&self, central: CentralId) -> Result<GattStatus> {
        self.send(TransportEvent::Disconnected(central)).await
    }

    pub async fn subscribe(&self, central: CentralId, characteristic: Uuid) -> Result<GattStatus> {
        self.send(TransportEvent::Subscribed {
            central,
            characteristic,
        })
        .await
    }

    pub async fn unsubscribe(&self, central: CentralId, characteristic: Uuid) -> Result<GattStatus> {
        self.send(TransportEvent::Unsubscribed {
            central,
            characteristic,
        })
        .await
    }

    pub async fn write(
        &self,
        central: CentralId,
        characteristic: Uuid,
        payload: Vec<u8>,
    ) -> Result<GattStatus> {
        self.send(TransportEvent::Write {
            central,
            characteristic,
            payload,
        })
        .await
    }

    /// Ask the event loop to stop.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(Request::Shutdown).await;
    }
}

/// Spawn the event loop for `service`.
///
/// The join handle yields the service back once the loop stops.
pub fn spawn_service<T>(service: CaptureService<T>) -> (ServiceHandle, JoinHandle<CaptureService<T>>)
where
    T: Transport + 'static,
{
    let (tx, rx) = mpsc::channel(EVENT_QUEUE_SIZE);
    let task = tokio::spawn(run_service(service, rx));
    (ServiceHandle { tx }, task)
}

async fn run_service<T: Transport>(
    mut service: CaptureService<T>,
    mut rx: mpsc::Receiver<Request>,
) -> CaptureService<T> {
    info!("Service event loop started");

    loop {
        let deadline = service.next_deadline();

        tokio::select! {
            request = rx.recv() => match request {
                Some(Request::Event { event, reply }) => {
                    let status = service.handle_event(event);
                    let _ = reply.send(status);
                }
                Some(Request::Shutdown) | None => break,
            },
            _ = wait_for(deadline) => {
                let fired = service.fire_due(Instant::now());
                debug!("Timer fired {} notifications", fired);
            }
        }
    }

    info!("Service event loop stopped");
    service
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
