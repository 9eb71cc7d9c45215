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

//! Notification queues and sessions.
//!
//! The service publishes into one bounded queue per notifiable
//! characteristic. A notification session drains that queue into whatever
//! the Bluetooth stack hands out when a central enables notifications.
//! Sessions hold the queue lock only while waiting for a single value, so a
//! new session can take over as soon as the previous one is stopped.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::ble_constants::GattStatus;
use crate::events::ServiceHandle;
use crate::service::{CentralId, Registry, Transport};

/// Queued notifications per characteristic.
pub const NOTIFY_QUEUE_SIZE: usize = 32;

/// Handle used when a notification session starts with no known central.
pub const UNATTRIBUTED: CentralId = CentralId::new(0);

/// Connected centrals, most recent last.
pub type ConnectedCentrals = Arc<Mutex<Vec<CentralId>>>;

pub type NotifyReceiver = Arc<AsyncMutex<mpsc::Receiver<Vec<u8>>>>;

/// Publishes service values into the notification queues.
pub struct QueueTransport {
    channels: HashMap<Uuid, mpsc::Sender<Vec<u8>>>,
}

impl Transport for QueueTransport {
    fn publish(&mut self, id: Uuid, value: &[u8], targets: &[CentralId]) {
        let Some(tx) = self.channels.get(&id) else {
            warn!("No notification channel for {}", id);
            return;
        };
        // The Bluetooth stack fans the value out to every subscribed central
        debug!("Queueing {} bytes on {} for {} centrals", value.len(), id, targets.len());
        if let Err(e) = tx.try_send(value.to_vec()) {
            warn!("Dropped notification for {}: {}", id, e);
        }
    }
}

/// Receiving ends of the notification queues.
pub struct NotifyQueues {
    receivers: HashMap<Uuid, NotifyReceiver>,
}

impl NotifyQueues {
    /// Take the queue for `id`, once.
    pub fn take(&mut self, id: Uuid) -> Option<NotifyReceiver> {
        self.receivers.remove(&id)
    }
}

/// Create one notification queue per notifiable characteristic.
pub fn notification_channels(registry: &Registry) -> (QueueTransport, NotifyQueues) {
    let mut channels = HashMap::new();
    let mut receivers = HashMap::new();
    for id in registry.notify_ids() {
        let (tx, rx) = mpsc::channel(NOTIFY_QUEUE_SIZE);
        channels.insert(id, tx);
        receivers.insert(id, Arc::new(AsyncMutex::new(rx)));
    }
    (QueueTransport { channels }, NotifyQueues { receivers })
}

/// Outgoing side of one notification session.
pub trait NotificationSink: Send {
    type Error: fmt::Display;

    /// Resolves once the central stops receiving notifications.
    fn stopped(&self) -> impl Future<Output = ()> + Send;

    fn notify(&mut self, value: Vec<u8>) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// Run one notification session for `id` until the sink stops.
///
/// Subscribes the session's central on start and unsubscribes it on exit.
pub async fn run_session<S: NotificationSink>(
    id: Uuid,
    queue: NotifyReceiver,
    mut sink: S,
    connected: ConnectedCentrals,
    handle: ServiceHandle,
) {
    {
        // Values queued for an earlier session are stale
        let mut rx = queue.lock().await;
        while rx.try_recv().is_ok() {}
    }

    let central = session_central(&connected, &handle).await;
    debug!("Notification session for {} started by {}", id, central);
    match handle.subscribe(central, id).await {
        Ok(GattStatus::Success) => {}
        Ok(status) => warn!("Subscribe to {} returned {:?}", id, status),
        Err(e) => {
            error!("Failed to subscribe to {}: {}", id, e);
            return;
        }
    }

    loop {
        let data = tokio::select! {
            _ = sink.stopped() => break,
            data = next_value(&queue) => data,
        };
        let Some(data) = data else {
            debug!("Notification queue for {} closed", id);
            break;
        };
        if let Err(e) = sink.notify(data).await {
            debug!("Notification session for {} ended: {}", id, e);
            break;
        }
    }

    if let Err(e) = handle.unsubscribe(central, id).await {
        error!("Failed to unsubscribe from {}: {}", id, e);
    }
    debug!("Notification session for {} stopped", id);
}

async fn next_value(queue: &NotifyReceiver) -> Option<Vec<u8>> {
    let mut rx = queue.lock().await;
    rx.recv().await
}

/// Pick the central a new notification session belongs to.
async fn session_central(connected: &ConnectedCentrals, handle: &ServiceHandle) -> CentralId {
    let latest = connected.lock().last().copied();
    match latest {
        Some(central) => central,
        None => {
            warn!("Notification session without a known central");
            if let Err(e) = handle.connect(UNATTRIBUTED).await {
                error!("Failed to register unattributed central: {}", e);
            }
            UNATTRIBUTED
        }
    }
}
