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

//! Capture service facade.
//!
//! Routes transport events to the lifecycle manager, scheduler, and
//! dispatcher, and publishes scheduler output back through the transport.
//! Every error is turned into a [`GattStatus`] here.

use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use super::dispatcher::Dispatcher;
use super::lifecycle::{CentralId, ConnectionManager, SchedulerRequest};
use super::registry::Registry;
use super::scheduler::{Notification, Scheduler};
use crate::bluetooth::ble_constants::GattStatus;
use crate::error::Result;

/// Outbound side of the transport boundary.
pub trait Transport: Send {
    /// Deliver `value` of characteristic `id` to `targets`.
    fn publish(&mut self, id: Uuid, value: &[u8], targets: &[CentralId]);
}

/// Inbound events delivered by the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected(CentralId),
    Disconnected(CentralId),
    Subscribed {
        central: CentralId,
        characteristic: Uuid,
    },
    Unsubscribed {
        central: CentralId,
        characteristic: Uuid,
    },
    Write {
        central: CentralId,
        characteristic: Uuid,
        payload: Vec<u8>,
    },
}

/// The Capture GATT service.
#[derive(Debug)]
pub struct CaptureService<T: Transport> {
    registry: Registry,
    connections: ConnectionManager,
    scheduler: Scheduler,
    dispatcher: Dispatcher,
    transport: T,
}

impl<T: Transport> CaptureService<T> {
    pub fn new(transport: T, scheduler: Scheduler, dispatcher: Dispatcher) -> Self {
        Self {
            registry: Registry::new(),
            connections: ConnectionManager::new(),
            scheduler,
            dispatcher,
            transport,
        }
    }

    /// Route a single transport event.
    pub fn handle_event(&mut self, event: TransportEvent) -> GattStatus {
        match event {
            TransportEvent::Connected(central) => {
                self.on_connect(central);
                GattStatus::Success
            }
            TransportEvent::Disconnected(central) => self.on_disconnect(central),
            TransportEvent::Subscribed {
                central,
                characteristic,
            } => self.on_subscribe(central, characteristic),
            TransportEvent::Unsubscribed {
                central,
                characteristic,
            } => self.on_unsubscribe(central, characteristic),
            TransportEvent::Write {
                central,
                characteristic,
                payload,
            } => self.on_write(central, characteristic, &payload),
        }
    }

    pub fn on_connect(&mut self, central: CentralId) {
        self.connections.on_connect(central);
    }

    pub fn on_disconnect(&mut self, central: CentralId) -> GattStatus {
        let result = self.connections.on_disconnect(central);
        self.apply_all(result, Instant::now())
    }

    pub fn on_subscribe(&mut self, central: CentralId, id: Uuid) -> GattStatus {
        let result = self
            .connections
            .on_subscribe(&self.registry, central, id)
            .map(|request| request.into_iter().collect());
        self.apply_all(result, Instant::now())
    }

    pub fn on_unsubscribe(&mut self, central: CentralId, id: Uuid) -> GattStatus {
        let result = self
            .connections
            .on_unsubscribe(&self.registry, central, id)
            .map(|request| request.into_iter().collect());
        self.apply_all(result, Instant::now())
    }

    pub fn on_write(&mut self, central: CentralId, id: Uuid, payload: &[u8]) -> GattStatus {
        debug!("Write from {} to {}: {} bytes", central, id, payload.len());
        self.dispatcher.handle_write(&mut self.registry, id, payload)
    }

    /// Fire every job due at `now` and publish the results.
    pub fn fire_due(&mut self, now: Instant) -> usize {
        let notifications = self.scheduler.fire_due(&mut self.registry, now);
        let count = notifications.len();
        for notification in notifications {
            self.publish(notification);
        }
        count
    }

    /// When the next job is due.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    fn apply_all(&mut self, result: Result<Vec<SchedulerRequest>>, now: Instant) -> GattStatus {
        match result {
            Ok(requests) => {
                for request in requests {
                    if let Err(e) = self.apply(request, now) {
                        warn!("Scheduler request {:?} failed: {}", request, e);
                        return GattStatus::Error;
                    }
                }
                GattStatus::Success
            }
            Err(e) => {
                warn!("Rejected lifecycle event: {}", e);
                GattStatus::Error
            }
        }
    }

    fn apply(&mut self, request: SchedulerRequest, now: Instant) -> Result<()> {
        match request {
            SchedulerRequest::Start(id) => {
                if let Some(notification) = self.scheduler.start(&mut self.registry, id, now)? {
                    self.publish(notification);
                }
            }
            SchedulerRequest::Cancel(id) => {
                self.scheduler.cancel(id);
            }
            SchedulerRequest::CancelAll => {
                self.scheduler.cancel_all();
            }
        }
        Ok(())
    }

    fn publish(&mut self, notification: Notification) {
        let targets = self.connections.subscribers(notification.characteristic);
        if targets.is_empty() {
            debug!("No subscribers for {}", notification.characteristic);
            return;
        }
        debug!(
            "Notifying {} ({} bytes) to {} centrals",
            notification.characteristic,
            notification.value.len(),
            targets.len()
        );
        self.transport
            .publish(notification.characteristic, &notification.value, &targets);
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battery::FixedBattery;
    use crate::bluetooth::ble_constants::*;
    use crate::service::dispatcher::encode_checkpoint;
    use crate::service::scheduler::NotificationPeriods;
    use crate::service::telemetry::Telemetry;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct RecordingTransport {
        published: Vec<(Uuid, Vec<u8>, Vec<CentralId>)>,
    }

    impl RecordingTransport {
        fn values_for(&self, id: Uuid) -> Vec<Vec<u8>> {
            self.published
                .iter()
                .filter(|(char_id, _, _)| *char_id == id)
                .map(|(_, value, _)| value.clone())
                .collect()
        }
    }

    impl Transport for RecordingTransport {
        fn publish(&mut self, id: Uuid, value: &[u8], targets: &[CentralId]) {
            self.published.push((id, value.to_vec(), targets.to_vec()));
        }
    }

    const A: CentralId = CentralId::new(0xA);
    const B: CentralId = CentralId::new(0xB);

    fn service() -> CaptureService<RecordingTransport> {
        let telemetry = Telemetry::with_rng(Box::new(FixedBattery(100)), StdRng::seed_from_u64(3));
        let scheduler = Scheduler::new(telemetry, NotificationPeriods::default());
        CaptureService::new(RecordingTransport::default(), scheduler, Dispatcher::default())
    }

    /// A job exists exactly for the characteristics that have subscribers.
    fn assert_jobs_match_subscriptions(service: &CaptureService<RecordingTransport>) {
        for id in service.registry().notify_ids() {
            assert_eq!(
                service.scheduler().is_active(id),
                service.connections().subscriber_count(id) > 0,
                "job/subscription mismatch for {}",
                id
            );
        }
    }

    #[test]
    fn test_subscribe_publishes_to_subscribers() {
        let mut service = service();
        service.on_connect(A);
        service.on_connect(B);

        assert_eq!(service.on_subscribe(A, UPLOAD_COUNT_UUID), GattStatus::Success);
        assert_eq!(service.on_subscribe(B, UPLOAD_COUNT_UUID), GattStatus::Success);

        // Only the 0->1 transition produced an initial notification
        let published = &service.transport().published;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].2, vec![A]);

        service.fire_due(Instant::now() + Duration::from_secs(1));
        let last = service.transport().published.last().unwrap();
        assert_eq!(last.2, vec![A, B]);
        assert_jobs_match_subscriptions(&service);
    }

    #[test]
    fn test_job_invariant_over_sequence() {
        let mut service = service();
        service.on_connect(A);
        service.on_connect(B);

        let steps: Vec<TransportEvent> = vec![
            TransportEvent::Subscribed { central: A, characteristic: BATTERY_LEVEL_UUID },
            TransportEvent::Subscribed { central: B, characteristic: BATTERY_LEVEL_UUID },
            TransportEvent::Subscribed { central: B, characteristic: DEVICE_STATE_UUID },
            TransportEvent::Unsubscribed { central: A, characteristic: BATTERY_LEVEL_UUID },
            TransportEvent::Subscribed { central: A, characteristic: POST_COUNT_UUID },
            TransportEvent::Disconnected(B),
            TransportEvent::Unsubscribed { central: A, characteristic: POST_COUNT_UUID },
            TransportEvent::Subscribed { central: A, characteristic: RECORDING_TIME_UUID },
        ];
        for step in steps {
            assert_eq!(service.handle_event(step), GattStatus::Success);
            assert_jobs_match_subscriptions(&service);
        }
        assert_eq!(service.scheduler().active_jobs(), 1);
    }

    #[test]
    fn test_last_disconnect_cancels_everything() {
        let mut service = service();
        service.on_connect(A);
        for id in service.registry().notify_ids() {
            service.on_subscribe(A, id);
        }
        assert_eq!(service.scheduler().active_jobs(), 5);

        assert_eq!(service.on_disconnect(A), GattStatus::Success);
        assert_eq!(service.scheduler().active_jobs(), 0);
        assert_eq!(service.next_deadline(), None);
        assert_eq!(service.fire_due(Instant::now() + Duration::from_secs(30)), 0);
    }

    #[test]
    fn test_resubscribe_publishes_fresh_value() {
        let mut service = service();
        service.on_connect(A);

        service.on_subscribe(A, RECORDING_TIME_UUID);
        service.fire_due(Instant::now() + Duration::from_secs(1));
        service.on_unsubscribe(A, RECORDING_TIME_UUID);
        service.on_subscribe(A, RECORDING_TIME_UUID);

        let values: Vec<u64> = service
            .transport()
            .values_for(RECORDING_TIME_UUID)
            .iter()
            .map(|v| u64::from_le_bytes(v.as_slice().try_into().unwrap()))
            .collect();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[test]
    fn test_errors_become_status() {
        let mut service = service();
        let unknown = uuid_from_short(0x0bad);

        assert_eq!(service.on_subscribe(A, UPLOAD_COUNT_UUID), GattStatus::Error);
        assert_eq!(service.on_disconnect(A), GattStatus::Error);

        service.on_connect(A);
        assert_eq!(service.on_subscribe(A, unknown), GattStatus::Error);
        assert_eq!(service.on_write(A, unknown, &[]), GattStatus::Error);
        assert_eq!(service.on_write(A, SET_CHECKPOINT_UUID, &[0; 4]), GattStatus::Error);
        assert_eq!(
            service.on_write(A, SET_CHECKPOINT_UUID, &encode_checkpoint(1.0, 2.0)),
            GattStatus::Success
        );
        assert!(service.transport().published.is_empty());
    }
}
