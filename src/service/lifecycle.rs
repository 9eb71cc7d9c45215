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

//! Connection lifecycle tracking.
//!
//! Keeps the set of connected centrals and, per notifiable characteristic, the
//! centrals subscribed to it. Subscriber count transitions are turned into
//! [`SchedulerRequest`]s; the manager itself owns no timers.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use tracing::{debug, info};
use uuid::Uuid;

use super::registry::Registry;
use crate::error::{Result, ServiceError};

/// Opaque handle of a connected central.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CentralId(u64);

impl CentralId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Build a handle from a 48-bit device address.
    pub fn from_address(address: [u8; 6]) -> Self {
        let raw = address
            .iter()
            .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte));
        Self(raw)
    }
}

impl fmt::Display for CentralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0.to_be_bytes();
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[2], b[3], b[4], b[5], b[6], b[7]
        )
    }
}

/// Work the scheduler must do after a lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerRequest {
    /// First subscriber arrived.
    Start(Uuid),
    /// Last subscriber left.
    Cancel(Uuid),
    /// No centrals remain connected.
    CancelAll,
}

/// Tracks connected centrals and their subscriptions.
#[derive(Debug, Default)]
pub struct ConnectionManager {
    /// Characteristics each connected central is subscribed to.
    centrals: HashMap<CentralId, HashSet<Uuid>>,
    /// Subscribed centrals per characteristic. An entry exists only while non-empty.
    subscribers: HashMap<Uuid, BTreeSet<CentralId>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly connected central.
    pub fn on_connect(&mut self, central: CentralId) {
        if self.centrals.contains_key(&central) {
            debug!("Central {} already connected", central);
            return;
        }
        self.centrals.insert(central, HashSet::new());
        info!(
            "Central connected: {} ({} connected)",
            central,
            self.centrals.len()
        );
    }

    /// Remove a central and release its subscriptions.
    pub fn on_disconnect(&mut self, central: CentralId) -> Result<Vec<SchedulerRequest>> {
        let subscriptions = self
            .centrals
            .remove(&central)
            .ok_or(ServiceError::InvalidReference(central))?;

        let mut requests = Vec::new();
        for id in subscriptions {
            if self.release(central, id) {
                requests.push(SchedulerRequest::Cancel(id));
            }
        }

        info!(
            "Central disconnected: {} ({} connected)",
            central,
            self.centrals.len()
        );

        if self.centrals.is_empty() {
            requests.push(SchedulerRequest::CancelAll);
        }

        Ok(requests)
    }

    /// Enable notifications of `id` for `central`.
    pub fn on_subscribe(
        &mut self,
        registry: &Registry,
        central: CentralId,
        id: Uuid,
    ) -> Result<Option<SchedulerRequest>> {
        if !registry.get(id)?.is_notify() {
            return Err(ServiceError::NotNotifiable(id));
        }
        let subscriptions = self
            .centrals
            .get_mut(&central)
            .ok_or(ServiceError::InvalidReference(central))?;

        if !subscriptions.insert(id) {
            debug!("Central {} already subscribed to {}", central, id);
            return Ok(None);
        }

        let subscribers = self.subscribers.entry(id).or_default();
        subscribers.insert(central);
        debug!("Central {} subscribed to {} ({} subscribers)", central, id, subscribers.len());

        Ok((subscribers.len() == 1).then_some(SchedulerRequest::Start(id)))
    }

    /// Disable notifications of `id` for `central`.
    pub fn on_unsubscribe(
        &mut self,
        registry: &Registry,
        central: CentralId,
        id: Uuid,
    ) -> Result<Option<SchedulerRequest>> {
        if !registry.get(id)?.is_notify() {
            return Err(ServiceError::NotNotifiable(id));
        }
        let subscriptions = self
            .centrals
            .get_mut(&central)
            .ok_or(ServiceError::InvalidReference(central))?;

        if !subscriptions.remove(&id) {
            debug!("Central {} was not subscribed to {}", central, id);
            return Ok(None);
        }

        Ok(self
            .release(central, id)
            .then_some(SchedulerRequest::Cancel(id)))
    }

    /// Drop `central` from the subscribers of `id`. Returns true if none remain.
    fn release(&mut self, central: CentralId, id: Uuid) -> bool {
        let Some(subscribers) = self.subscribers.get_mut(&id) else {
            return false;
        };
        subscribers.remove(&central);
        debug!("Central {} unsubscribed from {} ({} subscribers)", central, id, subscribers.len());
        if subscribers.is_empty() {
            self.subscribers.remove(&id);
            true
        } else {
            false
        }
    }

    /// Centrals currently subscribed to `id`, in handle order.
    pub fn subscribers(&self, id: Uuid) -> Vec<CentralId> {
        self.subscribers
            .get(&id)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn subscriber_count(&self, id: Uuid) -> usize {
        self.subscribers.get(&id).map_or(0, BTreeSet::len)
    }

    pub fn is_connected(&self, central: CentralId) -> bool {
        self.centrals.contains_key(&central)
    }

    pub fn is_subscribed(&self, central: CentralId, id: Uuid) -> bool {
        self.centrals
            .get(&central)
            .is_some_and(|subscriptions| subscriptions.contains(&id))
    }

    pub fn connected_count(&self) -> usize {
        self.centrals.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::ble_constants::*;

    const A: CentralId = CentralId::new(1);
    const B: CentralId = CentralId::new(2);

    #[test]
    fn test_first_subscriber_starts_job() {
        let registry = Registry::new();
        let mut manager = ConnectionManager::new();
        manager.on_connect(A);
        manager.on_connect(B);

        let request = manager.on_subscribe(&registry, A, UPLOAD_COUNT_UUID).unwrap();
        assert_eq!(request, Some(SchedulerRequest::Start(UPLOAD_COUNT_UUID)));

        // Second subscriber does not start another job
        let request = manager.on_subscribe(&registry, B, UPLOAD_COUNT_UUID).unwrap();
        assert_eq!(request, None);
        assert_eq!(manager.subscribers(UPLOAD_COUNT_UUID), vec![A, B]);
    }

    #[test]
    fn test_double_subscribe_is_idempotent() {
        let registry = Registry::new();
        let mut manager = ConnectionManager::new();
        manager.on_connect(A);

        assert!(manager.on_subscribe(&registry, A, POST_COUNT_UUID).unwrap().is_some());
        assert!(manager.on_subscribe(&registry, A, POST_COUNT_UUID).unwrap().is_none());
        assert_eq!(manager.subscriber_count(POST_COUNT_UUID), 1);
    }

    #[test]
    fn test_last_unsubscribe_cancels() {
        let registry = Registry::new();
        let mut manager = ConnectionManager::new();
        manager.on_connect(A);
        manager.on_connect(B);
        manager.on_subscribe(&registry, A, DEVICE_STATE_UUID).unwrap();
        manager.on_subscribe(&registry, B, DEVICE_STATE_UUID).unwrap();

        assert_eq!(manager.on_unsubscribe(&registry, A, DEVICE_STATE_UUID).unwrap(), None);
        assert_eq!(
            manager.on_unsubscribe(&registry, B, DEVICE_STATE_UUID).unwrap(),
            Some(SchedulerRequest::Cancel(DEVICE_STATE_UUID))
        );
        // Unsubscribing again is a no-op
        assert_eq!(manager.on_unsubscribe(&registry, B, DEVICE_STATE_UUID).unwrap(), None);
        assert_eq!(manager.subscriber_count(DEVICE_STATE_UUID), 0);
    }

    #[test]
    fn test_disconnect_releases_subscriptions() {
        let registry = Registry::new();
        let mut manager = ConnectionManager::new();
        manager.on_connect(A);
        manager.on_connect(B);
        manager.on_subscribe(&registry, A, BATTERY_LEVEL_UUID).unwrap();
        manager.on_subscribe(&registry, A, RECORDING_TIME_UUID).unwrap();
        manager.on_subscribe(&registry, B, RECORDING_TIME_UUID).unwrap();

        let requests = manager.on_disconnect(A).unwrap();
        assert_eq!(requests, vec![SchedulerRequest::Cancel(BATTERY_LEVEL_UUID)]);
        assert_eq!(manager.subscribers(RECORDING_TIME_UUID), vec![B]);
        assert!(!manager.is_connected(A));
    }

    #[test]
    fn test_last_disconnect_cancels_all() {
        let registry = Registry::new();
        let mut manager = ConnectionManager::new();
        manager.on_connect(A);
        manager.on_subscribe(&registry, A, UPLOAD_COUNT_UUID).unwrap();

        let requests = manager.on_disconnect(A).unwrap();
        assert_eq!(
            requests,
            vec![
                SchedulerRequest::Cancel(UPLOAD_COUNT_UUID),
                SchedulerRequest::CancelAll
            ]
        );
        assert_eq!(manager.connected_count(), 0);
    }

    #[test]
    fn test_invalid_references() {
        let registry = Registry::new();
        let mut manager = ConnectionManager::new();
        manager.on_connect(A);

        let unknown = uuid_from_short(0xbeef);
        assert_eq!(
            manager.on_subscribe(&registry, A, unknown),
            Err(ServiceError::UnknownCharacteristic(unknown))
        );
        assert_eq!(
            manager.on_subscribe(&registry, B, UPLOAD_COUNT_UUID),
            Err(ServiceError::InvalidReference(B))
        );
        assert_eq!(
            manager.on_subscribe(&registry, A, SET_WAYPOINT_UUID),
            Err(ServiceError::NotNotifiable(SET_WAYPOINT_UUID))
        );
        assert_eq!(manager.on_disconnect(B), Err(ServiceError::InvalidReference(B)));

        // Failed operations leave no trace
        assert_eq!(manager.subscriber_count(UPLOAD_COUNT_UUID), 0);
        assert!(!manager.is_subscribed(A, SET_WAYPOINT_UUID));
    }

    #[test]
    fn test_subscription_does_not_survive_reconnect() {
        let registry = Registry::new();
        let mut manager = ConnectionManager::new();
        manager.on_connect(A);
        manager.on_subscribe(&registry, A, POST_COUNT_UUID).unwrap();
        manager.on_disconnect(A).unwrap();
        manager.on_connect(A);

        assert!(!manager.is_subscribed(A, POST_COUNT_UUID));
        assert_eq!(manager.subscriber_count(POST_COUNT_UUID), 0);
    }

    #[test]
    fn test_central_display() {
        let central = CentralId::from_address([0xAA, 0xBB, 0xCC, 0x01, 0x02, 0x03]);
        assert_eq!(central.to_string(), "AA:BB:CC:01:02:03");
    }
}
