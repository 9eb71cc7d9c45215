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

//! Notification scheduler.
//!
//! Owns one [`Job`] per notifiable characteristic that has subscribers. Jobs
//! are plain records; the event loop asks for [`Scheduler::next_deadline`],
//! sleeps, and then calls [`Scheduler::fire_due`]. Each fire reschedules its
//! job at `now + period`, relative to the actual fire time, so the effective
//! period grows with dispatch latency.

use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use super::registry::{CharacteristicKind, Registry};
use super::telemetry::Telemetry;
use crate::config::TelemetryConfig;
use crate::error::{Result, ServiceError};

/// Shortest period a job can run on.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Notification period of each notifiable characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationPeriods {
    pub battery_level: Duration,
    pub upload_count: Duration,
    pub post_count: Duration,
    pub recording_time: Duration,
    pub device_state: Duration,
}

impl Default for NotificationPeriods {
    fn default() -> Self {
        Self {
            battery_level: Duration::from_secs(5),
            upload_count: Duration::from_secs(1),
            post_count: Duration::from_secs(1),
            recording_time: Duration::from_secs(1),
            device_state: Duration::from_secs(5),
        }
    }
}

impl NotificationPeriods {
    pub fn from_config(config: &TelemetryConfig) -> Self {
        Self {
            battery_level: Duration::from_millis(config.battery_period_ms),
            upload_count: Duration::from_millis(config.upload_period_ms),
            post_count: Duration::from_millis(config.post_period_ms),
            recording_time: Duration::from_millis(config.recording_time_period_ms),
            device_state: Duration::from_millis(config.device_state_period_ms),
        }
    }

    /// Period for `kind`, at least [`MIN_PERIOD`], or `None` if it is not
    /// notifiable.
    pub fn period_for(&self, kind: CharacteristicKind) -> Option<Duration> {
        let period = match kind {
            CharacteristicKind::BatteryLevel => self.battery_level,
            CharacteristicKind::UploadCount => self.upload_count,
            CharacteristicKind::PostCount => self.post_count,
            CharacteristicKind::RecordingTime => self.recording_time,
            CharacteristicKind::DeviceState => self.device_state,
            _ => return None,
        };
        Some(period.max(MIN_PERIOD))
    }
}

/// A scheduled notification job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Job {
    pub characteristic: Uuid,
    pub period: Duration,
    pub next_fire: Instant,
}

/// A value ready to be published to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub characteristic: Uuid,
    pub value: Vec<u8>,
}

/// Single authority over notification jobs.
#[derive(Debug)]
pub struct Scheduler {
    jobs: HashMap<Uuid, Job>,
    periods: NotificationPeriods,
    telemetry: Telemetry,
}

impl Scheduler {
    pub fn new(telemetry: Telemetry, periods: NotificationPeriods) -> Self {
        Self {
            jobs: HashMap::new(),
            periods,
            telemetry,
        }
    }

    /// Start the job for `id` and return its initial value.
    ///
    /// Returns `Ok(None)` when the job is already running.
    pub fn start(
        &mut self,
        registry: &mut Registry,
        id: Uuid,
        now: Instant,
    ) -> Result<Option<Notification>> {
        if self.jobs.contains_key(&id) {
            debug!("Job for {} already running", id);
            return Ok(None);
        }

        let characteristic = registry.get_mut(id)?;
        let kind = characteristic.kind();
        let period = self
            .periods
            .period_for(kind)
            .ok_or(ServiceError::NotNotifiable(id))?;
        let value = self
            .telemetry
            .sample(kind)
            .ok_or(ServiceError::NotNotifiable(id))?;
        characteristic.latest_value = value.clone();

        self.jobs.insert(
            id,
            Job {
                characteristic: id,
                period,
                next_fire: now + period,
            },
        );
        info!("Started {} notifications every {:?}", kind.as_str(), period);

        Ok(Some(Notification {
            characteristic: id,
            value,
        }))
    }

    /// Cancel the job for `id`. Returns true if one was running.
    pub fn cancel(&mut self, id: Uuid) -> bool {
        let cancelled = self.jobs.remove(&id).is_some();
        if cancelled {
            info!("Stopped notifications for {}", id);
        }
        cancelled
    }

    /// Cancel every job. Returns how many were running.
    pub fn cancel_all(&mut self) -> usize {
        let count = self.jobs.len();
        self.jobs.clear();
        if count > 0 {
            info!("Stopped all notifications ({} jobs)", count);
        }
        count
    }

    /// Fire every job due at `now`, earliest first.
    pub fn fire_due(&mut self, registry: &mut Registry, now: Instant) -> Vec<Notification> {
        let mut due: Vec<Job> = self
            .jobs
            .values()
            .filter(|job| job.next_fire <= now)
            .copied()
            .collect();
        due.sort_by_key(|job| job.next_fire);

        let mut notifications = Vec::with_capacity(due.len());
        for job in due {
            let Ok(characteristic) = registry.get_mut(job.characteristic) else {
                self.jobs.remove(&job.characteristic);
                continue;
            };
            let Some(value) = self.telemetry.sample(characteristic.kind()) else {
                self.jobs.remove(&job.characteristic);
                continue;
            };
            characteristic.latest_value = value.clone();

            if let Some(entry) = self.jobs.get_mut(&job.characteristic) {
                entry.next_fire = now + entry.period;
            }
            notifications.push(Notification {
                characteristic: job.characteristic,
                value,
            });
        }
        notifications
    }

    /// Earliest pending fire time.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.jobs.values().map(|job| job.next_fire).min()
    }

    pub fn is_active(&self, id: Uuid) -> bool {
        self.jobs.contains_key(&id)
    }

    pub fn job(&self, id: Uuid) -> Option<&Job> {
        self.jobs.get(&id)
    }

    pub fn active_jobs(&self) -> usize {
        self.jobs.len()
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battery::FixedBattery;
    use crate::bluetooth::ble_constants::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn scheduler() -> Scheduler {
        let telemetry =
            Telemetry::with_rng(Box::new(FixedBattery(90)), StdRng::seed_from_u64(1));
        Scheduler::new(telemetry, NotificationPeriods::default())
    }

    fn counter(value: &[u8]) -> u64 {
        u64::from_le_bytes(value.try_into().unwrap())
    }

    #[test]
    fn test_start_publishes_immediately() {
        let mut registry = Registry::new();
        let mut scheduler = scheduler();
        let now = Instant::now();

        let first = scheduler.start(&mut registry, RECORDING_TIME_UUID, now).unwrap();
        let first = first.expect("initial notification");
        assert_eq!(first.characteristic, RECORDING_TIME_UUID);
        assert_eq!(counter(&first.value), 1);
        assert_eq!(registry.get(RECORDING_TIME_UUID).unwrap().latest_value, first.value);

        let job = scheduler.job(RECORDING_TIME_UUID).unwrap();
        assert_eq!(job.next_fire, now + Duration::from_secs(1));
    }

    #[test]
    fn test_zero_period_is_clamped() {
        let periods = NotificationPeriods {
            upload_count: Duration::ZERO,
            ..NotificationPeriods::default()
        };
        let telemetry =
            Telemetry::with_rng(Box::new(FixedBattery(90)), StdRng::seed_from_u64(1));
        let mut scheduler = Scheduler::new(telemetry, periods);
        let mut registry = Registry::new();
        let now = Instant::now();

        scheduler.start(&mut registry, UPLOAD_COUNT_UUID, now).unwrap();
        assert_eq!(scheduler.next_deadline(), Some(now + MIN_PERIOD));

        // A second pass at the same instant has nothing due
        let later = now + MIN_PERIOD;
        assert_eq!(scheduler.fire_due(&mut registry, later).len(), 1);
        assert!(scheduler.fire_due(&mut registry, later).is_empty());
        assert!(scheduler.next_deadline().unwrap() > later);
    }

    #[test]
    fn test_start_is_idempotent() {
        let mut registry = Registry::new();
        let mut scheduler = scheduler();
        let now = Instant::now();

        assert!(scheduler.start(&mut registry, UPLOAD_COUNT_UUID, now).unwrap().is_some());
        assert!(scheduler.start(&mut registry, UPLOAD_COUNT_UUID, now).unwrap().is_none());
        assert_eq!(scheduler.active_jobs(), 1);
    }

    #[test]
    fn test_start_rejects_write_characteristic() {
        let mut registry = Registry::new();
        let mut scheduler = scheduler();

        let result = scheduler.start(&mut registry, SET_CHECKPOINT_UUID, Instant::now());
        assert_eq!(result, Err(ServiceError::NotNotifiable(SET_CHECKPOINT_UUID)));
        assert_eq!(scheduler.active_jobs(), 0);
    }

    #[test]
    fn test_fire_due_reschedules_from_fire_time() {
        let mut registry = Registry::new();
        let mut scheduler = scheduler();
        let start = Instant::now();
        scheduler.start(&mut registry, RECORDING_TIME_UUID, start).unwrap();
        scheduler.start(&mut registry, BATTERY_LEVEL_UUID, start).unwrap();

        // Nothing is due before the first period elapses
        assert!(scheduler.fire_due(&mut registry, start).is_empty());

        // A late wake-up drifts the next fire
        let late = start + Duration::from_millis(1250);
        let fired = scheduler.fire_due(&mut registry, late);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].characteristic, RECORDING_TIME_UUID);
        assert_eq!(counter(&fired[0].value), 2);
        assert_eq!(
            scheduler.job(RECORDING_TIME_UUID).unwrap().next_fire,
            late + Duration::from_secs(1)
        );
        assert_eq!(scheduler.next_deadline(), Some(late + Duration::from_secs(1)));
    }

    #[test]
    fn test_cancel_and_restart() {
        let mut registry = Registry::new();
        let mut scheduler = scheduler();
        let now = Instant::now();

        scheduler.start(&mut registry, RECORDING_TIME_UUID, now).unwrap();
        scheduler.fire_due(&mut registry, now + Duration::from_secs(1));
        assert!(scheduler.cancel(RECORDING_TIME_UUID));
        assert!(!scheduler.cancel(RECORDING_TIME_UUID));
        assert_eq!(scheduler.next_deadline(), None);

        // Restart publishes immediately and the counter keeps counting
        let later = now + Duration::from_secs(10);
        let restarted = scheduler
            .start(&mut registry, RECORDING_TIME_UUID, later)
            .unwrap()
            .unwrap();
        assert_eq!(counter(&restarted.value), 3);
    }

    #[test]
    fn test_cancel_all() {
        let mut registry = Registry::new();
        let mut scheduler = scheduler();
        let now = Instant::now();
        for id in registry.notify_ids() {
            scheduler.start(&mut registry, id, now).unwrap();
        }
        assert_eq!(scheduler.active_jobs(), 5);

        assert_eq!(scheduler.cancel_all(), 5);
        assert!(scheduler.fire_due(&mut registry, now + Duration::from_secs(60)).is_empty());
    }
}
