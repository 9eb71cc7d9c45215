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

//! Capture service engine.
//!
//! Characteristic registry, notification scheduler, write dispatcher, and
//! connection lifecycle, composed by [`CaptureService`].

mod capture;
mod dispatcher;
mod lifecycle;
mod registry;
mod scheduler;
mod telemetry;

pub use capture::{CaptureService, Transport, TransportEvent};
pub use dispatcher::{encode_checkpoint, Command, CommandHandler, Dispatcher, InspectionLog};
pub use lifecycle::{CentralId, ConnectionManager, SchedulerRequest};
pub use registry::{Access, Capability, Characteristic, CharacteristicKind, Registry};
pub use scheduler::{Job, Notification, NotificationPeriods, Scheduler};
pub use telemetry::{Telemetry, DEVICE_STATES};
