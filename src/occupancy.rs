//! Debounced occupancy.
//!
//! Sightings of registered beacons keep the space `active` for
//! [`STALE_AFTER`]; a periodic evaluation sweeps stale beacons and reports the
//! current level. The first sighting of a beacon that was not being tracked
//! reports `active` straight away instead of waiting for the next evaluation.
//!
//! Both kinds of report go into one channel with a single consumer, see
//! [`crate::reporter::Reporter`].

use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use log::{debug, error, info};
use tokio::sync::mpsc;

use crate::ibeacon;
use crate::messages::{OccupancyState, ReportTrigger, StateReport};
use crate::registry::Registry;
use crate::tracker::{ActivityTracker, STALE_AFTER};

#[derive(Debug, Default)]
struct PresenceState {
    tracker: ActivityTracker,
    /// `None` until the first evaluation.
    current: Option<OccupancyState>,
}

pub struct Presence {
    registry: Registry,
    state: Mutex<PresenceState>,
    reports: mpsc::UnboundedSender<StateReport>,
}

impl Presence {
    pub fn new(registry: Registry, reports: mpsc::UnboundedSender<StateReport>) -> Self {
        Presence {
            registry,
            state: Mutex::new(PresenceState::default()),
            reports,
        }
    }

    fn lock(&self) -> MutexGuard<'_, PresenceState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Handles one manufacturer data field from the radio. Returns the names
    /// of the watches it matched.
    pub fn observe(&self, manufacturer_data: &[u8], rssi: i16, now: Instant) -> Vec<String> {
        if manufacturer_data.is_empty() {
            return Vec::new();
        }
        let Some(advertisement) = ibeacon::decode(manufacturer_data, rssi) else {
            return Vec::new();
        };

        let matched: Vec<String> = self
            .registry
            .matches(&advertisement)
            .into_iter()
            .map(str::to_string)
            .collect();
        if matched.is_empty() {
            return matched;
        }

        let mut state = self.lock();
        for name in &matched {
            if state.tracker.record_sighting(advertisement.uuid, now) {
                info!(
                    "discovered new activity for {}: RSSI {}",
                    name, advertisement.rssi
                );
                self.send(StateReport::new(
                    OccupancyState::Active,
                    ReportTrigger::NewActivity(name.clone()),
                ));
            } else {
                debug!(
                    "Seen {} ({}) RSSI {}",
                    name,
                    advertisement.uuid_string(),
                    advertisement.rssi
                );
            }
        }
        matched
    }

    /// Sweeps stale beacons and reports the resulting state. Reports every
    /// time, whether or not the state changed.
    pub fn evaluate(&self, now: Instant) -> OccupancyState {
        let mut state = self.lock();
        let sweep = state.tracker.sweep(now, STALE_AFTER);
        for uuid in &sweep.removed {
            debug!(
                "No activity from {} within {:?}",
                ibeacon::canonical_uuid(uuid),
                STALE_AFTER
            );
        }

        let occupancy = if sweep.active {
            OccupancyState::Active
        } else {
            OccupancyState::Inactive
        };
        if state.current != Some(occupancy) {
            info!("Occupancy is now {}", occupancy);
        }
        state.current = Some(occupancy);

        self.send(StateReport::new(occupancy, ReportTrigger::Sweep));
        occupancy
    }

    /// Last evaluated state.
    pub fn current(&self) -> Option<OccupancyState> {
        self.lock().current
    }

    pub fn tracked(&self) -> usize {
        self.lock().tracker.len()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn send(&self, report: StateReport) {
        if let Err(err) = self.reports.send(report) {
            error!("Error queueing state report: {:?}", err);
        }
    }
}
