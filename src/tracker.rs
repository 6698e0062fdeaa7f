use std::collections::HashMap;
use std::time::{Duration, Instant};

use uuid::Uuid;

/// How long a sighting keeps the space active. Independent of the update
/// interval.
pub const STALE_AFTER: Duration = Duration::from_secs(5 * 60);

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Sweep {
    /// At least one beacon was seen within the window.
    pub active: bool,
    pub removed: Vec<Uuid>,
}

/// Last time each matched beacon was seen.
#[derive(Debug, Default)]
pub struct ActivityTracker {
    last_seen: HashMap<Uuid, Instant>,
}

impl ActivityTracker {
    /// Returns true when the beacon was not being tracked yet.
    pub fn record_sighting(&mut self, uuid: Uuid, at: Instant) -> bool {
        self.last_seen.insert(uuid, at).is_none()
    }

    pub fn sweep(&mut self, now: Instant, stale_after: Duration) -> Sweep {
        let mut sweep = Sweep::default();
        for (uuid, last_seen) in &self.last_seen {
            if now.saturating_duration_since(*last_seen) >= stale_after {
                sweep.removed.push(*uuid);
            } else {
                sweep.active = true;
            }
        }

        for uuid in &sweep.removed {
            self.last_seen.remove(uuid);
        }
        sweep
    }

    #[cfg(test)]
    pub fn last_seen(&self, uuid: &Uuid) -> Option<Instant> {
        self.last_seen.get(uuid).copied()
    }

    pub fn len(&self) -> usize {
        self.last_seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uuid(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    #[test]
    fn test_new_activity_only_once() {
        let start = Instant::now();
        let mut tracker = ActivityTracker::default();

        assert!(tracker.record_sighting(uuid(1), start));
        assert!(!tracker.record_sighting(uuid(1), start + Duration::from_secs(10)));
        assert!(!tracker.record_sighting(uuid(1), start + Duration::from_secs(200)));
        assert!(tracker.record_sighting(uuid(2), start + Duration::from_secs(200)));

        assert_eq!(tracker.len(), 2);
        assert_eq!(
            tracker.last_seen(&uuid(1)),
            Some(start + Duration::from_secs(200))
        );
    }

    #[test]
    fn test_sweep_boundary() {
        let start = Instant::now();
        let now = start + Duration::from_secs(600);
        let mut tracker = ActivityTracker::default();
        tracker.record_sighting(uuid(1), now - Duration::from_secs(4 * 60 + 59));
        tracker.record_sighting(uuid(2), now - Duration::from_secs(5 * 60 + 1));

        let sweep = tracker.sweep(now, STALE_AFTER);
        assert!(sweep.active);
        assert_eq!(sweep.removed, vec![uuid(2)]);
        assert!(tracker.last_seen(&uuid(1)).is_some());
        assert!(tracker.last_seen(&uuid(2)).is_none());
    }

    #[test]
    fn test_sweep_exact_window_is_stale() {
        let start = Instant::now();
        let mut tracker = ActivityTracker::default();
        tracker.record_sighting(uuid(1), start);

        let sweep = tracker.sweep(start + STALE_AFTER, STALE_AFTER);
        assert!(!sweep.active);
        assert_eq!(sweep.removed, vec![uuid(1)]);
        assert_eq!(tracker.len(), 0);
    }

    #[test]
    fn test_sweep_all_stale() {
        let start = Instant::now();
        let mut tracker = ActivityTracker::default();
        tracker.record_sighting(uuid(1), start);
        tracker.record_sighting(uuid(2), start + Duration::from_secs(30));
        tracker.record_sighting(uuid(3), start + Duration::from_secs(60));

        let mut sweep = tracker.sweep(start + Duration::from_secs(3600), STALE_AFTER);
        sweep.removed.sort();
        assert!(!sweep.active);
        assert_eq!(sweep.removed, vec![uuid(1), uuid(2), uuid(3)]);
        assert_eq!(tracker.len(), 0);

        // Sighting after removal counts as new activity again
        assert!(tracker.record_sighting(uuid(1), start + Duration::from_secs(3601)));
    }

    #[test]
    fn test_sweep_empty() {
        let mut tracker = ActivityTracker::default();
        assert_eq!(tracker.sweep(Instant::now(), STALE_AFTER), Sweep::default());
    }
}
