use uuid::Uuid;

use crate::{config::BeaconConfig, ibeacon::Advertisement};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BeaconWatch {
    pub uuid: Uuid,
    pub major: u16,
    pub minor: u16,
    pub min_rssi: i16,
}

impl BeaconWatch {
    /// Identity must match exactly and the signal must be stronger than the
    /// configured floor.
    pub fn matches(&self, advertisement: &Advertisement) -> bool {
        self.uuid == advertisement.uuid
            && self.major == advertisement.major
            && self.minor == advertisement.minor
            && advertisement.rssi > self.min_rssi
    }
}

/// Named beacon watches, in configuration order.
#[derive(Clone, Debug, Default)]
pub struct Registry {
    watches: Vec<(String, BeaconWatch)>,
}

impl Registry {
    pub fn new(beacons: &[BeaconConfig]) -> Self {
        let watches = beacons
            .iter()
            .map(|beacon| {
                (
                    beacon.name.clone(),
                    BeaconWatch {
                        uuid: beacon.uuid,
                        major: beacon.major,
                        minor: beacon.minor,
                        min_rssi: beacon.min_rssi,
                    },
                )
            })
            .collect();
        Registry { watches }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BeaconWatch)> {
        self.watches
            .iter()
            .map(|(name, watch)| (name.as_str(), watch))
    }

    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }

    /// Names of every watch satisfied by this advertisement.
    pub fn matches(&self, advertisement: &Advertisement) -> Vec<&str> {
        self.iter()
            .filter(|(_, watch)| watch.matches(advertisement))
            .map(|(name, _)| name)
            .collect()
    }
}
