//! Owner-side list of peers that advertise the capability, kept current from `DeviceChange`s.

use std::collections::BTreeMap;

use scout_core::{DeviceChange, ObjectPath, PeerInfo};
use tracing::info;

#[derive(Debug, Default, Clone)]
pub struct DeviceList {
    devices: BTreeMap<ObjectPath, PeerInfo>,
}

impl DeviceList {
    pub fn apply(&mut self, change: DeviceChange) {
        match change {
            DeviceChange::Added(p) => {
                info!(peer = %p.path, name = %p.display_name, address = %p.address, "Sync device found");
                self.devices.insert(p.path.clone(), p);
            }
            DeviceChange::Updated(p) => {
                self.devices.insert(p.path.clone(), p);
            }
            DeviceChange::Removed(path) => {
                if self.devices.remove(&path).is_some() {
                    info!(peer = %path, "Sync device gone");
                }
            }
        }
    }

    /// Ordered by path.
    pub fn to_vec(&self) -> Vec<PeerInfo> {
        self.devices.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
