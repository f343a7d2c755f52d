//! Write-once registry of devices that get per-state snapshots.

use crate::device::DeviceDescriptor;
use log::debug;
use std::collections::BTreeSet;

/// Ordered list of devices captured and restored for every state.
///
/// Order is enumeration order and never changes: capture and restore walk
/// the same sequence so that each device finds its bytes at the offsets it
/// wrote them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceRegistry {
    devices: Vec<DeviceDescriptor>,
}

impl DeviceRegistry {
    /// Keep every enumerated device whose identifier is not in `excluded`.
    pub fn build(
        enumerated: impl IntoIterator<Item = DeviceDescriptor>,
        excluded: &BTreeSet<String>,
    ) -> Self {
        debug!("Looking for relevant virtual devices...");
        let mut devices = Vec::new();
        for device in enumerated {
            if excluded.contains(device.id()) {
                debug!("   Shared device {device}");
            } else {
                debug!("   Registering device {device}");
                devices.push(device);
            }
        }
        Self { devices }
    }

    pub fn devices(&self) -> &[DeviceDescriptor] {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.devices.iter().any(|d| d.id() == id)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DeviceDescriptor> {
        self.devices.iter()
    }
}

impl<'a> IntoIterator for &'a DeviceRegistry {
    type Item = &'a DeviceDescriptor;
    type IntoIter = std::slice::Iter<'a, DeviceDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
