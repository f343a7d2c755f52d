//! Slot assignment for block devices in the shadow address space.

use super::BlockDeviceId;
use crate::verified::block::slot_base;
use log::debug;
use std::collections::HashMap;

/// Assigns 0, 1, 2, … to block devices in order of first use.
///
/// Slots name regions of the address space; they are the same in every
/// execution state.
#[derive(Debug, Default)]
pub struct SlotAllocator {
    slots: HashMap<BlockDeviceId, u32>,
    order: Vec<BlockDeviceId>,
}

impl SlotAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot of `device`, assigning the next one on first encounter.
    pub fn slot_of(&mut self, device: &BlockDeviceId) -> u32 {
        if let Some(&slot) = self.slots.get(device) {
            return slot;
        }
        let slot = u32::try_from(self.order.len())
            .unwrap_or_else(|_| panic!("block device slots exhausted at {device}"));
        debug!("Block device {device} assigned shadow slot {slot}");
        self.slots.insert(device.clone(), slot);
        self.order.push(device.clone());
        slot
    }

    /// Base of `device`'s region, assigning a slot if needed.
    pub fn base_address_of(&mut self, device: &BlockDeviceId) -> u64 {
        slot_base(self.slot_of(device))
    }

    /// Devices in slot order.
    pub fn devices(&self) -> &[BlockDeviceId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
