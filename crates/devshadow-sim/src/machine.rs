//! A deterministic toy machine the engine can snapshot.

use crate::devices::blob::BlobDevice;
use crate::devices::cpu::CpuRegs;
use crate::devices::entropy::DeterministicEntropy;
use crate::devices::timer::CountdownTimer;
use crate::devices::uart::Uart;
use crate::devices::SimDevice;
use devshadow::{
    DeviceDescriptor, DeviceError, DeviceHandle, Machine, SnapshotReader, SnapshotWriter,
};
use log::trace;

/// Bytes of the opaque `ram` save entry.
const RAM_ENTRY_LEN: usize = 64;
/// Bytes of the opaque `block` save entry.
const BLOCK_ENTRY_LEN: usize = 16;

/// Devices in enumeration order.  A device's handle is its index.
#[derive(Debug, Default)]
pub struct SimMachine {
    devices: Vec<Box<dyn SimDevice>>,
}

impl SimMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stock machine: cpu, ram, timer, uart, entropy, block.
    pub fn standard(seed: u64) -> Self {
        let mut machine = Self::new();
        machine.add(CpuRegs::default());
        machine.add(BlobDevice::new("ram", RAM_ENTRY_LEN));
        machine.add(CountdownTimer::new("timer", 3));
        machine.add(Uart::new("serial"));
        machine.add(DeterministicEntropy::new("rng", seed));
        machine.add(BlobDevice::new("block", BLOCK_ENTRY_LEN));
        machine
    }

    /// Append a device; returns its handle.
    pub fn add(&mut self, device: impl SimDevice + 'static) -> DeviceHandle {
        let handle = DeviceHandle(self.devices.len() as u32);
        self.devices.push(Box::new(device));
        handle
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn device(&self, id: &str) -> Option<&dyn SimDevice> {
        self.devices
            .iter()
            .find(|d| d.id() == id)
            .map(|d| &**d)
    }

    /// Advance every device by one step.
    pub fn step(&mut self, tick: u64) {
        trace!("step {tick}");
        for device in &mut self.devices {
            device.step(tick);
        }
    }

    /// Hand `seed` to every device; only randomness sources use it.
    pub fn reseed(&mut self, seed: u64) {
        for device in &mut self.devices {
            device.reseed(seed);
        }
    }

    /// Digest of the named devices, in machine order.
    pub fn fingerprint_of<'a>(&self, ids: impl IntoIterator<Item = &'a str>) -> u64 {
        let ids: Vec<&str> = ids.into_iter().collect();
        self.devices
            .iter()
            .filter(|d| ids.iter().any(|id| *id == d.id()))
            .fold(0, |acc, d| acc.rotate_left(7) ^ d.fingerprint())
    }

    /// Digest of every device.
    pub fn fingerprint(&self) -> u64 {
        self.devices
            .iter()
            .fold(0, |acc, d| acc.rotate_left(7) ^ d.fingerprint())
    }

    fn by_handle(&self, handle: DeviceHandle) -> Option<&dyn SimDevice> {
        self.devices.get(handle.0 as usize).map(|d| &**d)
    }
}

impl Machine for SimMachine {
    fn enumerate(&self) -> Vec<DeviceDescriptor> {
        self.devices
            .iter()
            .enumerate()
            .map(|(i, d)| DeviceDescriptor::new(DeviceHandle(i as u32), d.id()))
            .collect()
    }

    fn save_device(&self, device: &DeviceDescriptor, out: &mut SnapshotWriter<'_>) {
        let Some(dev) = self.by_handle(device.handle()) else {
            panic!("save requested for unknown device {device}");
        };
        dev.save(out);
    }

    fn load_device(
        &mut self,
        device: &DeviceDescriptor,
        input: &mut SnapshotReader<'_>,
        version_id: u32,
    ) -> Result<(), DeviceError> {
        let dev = self
            .devices
            .get_mut(device.handle().0 as usize)
            .ok_or(DeviceError::UnknownHandle(device.handle()))?;
        dev.load(input, version_id)
    }
}
