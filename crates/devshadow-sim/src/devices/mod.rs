//! Deterministic simulated peripherals.
//!
//! Every device serializes to a fixed number of bytes so that the engine's
//! finalized image size stays valid for the life of the process.

pub mod blob;
pub mod cpu;
pub mod entropy;
pub mod timer;
pub mod uart;

use devshadow::{DeviceError, SnapshotReader, SnapshotWriter};

/// A peripheral the [`SimMachine`](crate::machine::SimMachine) can host.
pub trait SimDevice: std::fmt::Debug {
    /// Save-entry identifier, matched against the shared-device list.
    fn id(&self) -> &str;

    fn save(&self, out: &mut SnapshotWriter<'_>);

    fn load(&mut self, input: &mut SnapshotReader<'_>, version_id: u32) -> Result<(), DeviceError>;

    /// Advance one simulation step.
    fn step(&mut self, tick: u64);

    /// Switch to a new random stream.  Devices without randomness ignore it.
    fn reseed(&mut self, _seed: u64) {}

    /// Short digest of the device state for comparisons and logs.
    fn fingerprint(&self) -> u64;
}

/// Reject anything but format version 0.
pub(crate) fn check_version(id: &str, version_id: u32) -> Result<(), DeviceError> {
    if version_id != devshadow::device::DEVICE_FORMAT_VERSION {
        return Err(DeviceError::UnsupportedVersion {
            device: id.to_string(),
            version: version_id,
        });
    }
    Ok(())
}

/// Wrap a stream failure with the device id.
pub(crate) fn stream_err(id: &str) -> impl Fn(devshadow::StreamError) -> DeviceError + '_ {
    move |source| DeviceError::Stream {
        device: id.to_string(),
        source,
    }
}

/// FNV-1a over `bytes`, folded into `seed`.
pub(crate) fn fnv1a(seed: u64, bytes: &[u8]) -> u64 {
    let mut hash = seed ^ 0xcbf2_9ce4_8422_2325;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}
