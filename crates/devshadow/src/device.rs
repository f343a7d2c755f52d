//! Device descriptors and the emulator-side contract the engine drives.
//!
//! The engine never owns devices.  It asks a [`Machine`] to enumerate them,
//! then to save or load individual devices through the stream cursors in
//! [`crate::stream`].

use crate::stream::{SnapshotReader, SnapshotWriter, StreamError};
use std::fmt;
use thiserror::Error;

/// Format version passed to every device load.  No negotiation exists.
pub const DEVICE_FORMAT_VERSION: u32 = 0;

/// Opaque, emulator-assigned identity of one device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceHandle(pub u32);

/// One simulated peripheral as reported by the emulator.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DeviceDescriptor {
    handle: DeviceHandle,
    id: String,
}

impl DeviceDescriptor {
    pub fn new(handle: DeviceHandle, id: impl Into<String>) -> Self {
        Self {
            handle,
            id: id.into(),
        }
    }

    pub fn handle(&self) -> DeviceHandle {
        self.handle
    }

    /// Identifier matched against the exclusion set (e.g. `"serial"`).
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.id, self.handle.0)
    }
}

/// Errors a device load can report.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device {device}: {source}")]
    Stream {
        device: String,
        #[source]
        source: StreamError,
    },

    #[error("device {device}: unsupported format version {version}")]
    UnsupportedVersion { device: String, version: u32 },

    #[error("device {device}: corrupt state: {reason}")]
    Corrupt { device: String, reason: String },

    #[error("unknown device handle {0:?}")]
    UnknownHandle(DeviceHandle),
}

impl DeviceError {
    /// Attach the device identifier to a stream failure.
    pub fn stream(device: &DeviceDescriptor, source: StreamError) -> Self {
        DeviceError::Stream {
            device: device.id().to_string(),
            source,
        }
    }
}

/// The emulator as seen by the snapshot engine.
///
/// Implementations must report devices in a stable order and serialize
/// each device to the same number of bytes on every save; the engine
/// freezes the total size after the first capture.
pub trait Machine {
    /// Every device the emulator knows about, in enumeration order.
    fn enumerate(&self) -> Vec<DeviceDescriptor>;

    /// Serialize `device`'s live state through `out`.
    fn save_device(&self, device: &DeviceDescriptor, out: &mut SnapshotWriter<'_>);

    /// Replace `device`'s live state with what `input` yields.
    fn load_device(
        &mut self,
        device: &DeviceDescriptor,
        input: &mut SnapshotReader<'_>,
        version_id: u32,
    ) -> Result<(), DeviceError>;
}
