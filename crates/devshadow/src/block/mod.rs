//! Block storage: shadow address space, per-state sector overlay, and the
//! routed disk facade.
//!
//! Every block device gets a slot in a flat shadow address space
//! ([`slots`]).  A state's private writes live as sector-sized objects in
//! its [`object_store`], addressed `slot_base + sector * SECTOR_SIZE`
//! ([`sector`]).  [`disk`] combines that overlay with the real
//! [`backing`] medium according to the configured durability policy.

pub mod backing;
pub mod disk;
pub mod object_store;
pub mod sector;
pub mod slots;

use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

/// Bytes per sector.  All block I/O is whole-sector.
pub const SECTOR_SIZE: usize = 512;

/// Size of each device's region in the shadow address space (256 TiB).
pub const ADDRESS_SPACE_PER_DEVICE: u64 = 1 << 48;

/// Highest sector count addressable inside one region.
pub const MAX_SECTORS_PER_DEVICE: u64 = ADDRESS_SPACE_PER_DEVICE / SECTOR_SIZE as u64;

/// Errors from backing media and the disk facade.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BlockError {
    /// The requested range falls outside the medium.
    #[error("out of bounds: offset {offset}, len {len}, device size {device_size}")]
    OutOfBounds {
        offset: u64,
        len: u64,
        device_size: u64,
    },

    /// The image is not a raw sector image.
    #[error("unsupported disk image: {reason}")]
    UnsupportedFormat { reason: String },
}

/// Identity of one block device.
///
/// Equality and hashing use `identity` only; `label` is for logs.
#[derive(Clone, Debug)]
pub struct BlockDeviceId {
    identity: u64,
    label: String,
}

impl BlockDeviceId {
    pub fn new(identity: u64, label: impl Into<String>) -> Self {
        Self {
            identity,
            label: label.into(),
        }
    }

    pub fn identity(&self) -> u64 {
        self.identity
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl PartialEq for BlockDeviceId {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
    }
}

impl Eq for BlockDeviceId {}

impl Hash for BlockDeviceId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity.hash(state);
    }
}

impl fmt::Display for BlockDeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:#x})", self.label, self.identity)
    }
}
