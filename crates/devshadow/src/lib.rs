//! devshadow: per-execution-state device snapshots and copy-on-write disks.
//!
//! Many execution states of one simulated machine each see a private copy
//! of peripheral device state and block-storage content, while sharing one
//! canonical baseline image and one emulator.
//!
//! # Architecture
//!
//! - [`config`]: startup configuration (shared devices, disk policy)
//! - [`device`]: device descriptors and the [`Machine`] contract
//! - [`registry`]: write-once list of devices snapshotted per state
//! - [`stream`]: positional byte store and device stream cursors
//! - [`canonical`]: the frozen baseline image
//! - [`engine`]: [`SnapshotEngine`] context, capture/restore, [`DeviceState`]
//! - [`block`]: shadow address space, sector overlay, backing media
//! - [`verified`]: pure offset and address arithmetic
//!
//! # Example
//!
//! ```rust,ignore
//! use devshadow::{EngineConfig, SnapshotEngine};
//!
//! let config = EngineConfig::default().with_shared_devices("serial");
//! let mut engine = SnapshotEngine::new(machine, config);
//! engine.initialize();
//!
//! let mut root = engine.new_state();
//! engine.capture(&mut root);          // finalizes the canonical image
//! let branch = root.fork();
//! engine.restore(&branch).unwrap();
//! ```

pub mod block;
pub mod canonical;
pub mod config;
pub mod device;
pub mod engine;
pub mod registry;
pub mod stream;
pub mod verified;

pub use block::backing::{BackingMedium, MemoryImage};
pub use block::disk::{DiskPolicy, ShadowDisk};
pub use block::object_store::{ObjectStore, OverlayStore, SectorObject};
pub use block::{BlockDeviceId, BlockError, SECTOR_SIZE};
pub use canonical::CanonicalImage;
pub use config::{ConfigError, EngineConfig};
pub use device::{DeviceDescriptor, DeviceError, DeviceHandle, Machine};
pub use engine::{DeviceState, SnapshotEngine};
pub use stream::{SnapshotReader, SnapshotWriter, StreamError};
