//! The snapshot engine and per-state device views.
//!
//! [`SnapshotEngine`] is the single context object: it owns the machine,
//! the device registry, the baseline (staging buffer, later the canonical
//! image) and the block slot allocator.  [`DeviceState`] is what each
//! execution state carries: its private snapshot buffer and its shadow
//! sector store.
//!
//! # Lifecycle
//!
//! ```text
//!  initialize()         build registry (once)
//!  capture(s0)          staging → canonical image, s0 gets a copy
//!  s1 = s0.fork()       s1 duplicates s0's buffer, forks its sectors
//!  capture(s1)          overwrite s1's buffer in place
//!  restore(s0)          push s0's bytes back into the live devices
//! ```
//!
//! The engine is single-threaded and `&mut`-driven: the caller quiesces the
//! machine before every capture, restore or fork.

use crate::block::backing::BackingMedium;
use crate::block::disk::{DiskPolicy, ShadowDisk};
use crate::block::object_store::{ObjectStore, OverlayStore};
use crate::block::sector::ShadowSectorStore;
use crate::block::slots::SlotAllocator;
use crate::block::BlockDeviceId;
use crate::canonical::{Baseline, CanonicalImage};
use crate::config::EngineConfig;
use crate::device::{DeviceDescriptor, DeviceError, Machine, DEVICE_FORMAT_VERSION};
use crate::registry::DeviceRegistry;
use crate::stream::{ByteSink, SnapshotReader, SnapshotWriter, StateBuffer};
use log::{debug, info, warn};

// ═══════════════════════════════════════════════════════════════════════
//  Per-state view
// ═══════════════════════════════════════════════════════════════════════

/// Device and disk state private to one execution state.
#[derive(Debug)]
pub struct DeviceState<S = OverlayStore> {
    buffer: Option<StateBuffer>,
    sectors: ShadowSectorStore<S>,
}

impl Default for DeviceState<OverlayStore> {
    fn default() -> Self {
        Self::with_store(OverlayStore::new())
    }
}

impl<S: ObjectStore> DeviceState<S> {
    /// A state with no snapshot buffer, whose sectors live in `objects`.
    pub fn with_store(objects: S) -> Self {
        Self {
            buffer: None,
            sectors: ShadowSectorStore::new(objects),
        }
    }

    /// Snapshot bytes from this state's last capture, if any.
    pub fn buffer(&self) -> Option<&StateBuffer> {
        self.buffer.as_ref()
    }

    /// This state's private sector overlay.
    pub fn sectors(&self) -> &ShadowSectorStore<S> {
        &self.sectors
    }

    /// Duplicate this state for a new branch.
    ///
    /// The child gets a byte-for-byte copy of the snapshot buffer and a
    /// copy-on-write fork of the sector store.
    ///
    /// # Panics
    ///
    /// Panics if this state has never been captured.
    pub fn fork(&mut self) -> Self {
        let buffer = match &self.buffer {
            Some(buffer) => buffer.clone(),
            None => panic!("cannot fork a device state that was never captured"),
        };
        Self {
            buffer: Some(buffer),
            sectors: self.sectors.fork(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Engine
// ═══════════════════════════════════════════════════════════════════════

/// Process-wide snapshot context shared by every execution state.
pub struct SnapshotEngine<M> {
    machine: M,
    config: EngineConfig,
    registry: Option<DeviceRegistry>,
    baseline: Baseline,
    slots: SlotAllocator,
}

impl<M: Machine> SnapshotEngine<M> {
    /// An uninitialized engine driving `machine`.
    pub fn new(machine: M, config: EngineConfig) -> Self {
        Self {
            machine,
            config,
            registry: None,
            baseline: Baseline::default(),
            slots: SlotAllocator::new(),
        }
    }

    /// Build the device registry.  Later calls do nothing.
    pub fn initialize(&mut self) {
        if self.registry.is_some() {
            return;
        }

        info!("Initializing device state");
        let registry =
            DeviceRegistry::build(self.machine.enumerate(), &self.config.exclusion_set());
        info!(
            "{} device(s) registered for per-state snapshots",
            registry.len()
        );
        self.registry = Some(registry);

        match self.policy() {
            DiskPolicy::Ephemeral => {
                warn!("All writes to disk will be lost after shutdown");
            }
            DiskPolicy::Persistent => {
                warn!("All disk writes will be SHARED across states; states can corrupt each other");
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.registry.is_some()
    }

    /// Registered devices in capture order; empty before `initialize`.
    pub fn devices(&self) -> &[DeviceDescriptor] {
        self.registry
            .as_ref()
            .map(DeviceRegistry::devices)
            .unwrap_or(&[])
    }

    /// Configuration the engine was built with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Block-storage durability policy from the configuration.
    pub fn policy(&self) -> DiskPolicy {
        DiskPolicy::from_persistent_flag(self.config.persistent_disk_writes)
    }

    /// The emulator whose devices get captured and restored.
    pub fn machine(&self) -> &M {
        &self.machine
    }

    /// Mutable access to the emulator, for running it between captures.
    pub fn machine_mut(&mut self) -> &mut M {
        &mut self.machine
    }

    /// The canonical image, once the first capture has finalized it.
    pub fn canonical(&self) -> Option<&CanonicalImage> {
        self.baseline.canonical()
    }

    pub fn finalized_size(&self) -> Option<usize> {
        self.baseline.finalized_size()
    }

    /// A new, independent state.  It starts from the canonical image when
    /// one exists.
    pub fn new_state(&self) -> DeviceState {
        self.new_state_in(OverlayStore::new())
    }

    /// Like [`new_state`](Self::new_state) with a caller-supplied store.
    pub fn new_state_in<S: ObjectStore>(&self, objects: S) -> DeviceState<S> {
        let mut state = DeviceState::with_store(objects);
        state.buffer = self.canonical().map(CanonicalImage::instantiate);
        state
    }

    // ── Capture / restore ─────────────────────────────────────────────

    /// Serialize every registered device into `state`.
    ///
    /// The first capture ever goes through the staging buffer and
    /// finalizes the canonical image; `state` then receives a copy of it.
    /// Later captures write straight into `state`'s own buffer.
    ///
    /// # Panics
    ///
    /// Panics if the engine was not initialized.
    pub fn capture<S: ObjectStore>(&mut self, state: &mut DeviceState<S>) {
        let Some(registry) = self.registry.as_ref() else {
            panic!("device state captured before the engine was initialized");
        };

        let image = match &mut self.baseline {
            Baseline::Staging(staging) => {
                let written = save_devices(&self.machine, registry, staging);
                debug!("First capture staged {written} bytes");
                let image = self.baseline.freeze();
                state.buffer = Some(image.instantiate());
                return;
            }
            Baseline::Frozen(image) => &*image,
        };
        let buffer = state.buffer.get_or_insert_with(|| {
            debug!("State had no snapshot buffer; seeding it from the canonical image");
            image.instantiate()
        });
        assert_eq!(
            buffer.len(),
            image.size(),
            "state snapshot buffer does not match the finalized size"
        );
        save_devices(&self.machine, registry, buffer);
    }

    /// Load every registered device from `state`'s buffer.
    ///
    /// # Panics
    ///
    /// Panics if no capture has finalized the canonical image yet, or if
    /// `state` has no buffer of the finalized size.  Both mean the caller
    /// is restoring something that was never captured.
    ///
    /// # Errors
    ///
    /// Returns the first device load failure.  Devices ahead of the failing
    /// one in registry order have already been loaded from `state`, so the
    /// machine is left partly restored; the caller must restore a known
    /// good state before capturing again.
    pub fn restore<S: ObjectStore>(&mut self, state: &DeviceState<S>) -> Result<(), DeviceError> {
        let Some(size) = self.baseline.finalized_size() else {
            panic!("device state restored before any capture finalized the canonical image");
        };
        let Some(buffer) = state.buffer.as_ref() else {
            panic!("device state restored without a snapshot buffer");
        };
        assert_eq!(
            buffer.len(),
            size,
            "state snapshot buffer does not match the finalized size"
        );
        let Some(registry) = self.registry.as_ref() else {
            panic!("device state restored before the engine was initialized");
        };

        let mut input = SnapshotReader::new(buffer);
        for device in registry {
            self.machine
                .load_device(device, &mut input, DEVICE_FORMAT_VERSION)?;
        }
        Ok(())
    }

    // ── Block storage ─────────────────────────────────────────────────

    /// Slot of `device` in the shadow address space.
    pub fn slot_of(&mut self, device: &BlockDeviceId) -> u32 {
        self.slots.slot_of(device)
    }

    /// Base of `device`'s region in the shadow address space.
    pub fn base_address_of(&mut self, device: &BlockDeviceId) -> u64 {
        self.slots.base_address_of(device)
    }

    /// Slot assignments made so far.
    pub fn slots(&self) -> &SlotAllocator {
        &self.slots
    }

    /// Write whole sectors into `state`'s overlay.  Always succeeds and
    /// returns the number of sectors written.
    pub fn write_sectors<S: ObjectStore>(
        &mut self,
        state: &mut DeviceState<S>,
        device: &BlockDeviceId,
        sector: u64,
        buf: &[u8],
    ) -> usize {
        let base = self.slots.base_address_of(device);
        state.sectors.write(base, sector, buf)
    }

    /// Read consecutive sectors `state` has written, stopping at the first
    /// one it has not.  Returns the number of sectors read.
    pub fn read_sectors<S: ObjectStore>(
        &mut self,
        state: &DeviceState<S>,
        device: &BlockDeviceId,
        sector: u64,
        buf: &mut [u8],
    ) -> usize {
        let base = self.slots.base_address_of(device);
        state.sectors.read(base, sector, buf)
    }

    /// `state`'s view of `device` on top of `backing`, under the configured
    /// durability policy.
    pub fn disk<'a, S: ObjectStore, B: BackingMedium + ?Sized>(
        &mut self,
        state: &'a mut DeviceState<S>,
        device: &BlockDeviceId,
        backing: &'a mut B,
    ) -> ShadowDisk<'a, S, B> {
        let base = self.slots.base_address_of(device);
        ShadowDisk::new(self.policy(), base, &mut state.sectors, backing)
    }
}

/// Run every registered device's save routine against `sink`, in registry
/// order, through one continuous writer.  Returns the bytes written.
fn save_devices<M: Machine>(machine: &M, registry: &DeviceRegistry, sink: &mut dyn ByteSink) -> u64 {
    let mut out = SnapshotWriter::new(sink);
    for device in registry {
        machine.save_device(device, &mut out);
    }
    out.position()
}
