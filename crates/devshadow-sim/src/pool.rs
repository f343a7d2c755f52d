//! Pool of execution states sharing one machine and one disk.
//!
//! Exactly one state is *running*: its devices live in the machine and its
//! disk view is the one block I/O goes through.  Switching captures the
//! running state and restores the target, the same way a symbolic executor
//! swaps states between scheduling decisions.

use crate::error::SimError;
use crate::machine::SimMachine;
use devshadow::{BlockDeviceId, DeviceState, EngineConfig, MemoryImage, SnapshotEngine};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::fmt;

/// Identity of one execution state in a [`StatePool`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(pub u64);

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

struct Entry {
    state: DeviceState,
    parent: Option<StateId>,
    /// Steps this state has executed; the next tick number.
    ticks: u64,
}

/// Execution states over one [`SimMachine`] and one shared disk image.
pub struct StatePool {
    engine: SnapshotEngine<SimMachine>,
    states: BTreeMap<StateId, Entry>,
    current: StateId,
    next_id: u64,
    disk: BlockDeviceId,
    backing: MemoryImage,
}

impl StatePool {
    /// Initialize the engine and capture the root state, which becomes the
    /// running one and finalizes the canonical image.
    pub fn new(machine: SimMachine, config: EngineConfig, backing: MemoryImage) -> Self {
        let mut engine = SnapshotEngine::new(machine, config);
        engine.initialize();

        let root = StateId(0);
        let mut state = engine.new_state();
        engine.capture(&mut state);

        let disk = BlockDeviceId::new(0, "disk0");
        let slot = engine.slot_of(&disk);
        info!("Root state {root} captured; {disk} in shadow slot {slot}");

        let mut states = BTreeMap::new();
        states.insert(
            root,
            Entry {
                state,
                parent: None,
                ticks: 0,
            },
        );
        Self {
            engine,
            states,
            current: root,
            next_id: 1,
            disk,
            backing,
        }
    }

    /// The running state.
    pub fn current(&self) -> StateId {
        self.current
    }

    /// Number of live states.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// The state `id` was forked from; `None` for the root.
    pub fn parent_of(&self, id: StateId) -> Option<StateId> {
        self.states.get(&id).and_then(|e| e.parent)
    }

    /// Steps `id` has executed.
    pub fn ticks_of(&self, id: StateId) -> Option<u64> {
        self.states.get(&id).map(|e| e.ticks)
    }

    /// The snapshot engine, for inspecting devices and the canonical image.
    pub fn engine(&self) -> &SnapshotEngine<SimMachine> {
        &self.engine
    }

    /// The disk image shared by every state.
    pub fn backing(&self) -> &MemoryImage {
        &self.backing
    }

    /// Number of sectors `id` has shadowed, inherited ones included.
    pub fn shadowed_sectors(&self, id: StateId) -> Option<usize> {
        self.states
            .get(&id)
            .map(|e| e.state.sectors().objects().visible_len())
    }

    /// Give the running state its own random stream.
    pub fn reseed(&mut self, seed: u64) {
        self.engine.machine_mut().reseed(seed);
    }

    /// Run the running state for `steps` steps.
    pub fn step(&mut self, steps: u64) {
        let entry = running(&mut self.states, self.current);
        let start = entry.ticks;
        entry.ticks += steps;
        for tick in start..start + steps {
            self.engine.machine_mut().step(tick);
        }
    }

    /// Branch the running state.  The child starts with the parent's
    /// devices and disk view but does not run until switched to.
    pub fn fork(&mut self) -> StateId {
        let parent = self.current;
        let id = StateId(self.next_id);
        self.next_id += 1;

        let entry = running(&mut self.states, parent);
        let ticks = entry.ticks;
        self.engine.capture(&mut entry.state);
        let state = entry.state.fork();

        debug!("Forked {id} from {parent} at tick {ticks}");
        self.states.insert(
            id,
            Entry {
                state,
                parent: Some(parent),
                ticks,
            },
        );
        id
    }

    /// Make `id` the running state.
    ///
    /// If a device rejects `id`'s snapshot, the running state is reloaded
    /// and stays current, and the load error is returned.
    ///
    /// # Panics
    ///
    /// Panics if reloading the running state fails too; the machine would
    /// otherwise hold a mix of both states.
    pub fn switch_to(&mut self, id: StateId) -> Result<(), SimError> {
        if id == self.current {
            return Ok(());
        }
        if !self.states.contains_key(&id) {
            return Err(SimError::UnknownState(id));
        }

        let entry = running(&mut self.states, self.current);
        self.engine.capture(&mut entry.state);

        let target = self.states.get(&id).ok_or(SimError::UnknownState(id))?;
        if let Err(e) = self.engine.restore(&target.state) {
            warn!("Restoring {id} failed ({e}); reloading {}", self.current);
            let back = running(&mut self.states, self.current);
            if let Err(again) = self.engine.restore(&back.state) {
                panic!("state {} cannot be reloaded after a failed switch: {again}", self.current);
            }
            return Err(e.into());
        }
        debug!("Switched {} -> {id}", self.current);
        self.current = id;
        Ok(())
    }

    /// Drop a state that is not running.
    pub fn destroy(&mut self, id: StateId) -> Result<(), SimError> {
        if id == self.current {
            return Err(SimError::DestroyCurrent(id));
        }
        self.states
            .remove(&id)
            .map(|_| debug!("Destroyed {id}"))
            .ok_or(SimError::UnknownState(id))
    }

    /// Write whole sectors through the running state's disk view.
    pub fn write_disk(&mut self, sector: u64, buf: &[u8]) -> Result<(), SimError> {
        let entry = running(&mut self.states, self.current);
        self.engine
            .disk(&mut entry.state, &self.disk, &mut self.backing)
            .write(sector, buf)?;
        Ok(())
    }

    /// Read whole sectors through the running state's disk view.
    pub fn read_disk(&mut self, sector: u64, buf: &mut [u8]) -> Result<(), SimError> {
        let entry = running(&mut self.states, self.current);
        self.engine
            .disk(&mut entry.state, &self.disk, &mut self.backing)
            .read(sector, buf)?;
        Ok(())
    }

    /// Digest of the per-state devices as they are in the machine now.
    pub fn fingerprint(&self) -> u64 {
        self.engine
            .machine()
            .fingerprint_of(self.engine.devices().iter().map(|d| d.id()))
    }
}

fn running(states: &mut BTreeMap<StateId, Entry>, current: StateId) -> &mut Entry {
    match states.get_mut(&current) {
        Some(entry) => entry,
        None => panic!("running state {current} missing from the pool"),
    }
}
