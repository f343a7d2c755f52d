//! Copy-on-write object store backing the shadow sector overlay.
//!
//! [`ObjectStore`] is the seam to whatever memory/object subsystem the
//! host provides.  [`OverlayStore`] is the implementation shipped here: a
//! stack of frozen, shared layers with a private writable layer on top.
//!
//! ```text
//!   state A            state B
//!   local {s3}         local {s9}
//!       \                 /
//!        +--- layer {s1, s2} ---+   (Arc, shared, immutable)
//!                  |
//!             layer {s0}
//! ```
//!
//! Forking freezes the current local layer into a new shared layer that
//! both the parent and the child sit on top of.  Lookups walk from the
//! local layer down; the first hit wins.  `get_writeable` copies a shared
//! object into the local layer before handing out `&mut`.

use std::collections::{BTreeMap, BTreeSet};
use std::mem;
use std::sync::Arc;

/// Layers are flattened once a chain grows past this depth.
pub const MAX_LAYER_DEPTH: usize = 32;

/// A fixed-size byte object bound at an address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SectorObject {
    address: u64,
    bytes: Box<[u8]>,
}

impl SectorObject {
    /// Zero-filled object of `size` bytes at `address`.
    pub fn zeroed(address: u64, size: usize) -> Self {
        Self {
            address,
            bytes: vec![0u8; size].into_boxed_slice(),
        }
    }

    pub fn address(&self) -> u64 {
        self.address
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Whether `address` falls inside this object.
    pub fn contains(&self, address: u64) -> bool {
        address >= self.address && address - self.address < self.bytes.len() as u64
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

/// Address-keyed object bindings with copy-on-write forking.
pub trait ObjectStore {
    /// Object covering `address`, if one is bound.
    fn find_object(&self, address: u64) -> Option<&SectorObject>;

    /// Bind `object` at its address in this store only.
    fn bind_object(&mut self, object: SectorObject);

    /// Private, mutable copy of the object covering `address`.
    ///
    /// An object shared with other stores is copied first; the other
    /// stores keep seeing the original.
    fn get_writeable(&mut self, address: u64) -> Option<&mut SectorObject>;

    /// Split off a store that starts with the same bindings.
    ///
    /// Afterwards neither store observes the other's changes.
    fn fork(&mut self) -> Self
    where
        Self: Sized;
}

#[derive(Debug)]
struct Layer {
    objects: BTreeMap<u64, SectorObject>,
    parent: Option<Arc<Layer>>,
}

/// Layered copy-on-write implementation of [`ObjectStore`].
#[derive(Debug, Default)]
pub struct OverlayStore {
    local: BTreeMap<u64, SectorObject>,
    parent: Option<Arc<Layer>>,
}

impl OverlayStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frozen layers beneath the local one.
    pub fn depth(&self) -> usize {
        self.layers().count()
    }

    /// Distinct objects visible through this store.
    pub fn visible_len(&self) -> usize {
        let mut addresses: BTreeSet<u64> = self.local.keys().copied().collect();
        for layer in self.layers() {
            addresses.extend(layer.objects.keys().copied());
        }
        addresses.len()
    }

    fn layers(&self) -> impl Iterator<Item = &Layer> {
        std::iter::successors(self.parent.as_deref(), |layer| layer.parent.as_deref())
    }

    fn find_shared(&self, address: u64) -> Option<&SectorObject> {
        self.layers().find_map(|layer| lookup(&layer.objects, address))
    }

    /// Merge every frozen layer into one, newest bindings winning.
    fn compact(&mut self) {
        let mut chain: Vec<&Layer> = self.layers().collect();
        chain.reverse();

        let mut objects = BTreeMap::new();
        for layer in chain {
            for (address, object) in &layer.objects {
                objects.insert(*address, object.clone());
            }
        }
        self.parent = Some(Arc::new(Layer {
            objects,
            parent: None,
        }));
    }
}

impl ObjectStore for OverlayStore {
    fn find_object(&self, address: u64) -> Option<&SectorObject> {
        lookup(&self.local, address).or_else(|| self.find_shared(address))
    }

    fn bind_object(&mut self, object: SectorObject) {
        debug_assert!(
            lookup(&self.local, object.address()).is_none(),
            "object bound twice at {:#x}",
            object.address()
        );
        self.local.insert(object.address(), object);
    }

    fn get_writeable(&mut self, address: u64) -> Option<&mut SectorObject> {
        let key = match lookup(&self.local, address) {
            Some(object) => object.address(),
            None => {
                let copy = self.find_shared(address)?.clone();
                let key = copy.address();
                self.local.insert(key, copy);
                key
            }
        };
        self.local.get_mut(&key)
    }

    fn fork(&mut self) -> Self {
        if !self.local.is_empty() {
            let frozen = Layer {
                objects: mem::take(&mut self.local),
                parent: self.parent.take(),
            };
            self.parent = Some(Arc::new(frozen));
        }
        if self.depth() > MAX_LAYER_DEPTH {
            self.compact();
        }
        Self {
            local: BTreeMap::new(),
            parent: self.parent.clone(),
        }
    }
}

/// Object in `objects` whose range covers `address`.
fn lookup(objects: &BTreeMap<u64, SectorObject>, address: u64) -> Option<&SectorObject> {
    objects
        .range(..=address)
        .next_back()
        .map(|(_, object)| object)
        .filter(|object| object.contains(address))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bind(store: &mut OverlayStore, address: u64, fill: u8) {
        let mut object = SectorObject::zeroed(address, 16);
        object.bytes_mut().fill(fill);
        store.bind_object(object);
    }

    fn byte_at(store: &OverlayStore, address: u64) -> Option<u8> {
        store.find_object(address).map(|o| o.bytes()[0])
    }

    #[test]
    fn find_covers_object_range() {
        let mut store = OverlayStore::new();
        bind(&mut store, 32, 1);

        assert!(store.find_object(32).is_some());
        assert!(store.find_object(47).is_some());
        assert!(store.find_object(48).is_none());
        assert!(store.find_object(31).is_none());
    }

    #[test]
    fn fork_shares_existing_bindings() {
        let mut parent = OverlayStore::new();
        bind(&mut parent, 0, 0xAA);

        let child = parent.fork();
        assert_eq!(byte_at(&child, 0), Some(0xAA));
        assert_eq!(byte_at(&parent, 0), Some(0xAA));
        assert_eq!(parent.depth(), 1);
        assert_eq!(child.depth(), 1);
    }

    #[test]
    fn writes_after_fork_are_private() {
        let mut parent = OverlayStore::new();
        bind(&mut parent, 0, 0xAA);
        let mut child = parent.fork();

        child.get_writeable(0).unwrap().bytes_mut().fill(0xCC);
        bind(&mut child, 16, 0xDD);

        assert_eq!(byte_at(&child, 0), Some(0xCC));
        assert_eq!(byte_at(&parent, 0), Some(0xAA));
        assert_eq!(byte_at(&parent, 16), None);

        parent.get_writeable(0).unwrap().bytes_mut().fill(0xEE);
        assert_eq!(byte_at(&child, 0), Some(0xCC));
    }

    #[test]
    fn get_writeable_missing_is_none() {
        let mut store = OverlayStore::new();
        assert!(store.get_writeable(0).is_none());
    }

    #[test]
    fn copy_on_write_moves_object_local() {
        let mut parent = OverlayStore::new();
        bind(&mut parent, 0, 1);
        let mut child = parent.fork();

        child.get_writeable(8).unwrap().bytes_mut().fill(2);
        assert_eq!(child.visible_len(), 1);
        assert_eq!(byte_at(&child, 0), Some(2));
        assert_eq!(byte_at(&parent, 0), Some(1));
    }

    #[test]
    fn deep_fork_chains_are_compacted() {
        let mut store = OverlayStore::new();
        for i in 0..(MAX_LAYER_DEPTH as u64 + 8) {
            bind(&mut store, i * 16, i as u8);
            let _sibling = store.fork();
        }
        assert!(store.depth() <= MAX_LAYER_DEPTH);
        for i in 0..(MAX_LAYER_DEPTH as u64 + 8) {
            assert_eq!(byte_at(&store, i * 16), Some(i as u8));
        }
    }

    #[test]
    fn compaction_keeps_newest_binding() {
        let mut store = OverlayStore::new();
        bind(&mut store, 0, 1);
        let _ = store.fork();
        store.get_writeable(0).unwrap().bytes_mut().fill(2);
        for i in 1..=MAX_LAYER_DEPTH as u64 {
            bind(&mut store, i * 16, 0);
            let _ = store.fork();
        }
        assert!(store.depth() < MAX_LAYER_DEPTH);
        assert_eq!(byte_at(&store, 0), Some(2));
    }
}
