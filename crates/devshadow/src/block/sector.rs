//! Per-state shadow sector store.
//!
//! Sectors a state has written live as [`SECTOR_SIZE`] objects in the
//! state's own [`ObjectStore`].  Sectors it never wrote have no entry; a
//! read stops at the first such sector so the caller can fall through to
//! the shared backing medium.

use super::object_store::{ObjectStore, OverlayStore, SectorObject};
use super::SECTOR_SIZE;
use crate::verified::block::{shadow_address, whole_sectors};

#[derive(Debug, Default)]
pub struct ShadowSectorStore<S = OverlayStore> {
    objects: S,
}

impl<S: ObjectStore> ShadowSectorStore<S> {
    pub fn new(objects: S) -> Self {
        Self { objects }
    }

    /// Overwrite `buf.len() / SECTOR_SIZE` sectors starting at `sector` in
    /// the region at `base`.  Returns the number of sectors written, which
    /// is always all of them.
    ///
    /// # Panics
    ///
    /// Panics if `buf` is not a whole number of sectors.
    pub fn write(&mut self, base: u64, sector: u64, buf: &[u8]) -> usize {
        let count = whole_sectors(buf.len());
        for (i, chunk) in buf.chunks_exact(SECTOR_SIZE).enumerate() {
            let address = shadow_address(base, sector.saturating_add(i as u64));
            if self.objects.find_object(address).is_none() {
                self.objects
                    .bind_object(SectorObject::zeroed(address, SECTOR_SIZE));
            }
            match self.objects.get_writeable(address) {
                Some(object) => object.bytes_mut().copy_from_slice(chunk),
                None => panic!("object store lost the sector bound at {address:#x}"),
            }
        }
        count
    }

    /// Copy consecutive privately written sectors into `buf`, stopping at
    /// the first sector this state never wrote.
    ///
    /// Returns how many sectors were copied.  A count below
    /// `buf.len() / SECTOR_SIZE` is not an error; the remaining sectors
    /// must come from the backing medium.
    pub fn read(&self, base: u64, sector: u64, buf: &mut [u8]) -> usize {
        whole_sectors(buf.len());
        let mut read = 0;
        for (i, chunk) in buf.chunks_exact_mut(SECTOR_SIZE).enumerate() {
            let address = shadow_address(base, sector.saturating_add(i as u64));
            let Some(object) = self.objects.find_object(address) else {
                break;
            };
            chunk.copy_from_slice(object.bytes());
            read += 1;
        }
        read
    }

    /// Whether this state has its own copy of `sector`.
    pub fn contains(&self, base: u64, sector: u64) -> bool {
        self.objects
            .find_object(shadow_address(base, sector))
            .is_some()
    }

    /// Copy-on-write split, see [`ObjectStore::fork`].
    pub fn fork(&mut self) -> Self {
        Self {
            objects: self.objects.fork(),
        }
    }

    pub fn objects(&self) -> &S {
        &self.objects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verified::block::slot_base;

    fn sectors(fills: &[u8]) -> Vec<u8> {
        fills
            .iter()
            .flat_map(|&b| std::iter::repeat(b).take(SECTOR_SIZE))
            .collect()
    }

    #[test]
    fn write_then_read_same_range() {
        let mut store = ShadowSectorStore::<OverlayStore>::default();
        let data = sectors(&[1, 2, 3]);
        assert_eq!(store.write(0, 10, &data), 3);

        let mut out = vec![0u8; data.len()];
        assert_eq!(store.read(0, 10, &mut out), 3);
        assert_eq!(out, data);
    }

    #[test]
    fn fresh_store_reads_nothing() {
        let store = ShadowSectorStore::<OverlayStore>::default();
        let mut out = vec![0xEE; 4 * SECTOR_SIZE];
        assert_eq!(store.read(0, 0, &mut out), 0);
        assert!(out.iter().all(|&b| b == 0xEE));
    }

    #[test]
    fn read_stops_at_first_gap() {
        let mut store = ShadowSectorStore::<OverlayStore>::default();
        store.write(0, 0, &sectors(&[1, 2]));
        store.write(0, 3, &sectors(&[4]));

        let mut out = vec![0u8; 4 * SECTOR_SIZE];
        assert_eq!(store.read(0, 0, &mut out), 2);
        assert_eq!(&out[..2 * SECTOR_SIZE], &sectors(&[1, 2])[..]);
        assert!(out[2 * SECTOR_SIZE..].iter().all(|&b| b == 0));
    }

    #[test]
    fn overwrite_replaces_sector() {
        let mut store = ShadowSectorStore::<OverlayStore>::default();
        store.write(0, 5, &sectors(&[1]));
        store.write(0, 5, &sectors(&[9]));

        let mut out = vec![0u8; SECTOR_SIZE];
        store.read(0, 5, &mut out);
        assert_eq!(out, sectors(&[9]));
        assert_eq!(store.objects().visible_len(), 1);
    }

    #[test]
    fn device_regions_do_not_alias() {
        let mut store = ShadowSectorStore::<OverlayStore>::default();
        store.write(slot_base(0), 0, &sectors(&[1]));

        assert!(store.contains(slot_base(0), 0));
        assert!(!store.contains(slot_base(1), 0));
    }

    #[test]
    fn forked_stores_are_isolated() {
        let mut parent = ShadowSectorStore::<OverlayStore>::default();
        parent.write(0, 0, &sectors(&[1]));

        let mut child = parent.fork();
        child.write(0, 0, &sectors(&[2]));
        child.write(0, 1, &sectors(&[3]));

        let mut out = vec![0u8; 2 * SECTOR_SIZE];
        assert_eq!(parent.read(0, 0, &mut out), 1);
        assert_eq!(&out[..SECTOR_SIZE], &sectors(&[1])[..]);

        assert_eq!(child.read(0, 0, &mut out), 2);
        assert_eq!(out, sectors(&[2, 3]));
    }

    #[test]
    #[should_panic(expected = "not a multiple")]
    fn partial_sector_write_panics() {
        let mut store = ShadowSectorStore::<OverlayStore>::default();
        store.write(0, 0, &[0u8; 100]);
    }
}
