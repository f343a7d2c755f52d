//! Disk facade that applies the durability policy to block I/O.

use super::backing::BackingMedium;
use super::object_store::ObjectStore;
use super::sector::ShadowSectorStore;
use super::{BlockError, SECTOR_SIZE};
use crate::verified::block::{check_bounds, whole_sectors};

/// Where block writes go.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiskPolicy {
    /// Writes stay in the writing state's overlay and vanish with it.
    Ephemeral,
    /// Writes go straight to the shared medium, visible to every state.
    Persistent,
}

impl DiskPolicy {
    pub fn from_persistent_flag(persistent: bool) -> Self {
        if persistent {
            DiskPolicy::Persistent
        } else {
            DiskPolicy::Ephemeral
        }
    }
}

/// One state's view of one block device.
///
/// Built by [`SnapshotEngine::disk`](crate::engine::SnapshotEngine::disk).
pub struct ShadowDisk<'a, S, B: ?Sized> {
    policy: DiskPolicy,
    base: u64,
    overlay: &'a mut ShadowSectorStore<S>,
    backing: &'a mut B,
}

impl<'a, S: ObjectStore, B: BackingMedium + ?Sized> ShadowDisk<'a, S, B> {
    pub(crate) fn new(
        policy: DiskPolicy,
        base: u64,
        overlay: &'a mut ShadowSectorStore<S>,
        backing: &'a mut B,
    ) -> Self {
        Self {
            policy,
            base,
            overlay,
            backing,
        }
    }

    pub fn policy(&self) -> DiskPolicy {
        self.policy
    }

    /// Read whole sectors starting at `sector`.
    ///
    /// Under [`DiskPolicy::Ephemeral`] each sector comes from the overlay
    /// if this state wrote it, otherwise from the backing medium.
    pub fn read(&mut self, sector: u64, buf: &mut [u8]) -> Result<(), BlockError> {
        if self.policy == DiskPolicy::Persistent {
            return self.backing.read_sectors(sector, buf);
        }
        self.check_range(sector, buf.len())?;

        let total = whole_sectors(buf.len());
        let mut done = 0;
        while done < total {
            let rest = &mut buf[done * SECTOR_SIZE..];
            done += self.overlay.read(self.base, sector + done as u64, rest);
            if done < total {
                let gap = &mut buf[done * SECTOR_SIZE..(done + 1) * SECTOR_SIZE];
                self.backing.read_sectors(sector + done as u64, gap)?;
                done += 1;
            }
        }
        Ok(())
    }

    /// Write whole sectors starting at `sector`.
    pub fn write(&mut self, sector: u64, buf: &[u8]) -> Result<(), BlockError> {
        if self.policy == DiskPolicy::Persistent {
            return self.backing.write_sectors(sector, buf);
        }
        self.check_range(sector, buf.len())?;
        self.overlay.write(self.base, sector, buf);
        Ok(())
    }

    fn check_range(&self, sector: u64, len: usize) -> Result<(), BlockError> {
        whole_sectors(len);
        let size = self.backing.sector_count().saturating_mul(SECTOR_SIZE as u64);
        check_bounds(size, sector.saturating_mul(SECTOR_SIZE as u64), len as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::backing::MemoryImage;
    use crate::block::object_store::OverlayStore;

    fn sectors(fills: &[u8]) -> Vec<u8> {
        fills
            .iter()
            .flat_map(|&b| std::iter::repeat(b).take(SECTOR_SIZE))
            .collect()
    }

    fn image(fills: &[u8]) -> MemoryImage {
        MemoryImage::from_image(sectors(fills)).unwrap()
    }

    #[test]
    fn policy_from_flag() {
        assert_eq!(DiskPolicy::from_persistent_flag(false), DiskPolicy::Ephemeral);
        assert_eq!(DiskPolicy::from_persistent_flag(true), DiskPolicy::Persistent);
    }

    #[test]
    fn ephemeral_write_leaves_backing_untouched() {
        let mut backing = image(&[0xA0, 0xA1, 0xA2]);
        let mut overlay = ShadowSectorStore::<OverlayStore>::default();
        let mut disk = ShadowDisk::new(DiskPolicy::Ephemeral, 0, &mut overlay, &mut backing);

        disk.write(1, &sectors(&[0xFF])).unwrap();

        let mut out = vec![0u8; 3 * SECTOR_SIZE];
        disk.read(0, &mut out).unwrap();
        assert_eq!(out, sectors(&[0xA0, 0xFF, 0xA2]));

        assert_eq!(backing.as_bytes(), &sectors(&[0xA0, 0xA1, 0xA2])[..]);
        assert_eq!(backing.stats().writes, 0);
    }

    #[test]
    fn ephemeral_read_fills_every_gap() {
        let mut backing = image(&[1, 2, 3, 4, 5]);
        let mut overlay = ShadowSectorStore::<OverlayStore>::default();
        let mut disk = ShadowDisk::new(DiskPolicy::Ephemeral, 0, &mut overlay, &mut backing);

        disk.write(0, &sectors(&[10])).unwrap();
        disk.write(2, &sectors(&[30, 40])).unwrap();

        let mut out = vec![0u8; 5 * SECTOR_SIZE];
        disk.read(0, &mut out).unwrap();
        assert_eq!(out, sectors(&[10, 2, 30, 40, 5]));
    }

    #[test]
    fn persistent_goes_to_backing() {
        let mut backing = image(&[0, 0]);
        let mut overlay = ShadowSectorStore::<OverlayStore>::default();
        let mut disk = ShadowDisk::new(DiskPolicy::Persistent, 0, &mut overlay, &mut backing);
        assert_eq!(disk.policy(), DiskPolicy::Persistent);

        disk.write(1, &sectors(&[7])).unwrap();

        assert_eq!(backing.as_bytes(), &sectors(&[0, 7])[..]);
        assert_eq!(overlay.objects().visible_len(), 0);
    }

    #[test]
    fn ephemeral_rejects_out_of_range() {
        let mut backing = image(&[0, 0]);
        let mut overlay = ShadowSectorStore::<OverlayStore>::default();
        let mut disk = ShadowDisk::new(DiskPolicy::Ephemeral, 0, &mut overlay, &mut backing);

        let err = disk.write(2, &sectors(&[1])).unwrap_err();
        assert!(matches!(err, BlockError::OutOfBounds { .. }));

        let mut out = vec![0u8; 2 * SECTOR_SIZE];
        assert!(disk.read(1, &mut out).is_err());
    }
}
