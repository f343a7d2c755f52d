//! Real backing media for block devices.
//!
//! The shadow overlay only holds sectors a state has written.  Everything
//! else comes from a [`BackingMedium`], shared by all states.
//! [`MemoryImage`] is a raw sector image held in memory.

use super::{BlockError, SECTOR_SIZE};
use crate::verified::block::{check_bounds, whole_sectors};

/// Magic at the start of a qcow/qcow2 image.
pub const QCOW_MAGIC: [u8; 4] = *b"QFI\xfb";

/// Sector-addressed storage shared by every execution state.
pub trait BackingMedium {
    /// Size of the medium in sectors.
    fn sector_count(&self) -> u64;

    /// Fill `buf` (a whole number of sectors) starting at `sector`.
    fn read_sectors(&mut self, sector: u64, buf: &mut [u8]) -> Result<(), BlockError>;

    /// Store `buf` (a whole number of sectors) starting at `sector`.
    fn write_sectors(&mut self, sector: u64, buf: &[u8]) -> Result<(), BlockError>;
}

/// Read/write statistics for a [`MemoryImage`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockStats {
    /// Number of successful read operations.
    pub reads: u64,
    /// Number of successful write operations.
    pub writes: u64,
    /// Total bytes read.
    pub bytes_read: u64,
    /// Total bytes written.
    pub bytes_written: u64,
}

/// An in-memory raw disk image.
///
/// # Examples
///
/// ```
/// use devshadow::block::backing::{BackingMedium, MemoryImage};
/// use devshadow::block::SECTOR_SIZE;
///
/// let mut disk = MemoryImage::new(8);
/// disk.write_sectors(0, &[0xAA; SECTOR_SIZE]).unwrap();
///
/// let mut buf = [0u8; SECTOR_SIZE];
/// disk.read_sectors(0, &mut buf).unwrap();
/// assert_eq!(buf, [0xAA; SECTOR_SIZE]);
/// ```
#[derive(Clone, Debug)]
pub struct MemoryImage {
    data: Vec<u8>,
    stats: BlockStats,
}

impl MemoryImage {
    /// Zero-filled image of `sectors` sectors.
    pub fn new(sectors: u64) -> Self {
        Self {
            data: vec![0u8; sectors as usize * SECTOR_SIZE],
            stats: BlockStats::default(),
        }
    }

    /// Wrap an existing raw image.
    ///
    /// Rejects qcow images and images that are not a whole number of
    /// sectors; only raw images can be shadowed sector by sector.
    pub fn from_image(data: Vec<u8>) -> Result<Self, BlockError> {
        check_raw_image(&data)?;
        Ok(Self {
            data,
            stats: BlockStats::default(),
        })
    }

    /// Size of the image in bytes.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Current I/O statistics.
    pub fn stats(&self) -> &BlockStats {
        &self.stats
    }

    fn byte_range(&self, sector: u64, len: usize) -> Result<std::ops::Range<usize>, BlockError> {
        whole_sectors(len);
        let offset = sector.saturating_mul(SECTOR_SIZE as u64);
        check_bounds(self.size(), offset, len as u64)?;
        let start = offset as usize;
        Ok(start..start + len)
    }
}

impl BackingMedium for MemoryImage {
    fn sector_count(&self) -> u64 {
        self.size() / SECTOR_SIZE as u64
    }

    fn read_sectors(&mut self, sector: u64, buf: &mut [u8]) -> Result<(), BlockError> {
        let range = self.byte_range(sector, buf.len())?;
        buf.copy_from_slice(&self.data[range]);
        self.stats.reads += 1;
        self.stats.bytes_read += buf.len() as u64;
        Ok(())
    }

    fn write_sectors(&mut self, sector: u64, buf: &[u8]) -> Result<(), BlockError> {
        let range = self.byte_range(sector, buf.len())?;
        self.data[range].copy_from_slice(buf);
        self.stats.writes += 1;
        self.stats.bytes_written += buf.len() as u64;
        Ok(())
    }
}

/// Accept only raw images: no qcow header, whole sectors.
pub fn check_raw_image(data: &[u8]) -> Result<(), BlockError> {
    if data.starts_with(&QCOW_MAGIC) {
        return Err(BlockError::UnsupportedFormat {
            reason: "qcow images cannot be shadowed per state; convert to raw".to_string(),
        });
    }
    if data.len() % SECTOR_SIZE != 0 {
        return Err(BlockError::UnsupportedFormat {
            reason: format!(
                "image size {} is not a multiple of {SECTOR_SIZE}",
                data.len()
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_write_roundtrip() {
        let mut disk = MemoryImage::new(4);
        let payload = vec![0x5A; 2 * SECTOR_SIZE];
        disk.write_sectors(1, &payload).unwrap();

        let mut buf = vec![0u8; 2 * SECTOR_SIZE];
        disk.read_sectors(1, &mut buf).unwrap();
        assert_eq!(buf, payload);
        assert_eq!(disk.sector_count(), 4);
    }

    #[test]
    fn from_raw_image() {
        let image = vec![0xAB; 2 * SECTOR_SIZE];
        let mut disk = MemoryImage::from_image(image.clone()).unwrap();
        let mut buf = vec![0u8; 2 * SECTOR_SIZE];
        disk.read_sectors(0, &mut buf).unwrap();
        assert_eq!(buf, image);
    }

    #[test]
    fn rejects_qcow() {
        let mut image = vec![0u8; SECTOR_SIZE];
        image[..4].copy_from_slice(&QCOW_MAGIC);
        let err = MemoryImage::from_image(image).unwrap_err();
        assert!(matches!(err, BlockError::UnsupportedFormat { .. }));
    }

    #[test]
    fn rejects_ragged_image() {
        let err = MemoryImage::from_image(vec![0u8; SECTOR_SIZE + 3]).unwrap_err();
        assert!(matches!(err, BlockError::UnsupportedFormat { .. }));
    }

    #[test]
    fn out_of_bounds_read() {
        let mut disk = MemoryImage::new(2);
        let mut buf = vec![0u8; 2 * SECTOR_SIZE];
        let err = disk.read_sectors(1, &mut buf).unwrap_err();
        assert!(matches!(err, BlockError::OutOfBounds { .. }));
    }

    #[test]
    fn out_of_bounds_write() {
        let mut disk = MemoryImage::new(2);
        let err = disk.write_sectors(u64::MAX, &[0u8; SECTOR_SIZE]).unwrap_err();
        assert!(matches!(err, BlockError::OutOfBounds { .. }));
    }

    #[test]
    fn stats_tracking() {
        let mut disk = MemoryImage::new(4);
        disk.write_sectors(0, &[1u8; SECTOR_SIZE]).unwrap();
        disk.write_sectors(1, &[2u8; 2 * SECTOR_SIZE]).unwrap();

        let mut buf = [0u8; SECTOR_SIZE];
        disk.read_sectors(0, &mut buf).unwrap();

        assert_eq!(disk.stats().writes, 2);
        assert_eq!(disk.stats().bytes_written, 3 * SECTOR_SIZE as u64);
        assert_eq!(disk.stats().reads, 1);
        assert_eq!(disk.stats().bytes_read, SECTOR_SIZE as u64);
    }
}
