//! Pure functions for shadow address arithmetic and backing-medium bounds.
//!
//! Every function in this module is:
//! - **Pure**: no I/O, no side effects beyond the return value.
//! - **Deterministic**: same inputs always produce the same outputs.
//! - **Assertion-guarded**: `debug_assert!` postconditions on every
//!   non-trivial function.
//!
//! # Mapping to `block/`
//!
//! | Function             | Used by                                      |
//! |----------------------|----------------------------------------------|
//! | [`slot_base`]        | `SlotAllocator::base_address_of()`           |
//! | [`shadow_address`]   | `ShadowSectorStore::write()` / `read()`      |
//! | [`whole_sectors`]    | every sector-granular entry point            |
//! | [`check_bounds`]     | `MemoryImage::read_sectors()` / `write_sectors()` |

use crate::block::{BlockError, ADDRESS_SPACE_PER_DEVICE, MAX_SECTORS_PER_DEVICE, SECTOR_SIZE};

// ─── Shadow addresses ───────────────────────────────────────────────

/// Base of `slot`'s region in the flat shadow address space.
///
/// # Panics
///
/// Panics if the slot's region does not fit in `u64`.
pub fn slot_base(slot: u32) -> u64 {
    let base = u64::from(slot)
        .checked_mul(ADDRESS_SPACE_PER_DEVICE)
        .unwrap_or_else(|| panic!("block device slot {slot} exhausts the shadow address space"));

    debug_assert_eq!(base % ADDRESS_SPACE_PER_DEVICE, 0);
    base
}

/// Shadow address of `sector` inside the region starting at `base`.
///
/// # Panics
///
/// Panics if `sector` is beyond [`MAX_SECTORS_PER_DEVICE`]; such an address
/// would land in the next device's region.
pub fn shadow_address(base: u64, sector: u64) -> u64 {
    assert!(
        sector < MAX_SECTORS_PER_DEVICE,
        "sector {sector} exceeds the per-device shadow region"
    );
    let address = base + sector * SECTOR_SIZE as u64;

    // Postcondition: the address stays inside this device's region.
    debug_assert!(address >= base);
    debug_assert!(address - base < ADDRESS_SPACE_PER_DEVICE);
    debug_assert_eq!((address - base) % SECTOR_SIZE as u64, 0);

    address
}

/// Number of whole sectors in a buffer of `len` bytes.
///
/// # Panics
///
/// Panics if `len` is not a multiple of [`SECTOR_SIZE`]; partial-sector
/// I/O is not supported.
pub fn whole_sectors(len: usize) -> usize {
    assert!(
        len % SECTOR_SIZE == 0,
        "sector buffer of {len} bytes is not a multiple of {SECTOR_SIZE}"
    );
    len / SECTOR_SIZE
}

// ─── Bounds checking ────────────────────────────────────────────────

/// Check whether a byte range `[offset, offset+len)` fits within a
/// medium of `device_size` bytes.
///
/// Uses saturating addition so that `offset + len` overflowing `u64` is
/// reported as out of bounds rather than wrapping.
pub fn check_bounds(device_size: u64, offset: u64, len: u64) -> Result<(), BlockError> {
    if offset.saturating_add(len) > device_size {
        return Err(BlockError::OutOfBounds {
            offset,
            len,
            device_size,
        });
    }

    debug_assert!(
        offset.saturating_add(len) <= device_size,
        "check_bounds: Ok result requires range to be in bounds"
    );

    Ok(())
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_bases_are_disjoint() {
        assert_eq!(slot_base(0), 0);
        assert_eq!(slot_base(1), ADDRESS_SPACE_PER_DEVICE);
        assert_eq!(slot_base(3), 3 * ADDRESS_SPACE_PER_DEVICE);
    }

    #[test]
    fn shadow_address_layout() {
        let base = slot_base(2);
        assert_eq!(shadow_address(base, 0), base);
        assert_eq!(shadow_address(base, 7), base + 7 * SECTOR_SIZE as u64);
    }

    #[test]
    fn last_sector_stays_in_region() {
        let base = slot_base(0);
        let last = shadow_address(base, MAX_SECTORS_PER_DEVICE - 1);
        assert!(last + (SECTOR_SIZE as u64) <= slot_base(1));
    }

    #[test]
    #[should_panic(expected = "exceeds the per-device shadow region")]
    fn sector_past_region_panics() {
        shadow_address(0, MAX_SECTORS_PER_DEVICE);
    }

    #[test]
    fn whole_sector_counts() {
        assert_eq!(whole_sectors(0), 0);
        assert_eq!(whole_sectors(SECTOR_SIZE), 1);
        assert_eq!(whole_sectors(4 * SECTOR_SIZE), 4);
    }

    #[test]
    #[should_panic(expected = "not a multiple")]
    fn partial_sector_panics() {
        whole_sectors(SECTOR_SIZE + 1);
    }

    #[test]
    fn bounds_ok_exact_fit() {
        assert!(check_bounds(1024, 0, 1024).is_ok());
        assert!(check_bounds(1024, 1024, 0).is_ok());
    }

    #[test]
    fn bounds_err_one_past_end() {
        let err = check_bounds(1024, 512, 513).unwrap_err();
        assert!(matches!(
            err,
            BlockError::OutOfBounds {
                offset: 512,
                len: 513,
                device_size: 1024
            }
        ));
    }

    #[test]
    fn bounds_err_overflow_saturates() {
        assert!(check_bounds(1024, u64::MAX, 1).is_err());
    }
}
