//! Pure functions for positional byte-store arithmetic.
//!
//! # Mapping to `stream.rs`
//!
//! | Function                | Used by                                   |
//! |-------------------------|-------------------------------------------|
//! | [`staging_target_len`]  | `StagingBuffer::put()`                    |
//! | [`clamp_copy_len`]      | `StateBuffer::get()`                      |
//! | [`put_range`]           | `StagingBuffer::put()`, `StateBuffer::put()` |

use std::ops::Range;

// ─── Staging growth ─────────────────────────────────────────────────

/// Length the staging buffer must have after a `put` of `len` bytes at
/// `pos`, given its current length `current`.
///
/// The buffer is grow-only: the result is never smaller than `current`, and
/// a write that already fits returns `current` unchanged (no reallocation).
///
/// # Panics
///
/// Panics if `pos + len` overflows `usize`; a device stream that addresses
/// past the end of the address space is corrupt.
pub fn staging_target_len(current: usize, pos: u64, len: usize) -> usize {
    let end = put_range(pos, len).end;
    let result = current.max(end);

    // Postcondition: grow-only, and large enough for the write.
    debug_assert!(result >= current, "staging buffer must never shrink");
    debug_assert!(result >= end, "staging buffer must cover the write");

    result
}

// ─── Read clamping ──────────────────────────────────────────────────

/// Number of bytes a `get` of `requested` bytes at `pos` may copy from a
/// buffer of `size` bytes.
///
/// Reads that would overrun are clamped to `size - pos`; reads starting at
/// or beyond the end copy nothing.
///
/// # Examples
///
/// ```rust
/// use devshadow::verified::stream::clamp_copy_len;
///
/// assert_eq!(clamp_copy_len(100, 10, 20), 20);
/// assert_eq!(clamp_copy_len(100, 90, 20), 10);
/// assert_eq!(clamp_copy_len(100, 120, 4), 0);
/// ```
pub fn clamp_copy_len(size: usize, pos: u64, requested: usize) -> usize {
    let result = match usize::try_from(pos) {
        Ok(start) if start < size => requested.min(size - start),
        _ => 0,
    };

    // Postcondition: never more than requested, never past the end.
    debug_assert!(result <= requested);
    debug_assert!(result == 0 || (pos as usize) + result <= size);

    result
}

// ─── Ranges ─────────────────────────────────────────────────────────

/// Byte range `[pos, pos + len)` as `usize` indices.
///
/// # Panics
///
/// Panics if the range does not fit in `usize`.
pub fn put_range(pos: u64, len: usize) -> Range<usize> {
    let start = usize::try_from(pos)
        .unwrap_or_else(|_| panic!("stream offset {pos:#x} exceeds the address space"));
    let end = start
        .checked_add(len)
        .unwrap_or_else(|| panic!("stream write of {len} bytes at {pos:#x} overflows"));
    start..end
}

// ─── Tests ───────────────────────────────────────────────────────────
