//! Pure arithmetic helpers shared by the engine.
//!
//! Each sub-module holds only functions with **no I/O and no state
//! mutation**: values in, values out.  The effectful code in
//! [`crate::stream`] and [`crate::block`] delegates its offset and address
//! arithmetic here so that every boundary computation lives in one place and
//! can be tested exhaustively on its own.
//!
//! Functions carry `debug_assert!` postconditions in the style of the rest
//! of the crate.

pub mod block;
pub mod stream;
