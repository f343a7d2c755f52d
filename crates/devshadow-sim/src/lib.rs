//! Deterministic toy machine and state pool for the devshadow engine.
//!
//! - [`devices`]: simulated peripherals with fixed-size save formats
//! - [`machine`]: [`SimMachine`], the emulator side of [`devshadow::Machine`]
//! - [`pool`]: [`StatePool`], fork/switch/destroy over execution states
//!
//! # Example
//!
//! ```
//! use devshadow::{EngineConfig, MemoryImage};
//! use devshadow_sim::{SimMachine, StatePool};
//!
//! let mut pool = StatePool::new(SimMachine::standard(42), EngineConfig::default(), MemoryImage::new(8));
//! pool.step(4);
//! let before = pool.fingerprint();
//! let branch = pool.fork();
//!
//! pool.step(10);
//! pool.switch_to(branch).unwrap();
//! assert_eq!(pool.fingerprint(), before);
//! ```

pub mod devices;
pub mod error;
pub mod machine;
pub mod pool;

pub use error::SimError;
pub use machine::SimMachine;
pub use pool::{StateId, StatePool};
