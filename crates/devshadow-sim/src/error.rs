//! Error type for the simulation harness.

use crate::pool::StateId;
use devshadow::{BlockError, ConfigError, DeviceError};
use thiserror::Error;

/// Errors from driving the simulated machine.
#[derive(Error, Debug)]
pub enum SimError {
    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    #[error("block error: {0}")]
    Block(#[from] BlockError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to read disk image {path}: {source}")]
    Image {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no such state: {0}")]
    UnknownState(StateId),

    #[error("cannot destroy the running state {0}")]
    DestroyCurrent(StateId),
}
