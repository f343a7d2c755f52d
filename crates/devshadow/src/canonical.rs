//! The canonical device image and the one-time staging → frozen transition.

use crate::stream::{StagingBuffer, StateBuffer};
use log::info;
use std::sync::Arc;

/// Immutable baseline serialization of every registered device.
///
/// Cloning is cheap; all clones share the same bytes.  There is no API
/// that mutates or resizes an image once it exists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CanonicalImage {
    bytes: Arc<[u8]>,
}

impl CanonicalImage {
    /// The finalized size every state buffer must have.
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// A fresh state buffer holding a private copy of this image.
    pub fn instantiate(&self) -> StateBuffer {
        StateBuffer::from_bytes(&self.bytes)
    }
}

/// Where captures go: the staging buffer until the first capture
/// completes, the frozen canonical image afterwards.
#[derive(Debug)]
pub enum Baseline {
    Staging(StagingBuffer),
    Frozen(CanonicalImage),
}

impl Default for Baseline {
    fn default() -> Self {
        Baseline::Staging(StagingBuffer::new())
    }
}

impl Baseline {
    pub fn canonical(&self) -> Option<&CanonicalImage> {
        match self {
            Baseline::Staging(_) => None,
            Baseline::Frozen(image) => Some(image),
        }
    }

    /// Finalized size, once frozen.
    pub fn finalized_size(&self) -> Option<usize> {
        self.canonical().map(CanonicalImage::size)
    }

    /// Move the staging bytes into a shared, immutable canonical image.
    ///
    /// # Panics
    ///
    /// Panics if called twice.  Finalization is a one-time event; a second
    /// attempt means the caller has lost track of engine state.
    pub fn freeze(&mut self) -> &CanonicalImage {
        let staging = match std::mem::take(self) {
            Baseline::Staging(staging) => staging,
            Baseline::Frozen(_) => panic!("canonical image finalized twice"),
        };

        let image = CanonicalImage {
            bytes: Arc::from(staging.into_bytes()),
        };
        info!("Canonical device image finalized: {} bytes", image.size());

        *self = Baseline::Frozen(image);
        match self {
            Baseline::Frozen(image) => image,
            Baseline::Staging(_) => unreachable!(),
        }
    }
}
