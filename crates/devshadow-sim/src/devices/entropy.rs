//! Deterministic entropy source.
//!
//! A seeded ChaCha20 PRNG standing in for a hardware RNG.  Its full
//! generator position is part of the saved state, so a restored state
//! replays exactly the same random stream.

use super::{check_version, fnv1a, stream_err, SimDevice};
use devshadow::{DeviceError, SnapshotReader, SnapshotWriter};
use rand::RngCore;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

/// Serialized size: seed, stream, word position, counter.
pub const ENTROPY_STATE_LEN: usize = 32 + 8 + 16 + 8;

/// A seeded, deterministic entropy source backed by ChaCha20.
///
/// # Examples
///
/// ```
/// use devshadow_sim::devices::entropy::DeterministicEntropy;
///
/// let mut ent = DeterministicEntropy::new("rng", 42);
/// let a = ent.next_u64();
///
/// // Same seed ⇒ same output
/// let mut ent2 = DeterministicEntropy::new("rng", 42);
/// assert_eq!(a, ent2.next_u64());
/// ```
#[derive(Clone, Debug)]
pub struct DeterministicEntropy {
    id: String,
    rng: ChaCha20Rng,
    /// Total number of bytes dispensed.
    bytes_generated: u64,
}

impl DeterministicEntropy {
    /// The `u64` seed is placed in the first 8 bytes of a zeroed 256-bit key.
    pub fn new(id: impl Into<String>, seed: u64) -> Self {
        Self {
            id: id.into(),
            rng: rng_from_u64(seed),
            bytes_generated: 0,
        }
    }

    pub fn fill_bytes(&mut self, buf: &mut [u8]) {
        self.rng.fill_bytes(buf);
        self.bytes_generated += buf.len() as u64;
    }

    pub fn next_u64(&mut self) -> u64 {
        let v = self.rng.next_u64();
        self.bytes_generated += 8;
        v
    }

    pub fn bytes_generated(&self) -> u64 {
        self.bytes_generated
    }
}

impl SimDevice for DeterministicEntropy {
    fn id(&self) -> &str {
        &self.id
    }

    fn save(&self, out: &mut SnapshotWriter<'_>) {
        out.put_bytes(&self.rng.get_seed());
        out.put_be64(self.rng.get_stream());
        out.put_bytes(&self.rng.get_word_pos().to_be_bytes());
        out.put_be64(self.bytes_generated);
    }

    fn load(&mut self, input: &mut SnapshotReader<'_>, version_id: u32) -> Result<(), DeviceError> {
        check_version(&self.id, version_id)?;
        let err = stream_err(&self.id);

        let mut seed = [0u8; 32];
        input.get_bytes(&mut seed).map_err(&err)?;
        let stream = input.get_be64().map_err(&err)?;
        let mut word_pos = [0u8; 16];
        input.get_bytes(&mut word_pos).map_err(&err)?;
        let bytes_generated = input.get_be64().map_err(&err)?;

        let mut rng = ChaCha20Rng::from_seed(seed);
        rng.set_stream(stream);
        rng.set_word_pos(u128::from_be_bytes(word_pos));
        self.rng = rng;
        self.bytes_generated = bytes_generated;
        Ok(())
    }

    fn step(&mut self, _tick: u64) {
        self.next_u64();
    }

    /// Give this branch a distinct stream.  `bytes_generated` is kept.
    fn reseed(&mut self, seed: u64) {
        self.rng = rng_from_u64(seed);
    }

    fn fingerprint(&self) -> u64 {
        let mut rng = self.rng.clone();
        fnv1a(self.bytes_generated, &rng.next_u64().to_le_bytes())
    }
}

fn rng_from_u64(seed: u64) -> ChaCha20Rng {
    let mut key = [0u8; 32];
    key[..8].copy_from_slice(&seed.to_le_bytes());
    ChaCha20Rng::from_seed(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use devshadow::stream::{StagingBuffer, StateBuffer};

    fn saved(dev: &DeterministicEntropy) -> StateBuffer {
        let mut staging = StagingBuffer::new();
        dev.save(&mut SnapshotWriter::new(&mut staging));
        StateBuffer::from_bytes(staging.as_bytes())
    }

    #[test]
    fn same_seed_same_output() {
        let mut a = DeterministicEntropy::new("rng", 7);
        let mut b = DeterministicEntropy::new("rng", 7);
        for _ in 0..16 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn different_seeds_diverge() {
        let mut a = DeterministicEntropy::new("rng", 1);
        let mut b = DeterministicEntropy::new("rng", 2);
        assert_ne!(a.next_u64(), b.next_u64());
    }

    #[test]
    fn saved_state_is_fixed_size() {
        let mut dev = DeterministicEntropy::new("rng", 3);
        assert_eq!(saved(&dev).len(), ENTROPY_STATE_LEN);
        dev.next_u64();
        assert_eq!(saved(&dev).len(), ENTROPY_STATE_LEN);
    }

    #[test]
    fn load_replays_stream() {
        let mut dev = DeterministicEntropy::new("rng", 99);
        dev.next_u64();
        let snap = saved(&dev);
        let expected: Vec<u64> = (0..4).map(|_| dev.next_u64()).collect();

        let mut other = DeterministicEntropy::new("rng", 0);
        other.load(&mut SnapshotReader::new(&snap), 0).unwrap();
        let replay: Vec<u64> = (0..4).map(|_| other.next_u64()).collect();

        assert_eq!(replay, expected);
        assert_eq!(other.bytes_generated(), dev.bytes_generated());
    }

    #[test]
    fn reseed_keeps_counter() {
        let mut dev = DeterministicEntropy::new("rng", 5);
        let mut buf = [0u8; 24];
        dev.fill_bytes(&mut buf);
        dev.reseed(6);
        assert_eq!(dev.bytes_generated(), 24);
        assert_eq!(dev.next_u64(), DeterministicEntropy::new("rng", 6).next_u64());
    }

    #[test]
    fn rejects_unknown_version() {
        let dev = DeterministicEntropy::new("rng", 1);
        let snap = saved(&dev);
        let mut other = DeterministicEntropy::new("rng", 1);
        let err = other.load(&mut SnapshotReader::new(&snap), 1).unwrap_err();
        assert!(matches!(err, DeviceError::UnsupportedVersion { version: 1, .. }));
    }
}
