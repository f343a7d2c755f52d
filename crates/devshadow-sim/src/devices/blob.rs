//! Opaque fixed-size state, used for save entries such as `ram` and
//! `block` that dedicated subsystems manage.

use super::{check_version, fnv1a, stream_err, SimDevice};
use devshadow::{DeviceError, SnapshotReader, SnapshotWriter};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlobDevice {
    id: String,
    bytes: Vec<u8>,
}

impl BlobDevice {
    pub fn new(id: impl Into<String>, len: usize) -> Self {
        Self {
            id: id.into(),
            bytes: vec![0; len],
        }
    }
}

impl SimDevice for BlobDevice {
    fn id(&self) -> &str {
        &self.id
    }

    fn save(&self, out: &mut SnapshotWriter<'_>) {
        out.put_bytes(&self.bytes);
    }

    fn load(&mut self, input: &mut SnapshotReader<'_>, version_id: u32) -> Result<(), DeviceError> {
        check_version(&self.id, version_id)?;
        input
            .get_bytes(&mut self.bytes)
            .map_err(stream_err(&self.id))
    }

    fn step(&mut self, tick: u64) {
        if !self.bytes.is_empty() {
            let i = (tick as usize) % self.bytes.len();
            self.bytes[i] = self.bytes[i].wrapping_add(1);
        }
    }

    fn fingerprint(&self) -> u64 {
        fnv1a(3, &self.bytes)
    }
}
