//! Periodic countdown timer.

use super::{check_version, fnv1a, stream_err, SimDevice};
use devshadow::{DeviceError, SnapshotReader, SnapshotWriter};

/// Counts down once per step and reloads when it hits zero.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CountdownTimer {
    id: String,
    reload: u32,
    count: u32,
    fired: u64,
}

impl CountdownTimer {
    pub fn new(id: impl Into<String>, reload: u32) -> Self {
        let reload = reload.max(1);
        Self {
            id: id.into(),
            reload,
            count: reload,
            fired: 0,
        }
    }

    /// Number of times the timer has expired.
    pub fn fired(&self) -> u64 {
        self.fired
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

impl SimDevice for CountdownTimer {
    fn id(&self) -> &str {
        &self.id
    }

    fn save(&self, out: &mut SnapshotWriter<'_>) {
        out.put_be32(self.reload);
        out.put_be32(self.count);
        out.put_be64(self.fired);
    }

    fn load(&mut self, input: &mut SnapshotReader<'_>, version_id: u32) -> Result<(), DeviceError> {
        check_version(&self.id, version_id)?;
        let err = stream_err(&self.id);
        let reload = input.get_be32().map_err(&err)?;
        let count = input.get_be32().map_err(&err)?;
        let fired = input.get_be64().map_err(&err)?;

        if reload == 0 || count == 0 || count > reload {
            return Err(DeviceError::Corrupt {
                device: self.id.clone(),
                reason: format!("count {count} outside reload {reload}"),
            });
        }
        self.reload = reload;
        self.count = count;
        self.fired = fired;
        Ok(())
    }

    fn step(&mut self, _tick: u64) {
        self.count -= 1;
        if self.count == 0 {
            self.fired += 1;
            self.count = self.reload;
        }
    }

    fn fingerprint(&self) -> u64 {
        let mut bytes = Vec::with_capacity(16);
        bytes.extend(self.reload.to_le_bytes());
        bytes.extend(self.count.to_le_bytes());
        bytes.extend(self.fired.to_le_bytes());
        fnv1a(0, &bytes)
    }
}
