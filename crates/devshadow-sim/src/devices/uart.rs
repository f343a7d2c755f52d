//! Minimal UART with a fixed-depth receive FIFO.

use super::{check_version, fnv1a, stream_err, SimDevice};
use devshadow::{DeviceError, SnapshotReader, SnapshotWriter};

/// Receive FIFO depth, as on a 16550.
pub const FIFO_DEPTH: usize = 16;

/// Fixed-size FIFO plus line control; the whole array is always saved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Uart {
    id: String,
    fifo: [u8; FIFO_DEPTH],
    head: u8,
    len: u8,
    line_control: u8,
    overruns: u32,
}

impl Uart {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fifo: [0; FIFO_DEPTH],
            head: 0,
            len: 0,
            line_control: 0x03,
            overruns: 0,
        }
    }

    /// Queue a received byte; a full FIFO drops it and counts an overrun.
    pub fn receive(&mut self, byte: u8) {
        if self.len as usize == FIFO_DEPTH {
            self.overruns += 1;
            return;
        }
        let tail = (self.head as usize + self.len as usize) % FIFO_DEPTH;
        self.fifo[tail] = byte;
        self.len += 1;
    }

    /// Pop the oldest received byte.
    pub fn read(&mut self) -> Option<u8> {
        if self.len == 0 {
            return None;
        }
        let byte = self.fifo[self.head as usize];
        self.head = ((self.head as usize + 1) % FIFO_DEPTH) as u8;
        self.len -= 1;
        Some(byte)
    }

    pub fn pending(&self) -> usize {
        self.len as usize
    }

    pub fn overruns(&self) -> u32 {
        self.overruns
    }
}

impl SimDevice for Uart {
    fn id(&self) -> &str {
        &self.id
    }

    fn save(&self, out: &mut SnapshotWriter<'_>) {
        out.put_bytes(&self.fifo);
        out.put_u8(self.head);
        out.put_u8(self.len);
        out.put_u8(self.line_control);
        out.put_be32(self.overruns);
    }

    fn load(&mut self, input: &mut SnapshotReader<'_>, version_id: u32) -> Result<(), DeviceError> {
        check_version(&self.id, version_id)?;
        let err = stream_err(&self.id);
        let mut fifo = [0u8; FIFO_DEPTH];
        input.get_bytes(&mut fifo).map_err(&err)?;
        let head = input.get_u8().map_err(&err)?;
        let len = input.get_u8().map_err(&err)?;
        let line_control = input.get_u8().map_err(&err)?;
        let overruns = input.get_be32().map_err(&err)?;

        if head as usize >= FIFO_DEPTH || len as usize > FIFO_DEPTH {
            return Err(DeviceError::Corrupt {
                device: self.id.clone(),
                reason: format!("fifo head {head} len {len}"),
            });
        }
        self.fifo = fifo;
        self.head = head;
        self.len = len;
        self.line_control = line_control;
        self.overruns = overruns;
        Ok(())
    }

    fn step(&mut self, tick: u64) {
        // One byte of "line noise" every fourth step, drained every eighth.
        if tick % 4 == 0 {
            self.receive(b'a' + (tick % 26) as u8);
        }
        if tick % 8 == 7 {
            self.read();
        }
    }

    fn fingerprint(&self) -> u64 {
        let mut bytes = self.fifo.to_vec();
        bytes.extend([self.head, self.len, self.line_control]);
        bytes.extend(self.overruns.to_le_bytes());
        fnv1a(1, &bytes)
    }
}
