//! Toy CPU register file.
//!
//! Normally shared (the execution engine snapshots the CPU itself), but it
//! can be registered per state by turning off `share_cpu`.

use super::{check_version, fnv1a, stream_err, SimDevice};
use devshadow::{DeviceError, SnapshotReader, SnapshotWriter};

pub const GPR_COUNT: usize = 4;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CpuRegs {
    pc: u64,
    sp: u64,
    gpr: [u64; GPR_COUNT],
}

impl Default for CpuRegs {
    fn default() -> Self {
        Self {
            pc: 0x10_0000,
            sp: 0x8ff0,
            gpr: [0; GPR_COUNT],
        }
    }
}

impl CpuRegs {
    pub fn pc(&self) -> u64 {
        self.pc
    }
}

impl SimDevice for CpuRegs {
    fn id(&self) -> &str {
        devshadow::config::CPU_DEVICE
    }

    fn save(&self, out: &mut SnapshotWriter<'_>) {
        out.put_be64(self.pc);
        out.put_be64(self.sp);
        for r in self.gpr {
            out.put_be64(r);
        }
    }

    fn load(&mut self, input: &mut SnapshotReader<'_>, version_id: u32) -> Result<(), DeviceError> {
        check_version(self.id(), version_id)?;
        let err = stream_err(devshadow::config::CPU_DEVICE);
        self.pc = input.get_be64().map_err(&err)?;
        self.sp = input.get_be64().map_err(&err)?;
        for r in &mut self.gpr {
            *r = input.get_be64().map_err(&err)?;
        }
        Ok(())
    }

    fn step(&mut self, tick: u64) {
        self.pc += 4;
        self.gpr[(tick % GPR_COUNT as u64) as usize] ^= tick;
    }

    fn fingerprint(&self) -> u64 {
        let bytes: Vec<u8> = [self.pc, self.sp]
            .iter()
            .chain(self.gpr.iter())
            .flat_map(|v| v.to_le_bytes())
            .collect();
        fnv1a(2, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devshadow::stream::{StagingBuffer, StateBuffer};

    #[test]
    fn step_advances_pc() {
        let mut cpu = CpuRegs::default();
        let start = cpu.pc();
        cpu.step(0);
        cpu.step(1);
        assert_eq!(cpu.pc(), start + 8);
    }

    #[test]
    fn save_load_round_trip() {
        let mut cpu = CpuRegs::default();
        for tick in 0..5 {
            cpu.step(tick);
        }
        let mut staging = StagingBuffer::new();
        cpu.save(&mut SnapshotWriter::new(&mut staging));
        let snap = StateBuffer::from_bytes(staging.as_bytes());

        let mut other = CpuRegs::default();
        other.load(&mut SnapshotReader::new(&snap), 0).unwrap();
        assert_eq!(other, cpu);
    }
}
