use std::thread;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::command::CommandFrame;
use crate::constants::CMD_FRAME_LEN;
use crate::diagnostics::DiagnosticSink;
use crate::error::{AvrError, AvrResult};
use crate::part::{Memory, OpcodeTemplate, Operation, Part};
use handshake::HandshakeOutcome;

pub mod handshake;
pub mod linuxspi;

/// Entry points every programmer backend provides.
///
/// `setup` and `teardown` are optional. Byte level memory access has
/// default implementations built on `cmd` that suit any backend speaking
/// raw ISP instructions.
pub trait ProgrammerBackend {
    fn id(&self) -> &'static str;

    fn diagnostics(&self) -> &dyn DiagnosticSink;

    /// How the most recent program-enable handshake ended, if the backend
    /// runs one.
    fn last_handshake(&self) -> Option<&HandshakeOutcome> {
        None
    }

    fn setup(&mut self) {}

    fn teardown(&mut self) {}

    fn open(&mut self, port: &str) -> AvrResult<()>;

    fn close(&mut self);

    fn enable(&mut self);

    fn disable(&mut self);

    fn display(&self, prefix: &str);

    fn initialize(&mut self, part: &Part) -> AvrResult<()>;

    fn program_enable(&mut self, part: &Part) -> AvrResult<()>;

    fn chip_erase(&mut self, part: &Part) -> AvrResult<()>;

    /// Send one raw 4-byte instruction and return what came back.
    fn cmd(&mut self, cmd: &[u8; CMD_FRAME_LEN]) -> AvrResult<[u8; CMD_FRAME_LEN]>;

    fn read_byte(&mut self, part: &Part, memory: &Memory, addr: u32) -> AvrResult<u8> {
        let (op, addr_bits) = byte_access(memory, addr, false);
        let (mut frame, template) = CommandFrame::for_memory(part, memory, op)
            .map_err(|e| report(self.diagnostics(), e))?;

        template.set_addr(&mut frame.tx, addr_bits);
        frame.rx = self.cmd(&frame.tx)?;

        let value = template.get_output(&frame.rx);
        trace!("{} {:#06x} -> {:#04x}", memory.name, addr, value);
        Ok(value)
    }

    fn write_byte(&mut self, part: &Part, memory: &Memory, addr: u32, data: u8) -> AvrResult<()> {
        let (op, addr_bits) = byte_access(memory, addr, true);
        let (mut frame, template) = CommandFrame::for_memory(part, memory, op)
            .map_err(|e| report(self.diagnostics(), e))?;

        template.set_addr(&mut frame.tx, addr_bits);
        template.set_input(&mut frame.tx, data);
        self.cmd(&frame.tx)?;

        thread::sleep(Duration::from_micros(memory.min_write_delay.into()));
        let extra_delay = memory.max_write_delay.saturating_sub(memory.min_write_delay);
        let remaining = Duration::from_micros(extra_delay.into());

        // Reads return the readback value until the write completes.
        if memory.readback.contains(&data) {
            thread::sleep(remaining);
            return Ok(());
        }

        // Only bits the read instruction returns can be confirmed.
        let (read_op, _) = byte_access(memory, addr, false);
        let mask = memory.op(read_op).map_or(0xff, OpcodeTemplate::output_mask);

        let deadline = Instant::now() + remaining;
        loop {
            if (self.read_byte(part, memory, addr)? ^ data) & mask == 0 {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(report(
                    self.diagnostics(),
                    AvrError::Protocol(format!(
                        "Write of {:#04x} to {} at {:#06x} not confirmed",
                        data, memory.name, addr
                    )),
                ));
            }
        }
    }
}

pub(crate) fn report(sink: &dyn DiagnosticSink, error: AvrError) -> AvrError {
    sink.report(&error.to_string());
    error
}

/// Instruction and address bits for a byte access. Flash is word
/// addressed with separate low and high byte instructions.
fn byte_access(memory: &Memory, addr: u32, write: bool) -> (Operation, u32) {
    if !memory.is_word_addressed() {
        let op = if write { Operation::Write } else { Operation::Read };
        return (op, addr);
    }

    let op = match (write, addr & 1) {
        (false, 0) => Operation::ReadLo,
        (false, _) => Operation::ReadHi,
        (true, 0) => Operation::WriteLo,
        (true, _) => Operation::WriteHi,
    };
    (op, addr >> 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flash_access_is_split_by_parity() {
        let flash = Memory::new("flash", 1024)
            .with_op(
                Operation::ReadLo,
                "0 0 1 0 0 0 0 0  0 0 0 0 0 0 a9 a8  a7 a6 a5 a4 a3 a2 a1 a0  o o o o o o o o",
            )
            .unwrap();

        assert_eq!(byte_access(&flash, 0x100, false), (Operation::ReadLo, 0x80));
        assert_eq!(byte_access(&flash, 0x101, false), (Operation::ReadHi, 0x80));
        assert_eq!(byte_access(&flash, 0x101, true), (Operation::WriteHi, 0x80));
    }

    #[test]
    fn byte_memories_use_plain_address() {
        let eeprom = Memory::new("eeprom", 512);
        assert_eq!(byte_access(&eeprom, 7, false), (Operation::Read, 7));
        assert_eq!(byte_access(&eeprom, 7, true), (Operation::Write, 7));
    }
}
