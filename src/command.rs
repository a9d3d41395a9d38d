use crate::constants::CMD_FRAME_LEN;
use crate::error::{AvrError, AvrResult};
use crate::part::{Memory, OpcodeTemplate, Operation, Part};

/// A 4-byte ISP instruction and the bytes clocked back while sending it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommandFrame {
    pub tx: [u8; CMD_FRAME_LEN],
    pub rx: [u8; CMD_FRAME_LEN],
}

impl CommandFrame {
    fn from_template(template: &OpcodeTemplate) -> Self {
        let mut frame = CommandFrame::default();
        template.set_bits(&mut frame.tx);
        frame
    }

    /// Frame for a part level instruction such as program enable.
    pub fn for_part(part: &Part, op: Operation) -> AvrResult<Self> {
        let template = part.op(op).ok_or_else(|| {
            AvrError::ConfigurationError(format!(
                "{} instruction not defined for part \"{}\"",
                op, part.desc
            ))
        })?;
        Ok(Self::from_template(template))
    }

    /// Frame for a memory access. Only the fixed bits are applied; address
    /// and data go in through the returned template.
    pub fn for_memory<'m>(
        part: &Part,
        memory: &'m Memory,
        op: Operation,
    ) -> AvrResult<(Self, &'m OpcodeTemplate)> {
        let template = memory.op(op).ok_or_else(|| {
            AvrError::ConfigurationError(format!(
                "{} instruction not defined for memory \"{}\" of part \"{}\"",
                op, memory.name, part.desc
            ))
        })?;
        Ok((Self::from_template(template), template))
    }
}
