//! Part descriptors: which memories a device has, and how each ISP
//! instruction is laid out on the wire.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;

use crate::constants::CMD_FRAME_LEN;
use crate::error::{AvrError, AvrResult};

const TEMPLATE_BITS: usize = CMD_FRAME_LEN * 8;

bitflags! {
    /// Programming interfaces a part needs besides plain ISP.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PartFlags: u32 {
        /// Tiny Programming Interface (ATtiny4/5/9/10 and friends)
        const HAS_TPI  = 1 << 0;
        /// Program and Debug Interface (XMEGA)
        const HAS_PDI  = 1 << 1;
        /// Unified Program and Debug Interface (tinyAVR 0/1/2, AVR-Dx)
        const HAS_UPDI = 1 << 2;

        const NON_ISP = Self::HAS_TPI.bits() | Self::HAS_PDI.bits() | Self::HAS_UPDI.bits();
    }
}

/// ISP instructions a part or memory can declare a template for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operation {
    PgmEnable,
    ChipErase,
    Read,
    Write,
    ReadLo,
    ReadHi,
    WriteLo,
    WriteHi,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::PgmEnable => "program enable",
            Operation::ChipErase => "chip erase",
            Operation::Read => "read",
            Operation::Write => "write",
            Operation::ReadLo => "read_lo",
            Operation::ReadHi => "read_hi",
            Operation::WriteLo => "write_lo",
            Operation::WriteHi => "write_hi",
        };
        f.write_str(name)
    }
}

/// Meaning of a single bit in a command frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpcodeBit {
    /// Don't care, sent as zero
    #[default]
    Ignore,
    /// Fixed protocol bit
    Value(bool),
    /// Bit `n` of the memory address
    Address(u8),
    /// Bit `n` of the data byte being written
    Input(u8),
    /// Bit `n` of the data byte coming back
    Output(u8),
}

/// Bit layout of one 4-byte ISP instruction.
///
/// Written in the usual notation: 32 whitespace separated tokens, most
/// significant bit of the first byte first. Tokens are `0`, `1`, `x`,
/// `aN` (address bit N), `i` and `o` (data bit in/out, numbered by the
/// token's position within its byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeTemplate {
    // Indexed by command bit; bit 0 is the LSB of the last byte.
    bits: [OpcodeBit; TEMPLATE_BITS],
}

/// Frame byte and mask holding command bit `bit`.
fn locate(bit: usize) -> (usize, u8) {
    (CMD_FRAME_LEN - 1 - bit / 8, 1 << (bit % 8))
}

fn put_bit(frame: &mut [u8; CMD_FRAME_LEN], bit: usize, value: bool) {
    let (byte, mask) = locate(bit);
    if value {
        frame[byte] |= mask;
    } else {
        frame[byte] &= !mask;
    }
}

impl OpcodeTemplate {
    pub fn bit(&self, bit: usize) -> OpcodeBit {
        self.bits[bit]
    }

    /// Apply the fixed protocol bits.
    pub fn set_bits(&self, frame: &mut [u8; CMD_FRAME_LEN]) {
        for (bit, kind) in self.bits.iter().enumerate() {
            if let OpcodeBit::Value(value) = kind {
                put_bit(frame, bit, *value);
            }
        }
    }

    pub fn set_addr(&self, frame: &mut [u8; CMD_FRAME_LEN], addr: u32) {
        for (bit, kind) in self.bits.iter().enumerate() {
            if let OpcodeBit::Address(n) = kind {
                put_bit(frame, bit, (addr >> n) & 1 == 1);
            }
        }
    }

    pub fn set_input(&self, frame: &mut [u8; CMD_FRAME_LEN], data: u8) {
        for (bit, kind) in self.bits.iter().enumerate() {
            if let OpcodeBit::Input(n) = kind {
                put_bit(frame, bit, (data >> n) & 1 == 1);
            }
        }
    }

    /// Data bits a read with this template actually returns.
    pub fn output_mask(&self) -> u8 {
        self.bits.iter().fold(0, |mask, kind| match kind {
            OpcodeBit::Output(n) => mask | 1 << n,
            _ => mask,
        })
    }

    pub fn get_output(&self, response: &[u8; CMD_FRAME_LEN]) -> u8 {
        let mut data = 0;
        for (bit, kind) in self.bits.iter().enumerate() {
            if let OpcodeBit::Output(n) = kind {
                let (byte, mask) = locate(bit);
                if response[byte] & mask != 0 {
                    data |= 1 << n;
                }
            }
        }
        data
    }
}

impl FromStr for OpcodeTemplate {
    type Err = AvrError;

    fn from_str(s: &str) -> AvrResult<Self> {
        let tokens: Vec<&str> = s.split_whitespace().collect();
        if tokens.len() != TEMPLATE_BITS {
            return Err(AvrError::ConfigurationError(format!(
                "Opcode template needs {} bits, got {}",
                TEMPLATE_BITS,
                tokens.len()
            )));
        }

        let mut bits = [OpcodeBit::Ignore; TEMPLATE_BITS];
        for (pos, token) in tokens.iter().enumerate() {
            let bit = TEMPLATE_BITS - 1 - pos;
            let data_bit = (bit % 8) as u8;
            bits[bit] = match *token {
                "0" => OpcodeBit::Value(false),
                "1" => OpcodeBit::Value(true),
                "x" => OpcodeBit::Ignore,
                "i" => OpcodeBit::Input(data_bit),
                "o" => OpcodeBit::Output(data_bit),
                t if t.starts_with('a') => {
                    let n: u8 = t[1..].parse().map_err(|_| {
                        AvrError::ConfigurationError(format!(
                            "Invalid address bit '{}' in opcode template",
                            t
                        ))
                    })?;
                    if n >= 32 {
                        return Err(AvrError::ConfigurationError(format!(
                            "Address bit '{}' out of range",
                            t
                        )));
                    }
                    OpcodeBit::Address(n)
                }
                t => {
                    return Err(AvrError::ConfigurationError(format!(
                        "Unknown token '{}' in opcode template",
                        t
                    )));
                }
            };
        }

        Ok(OpcodeTemplate { bits })
    }
}

/// One addressable memory of a part (flash, eeprom, fuses, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct Memory {
    pub name: String,
    pub size: u32,
    /// Microseconds
    pub min_write_delay: u32,
    /// Microseconds
    pub max_write_delay: u32,
    /// Values that read back unchanged while a write is in progress, so
    /// writing them cannot be confirmed by polling.
    pub readback: [u8; 2],
    ops: BTreeMap<Operation, OpcodeTemplate>,
}

impl Memory {
    pub fn new(name: impl Into<String>, size: u32) -> Self {
        Memory {
            name: name.into(),
            size,
            min_write_delay: 0,
            max_write_delay: 0,
            readback: [0xff, 0xff],
            ops: BTreeMap::new(),
        }
    }

    pub fn with_write_delay(mut self, min_us: u32, max_us: u32) -> Self {
        self.min_write_delay = min_us;
        self.max_write_delay = max_us;
        self
    }

    pub fn with_readback(mut self, readback: [u8; 2]) -> Self {
        self.readback = readback;
        self
    }

    pub fn with_op(mut self, op: Operation, template: &str) -> AvrResult<Self> {
        self.ops.insert(op, template.parse()?);
        Ok(self)
    }

    pub fn op(&self, op: Operation) -> Option<&OpcodeTemplate> {
        self.ops.get(&op)
    }

    /// Flash is word addressed and split into low/high byte instructions.
    pub fn is_word_addressed(&self) -> bool {
        self.ops.contains_key(&Operation::ReadLo)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Part {
    pub id: String,
    pub desc: String,
    pub signature: [u8; 3],
    pub flags: PartFlags,
    /// Microseconds to wait after a chip erase
    pub chip_erase_delay: u32,
    ops: BTreeMap<Operation, OpcodeTemplate>,
    memories: Vec<Memory>,
}

impl Part {
    pub fn new(id: impl Into<String>, desc: impl Into<String>) -> Self {
        Part {
            id: id.into(),
            desc: desc.into(),
            signature: [0; 3],
            flags: PartFlags::empty(),
            chip_erase_delay: 0,
            ops: BTreeMap::new(),
            memories: Vec::new(),
        }
    }

    pub fn with_signature(mut self, signature: [u8; 3]) -> Self {
        self.signature = signature;
        self
    }

    pub fn with_flags(mut self, flags: PartFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_chip_erase_delay(mut self, delay_us: u32) -> Self {
        self.chip_erase_delay = delay_us;
        self
    }

    pub fn with_op(mut self, op: Operation, template: &str) -> AvrResult<Self> {
        self.ops.insert(op, template.parse()?);
        Ok(self)
    }

    pub fn with_memory(mut self, memory: Memory) -> Self {
        self.memories.push(memory);
        self
    }

    pub fn op(&self, op: Operation) -> Option<&OpcodeTemplate> {
        self.ops.get(&op)
    }

    pub fn memory(&self, name: &str) -> Option<&Memory> {
        self.memories.iter().find(|m| m.name == name)
    }

    pub fn memories(&self) -> &[Memory] {
        &self.memories
    }

    pub fn requires_non_isp_interface(&self) -> bool {
        self.flags.intersects(PartFlags::NON_ISP)
    }
}
