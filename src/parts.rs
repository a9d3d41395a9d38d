use clap::ValueEnum;

use crate::error::AvrResult;
use crate::part::{Memory, Operation, Part, PartFlags};

/// Parts the built-in catalog knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Microcontroller {
    /// ATmega328P (Arduino Uno/Nano)
    #[value(name = "m328p", alias = "atmega328p")]
    Atmega328p,

    /// ATtiny85
    #[value(name = "t85", alias = "attiny85")]
    Attiny85,

    /// ATtiny10, TPI only
    #[value(name = "t10", alias = "attiny10")]
    Attiny10,
}

impl Microcontroller {
    pub fn all() -> &'static [Microcontroller] {
        Self::value_variants()
    }
}

const PGM_ENABLE: &str = "1 0 1 0 1 1 0 0  0 1 0 1 0 0 1 1  x x x x x x x x  x x x x x x x x";
const CHIP_ERASE: &str = "1 0 1 0 1 1 0 0  1 0 0 x x x x x  x x x x x x x x  x x x x x x x x";

const SIGNATURE_READ: &str = "0 0 1 1 0 0 0 0  0 0 0 x x x x x  x x x x x x a1 a0  o o o o o o o o";
const CALIBRATION_READ: &str = "0 0 1 1 1 0 0 0  0 0 0 x x x x x  0 0 0 0 0 0 0 0  o o o o o o o o";

const LFUSE_READ: &str = "0 1 0 1 0 0 0 0  0 0 0 0 0 0 0 0  x x x x x x x x  o o o o o o o o";
const LFUSE_WRITE: &str = "1 0 1 0 1 1 0 0  1 0 1 0 0 0 0 0  x x x x x x x x  i i i i i i i i";
const HFUSE_READ: &str = "0 1 0 1 1 0 0 0  0 0 0 0 1 0 0 0  x x x x x x x x  o o o o o o o o";
const HFUSE_WRITE: &str = "1 0 1 0 1 1 0 0  1 0 1 0 1 0 0 0  x x x x x x x x  i i i i i i i i";
const EFUSE_READ: &str = "0 1 0 1 0 0 0 0  0 0 0 0 1 0 0 0  x x x x x x x x  o o o o o o o o";
const LOCK_READ: &str = "0 1 0 1 1 0 0 0  0 0 0 0 0 0 0 0  x x x x x x x x  x x o o o o o o";
const LOCK_WRITE: &str = "1 0 1 0 1 1 0 0  1 1 1 x x x x x  x x x x x x x x  1 1 i i i i i i";

const FUSE_WRITE_DELAY_US: u32 = 4500;

fn fuse(name: &str, read: &str, write: &str) -> AvrResult<Memory> {
    Memory::new(name, 1)
        .with_write_delay(FUSE_WRITE_DELAY_US, FUSE_WRITE_DELAY_US)
        .with_op(Operation::Read, read)?
        .with_op(Operation::Write, write)
}

fn signature() -> AvrResult<Memory> {
    Memory::new("signature", 3).with_op(Operation::Read, SIGNATURE_READ)
}

fn calibration() -> AvrResult<Memory> {
    Memory::new("calibration", 1).with_op(Operation::Read, CALIBRATION_READ)
}

fn isp_part(id: &str, desc: &str) -> AvrResult<Part> {
    Part::new(id, desc)
        .with_op(Operation::PgmEnable, PGM_ENABLE)?
        .with_op(Operation::ChipErase, CHIP_ERASE)
}

fn atmega328p() -> AvrResult<Part> {
    let eeprom = Memory::new("eeprom", 1024)
        .with_write_delay(3600, 3600)
        .with_op(
            Operation::Read,
            "1 0 1 0 0 0 0 0  0 0 0 x x x a9 a8  a7 a6 a5 a4 a3 a2 a1 a0  o o o o o o o o",
        )?
        .with_op(
            Operation::Write,
            "1 1 0 0 0 0 0 0  0 0 0 x x x a9 a8  a7 a6 a5 a4 a3 a2 a1 a0  i i i i i i i i",
        )?;

    let flash = Memory::new("flash", 32768)
        .with_write_delay(4500, 4500)
        .with_op(
            Operation::ReadLo,
            "0 0 1 0 0 0 0 0  0 0 a13 a12 a11 a10 a9 a8  a7 a6 a5 a4 a3 a2 a1 a0  o o o o o o o o",
        )?
        .with_op(
            Operation::ReadHi,
            "0 0 1 0 1 0 0 0  0 0 a13 a12 a11 a10 a9 a8  a7 a6 a5 a4 a3 a2 a1 a0  o o o o o o o o",
        )?;

    Ok(isp_part("m328p", "ATmega328P")?
        .with_signature([0x1e, 0x95, 0x0f])
        .with_chip_erase_delay(9000)
        .with_memory(eeprom)
        .with_memory(flash)
        .with_memory(fuse("lfuse", LFUSE_READ, LFUSE_WRITE)?)
        .with_memory(fuse("hfuse", HFUSE_READ, HFUSE_WRITE)?)
        .with_memory(fuse(
            "efuse",
            EFUSE_READ,
            "1 0 1 0 1 1 0 0  1 0 1 0 0 1 0 0  x x x x x x x x  x x x x x i i i",
        )?)
        .with_memory(fuse("lock", LOCK_READ, LOCK_WRITE)?)
        .with_memory(signature()?)
        .with_memory(calibration()?))
}

fn attiny85() -> AvrResult<Part> {
    let eeprom = Memory::new("eeprom", 512)
        .with_write_delay(4000, 4500)
        .with_op(
            Operation::Read,
            "1 0 1 0 0 0 0 0  0 0 0 x x x x a8  a7 a6 a5 a4 a3 a2 a1 a0  o o o o o o o o",
        )?
        .with_op(
            Operation::Write,
            "1 1 0 0 0 0 0 0  0 0 0 x x x x a8  a7 a6 a5 a4 a3 a2 a1 a0  i i i i i i i i",
        )?;

    let flash = Memory::new("flash", 8192)
        .with_write_delay(4500, 4500)
        .with_op(
            Operation::ReadLo,
            "0 0 1 0 0 0 0 0  0 0 0 0 a11 a10 a9 a8  a7 a6 a5 a4 a3 a2 a1 a0  o o o o o o o o",
        )?
        .with_op(
            Operation::ReadHi,
            "0 0 1 0 1 0 0 0  0 0 0 0 a11 a10 a9 a8  a7 a6 a5 a4 a3 a2 a1 a0  o o o o o o o o",
        )?;

    Ok(isp_part("t85", "ATtiny85")?
        .with_signature([0x1e, 0x93, 0x0b])
        .with_chip_erase_delay(4500)
        .with_memory(eeprom)
        .with_memory(flash)
        .with_memory(fuse("lfuse", LFUSE_READ, LFUSE_WRITE)?)
        .with_memory(fuse("hfuse", HFUSE_READ, HFUSE_WRITE)?)
        .with_memory(fuse(
            "efuse",
            EFUSE_READ,
            "1 0 1 0 1 1 0 0  1 0 1 0 0 1 0 0  x x x x x x x x  x x x x x x x i",
        )?)
        .with_memory(fuse("lock", LOCK_READ, LOCK_WRITE)?)
        .with_memory(signature()?)
        .with_memory(calibration()?))
}

fn attiny10() -> Part {
    Part::new("t10", "ATtiny10")
        .with_signature([0x1e, 0x90, 0x03])
        .with_flags(PartFlags::HAS_TPI)
        .with_memory(Memory::new("flash", 1024))
}

/// Descriptor for a catalog part
pub fn part_for_mcu(mcu: Microcontroller) -> AvrResult<Part> {
    match mcu {
        Microcontroller::Atmega328p => atmega328p(),
        Microcontroller::Attiny85 => attiny85(),
        Microcontroller::Attiny10 => Ok(attiny10()),
    }
}
