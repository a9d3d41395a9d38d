use avrspi::{
    Microcontroller, Programmer, ProgrammerType,
    diagnostics::TracingSink,
    error::{AvrError, AvrResult},
    part_for_mcu,
};
use clap::{Args, ValueEnum};
use tracing::{info, warn};

#[derive(Args, Debug, Clone)]
pub(crate) struct SessionOptions {
    /// Target part
    #[arg(short, long)]
    part: Microcontroller,

    /// SPI device node, e.g. /dev/spidev0.0
    #[arg(short = 'P', long, default_value = "unknown")]
    port: String,

    /// Programmer backend
    #[arg(short = 'c', long, value_enum, default_value_t = ProgrammerType::LinuxSpi)]
    programmer: ProgrammerType,
}

#[derive(Args, Debug, Clone)]
pub(crate) struct ReadOptions {
    #[command(flatten)]
    session: SessionOptions,

    /// Memory name (flash, eeprom, lfuse, ...)
    #[arg(short, long)]
    memory: String,

    /// Start address
    #[arg(short, long, default_value = "0", value_parser = parse_u32)]
    address: u32,

    /// Number of bytes, defaults to the rest of the memory
    #[arg(short = 'n', long, value_parser = parse_u32)]
    count: Option<u32>,
}

#[derive(Args, Debug, Clone)]
pub(crate) struct WriteOptions {
    #[command(flatten)]
    session: SessionOptions,

    /// Memory name (eeprom, lfuse, ...)
    #[arg(short, long)]
    memory: String,

    /// Start address
    #[arg(short, long, default_value = "0", value_parser = parse_u32)]
    address: u32,

    /// Bytes to write, decimal or 0x-prefixed hex
    #[arg(required = true, value_parser = parse_u8)]
    bytes: Vec<u8>,
}

#[derive(Args, Debug, Clone)]
pub(crate) struct CmdOptions {
    #[command(flatten)]
    session: SessionOptions,

    /// Four instruction bytes, decimal or 0x-prefixed hex
    #[arg(num_args = 4, required = true, value_parser = parse_u8)]
    bytes: Vec<u8>,
}

fn parse_u32(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid number '{}': {}", s, e))
}

fn parse_u8(s: &str) -> Result<u8, String> {
    let value = parse_u32(s)?;
    u8::try_from(value).map_err(|_| format!("'{}' does not fit in a byte", s))
}

fn start_session(opts: &SessionOptions) -> AvrResult<Programmer> {
    let part = part_for_mcu(opts.part)?;
    let mut programmer = Programmer::new(
        opts.programmer,
        part,
        &opts.port,
        Box::new(TracingSink::default()),
    )?;
    programmer.initialize()?;
    Ok(programmer)
}

pub(crate) fn handle_probe(opts: SessionOptions) -> AvrResult<()> {
    let mut programmer = start_session(&opts)?;
    let signature = programmer.read_signature()?;

    println!(
        "Device signature = {:#04x} {:#04x} {:#04x}",
        signature[0], signature[1], signature[2]
    );
    if signature != programmer.part().signature {
        warn!(
            "Signature does not match {} (expected {:02x?})",
            programmer.part().desc,
            programmer.part().signature
        );
    }
    Ok(())
}

pub(crate) fn handle_erase(opts: SessionOptions) -> AvrResult<()> {
    let mut programmer = start_session(&opts)?;
    programmer.chip_erase()?;
    info!("Chip erased");
    Ok(())
}

pub(crate) fn handle_read(opts: ReadOptions) -> AvrResult<()> {
    let mut programmer = start_session(&opts.session)?;
    let size = programmer
        .part()
        .memory(&opts.memory)
        .map(|m| m.size)
        .ok_or_else(|| {
            AvrError::ConfigurationError(format!("Unknown memory \"{}\"", opts.memory))
        })?;
    let count = opts.count.unwrap_or(size.saturating_sub(opts.address));

    programmer.progress_bar(count > 1);
    let data = programmer.read_memory(&opts.memory, opts.address, count as usize)?;

    for (line, chunk) in data.chunks(16).enumerate() {
        let hex: Vec<String> = chunk.iter().map(|b| format!("{:02x}", b)).collect();
        println!("{:06x}  {}", opts.address as usize + line * 16, hex.join(" "));
    }
    Ok(())
}

pub(crate) fn handle_write(opts: WriteOptions) -> AvrResult<()> {
    let mut programmer = start_session(&opts.session)?;
    programmer.progress_bar(opts.bytes.len() > 1);
    programmer.write_memory(&opts.memory, opts.address, &opts.bytes)?;
    info!("Wrote {} byte(s) to {}", opts.bytes.len(), opts.memory);
    Ok(())
}

pub(crate) fn handle_cmd(opts: CmdOptions) -> AvrResult<()> {
    let mut programmer = start_session(&opts.session)?;
    let cmd = [opts.bytes[0], opts.bytes[1], opts.bytes[2], opts.bytes[3]];
    let res = programmer.send_command(cmd)?;
    println!("{:02x?} -> {:02x?}", cmd, res);
    Ok(())
}

pub(crate) fn handle_parts() {
    println!("Programmers:");
    for programmer in ProgrammerType::value_variants() {
        println!("  {:10} {}", programmer.id(), programmer.desc());
    }

    println!("Parts:");
    for mcu in Microcontroller::all() {
        match part_for_mcu(*mcu) {
            Ok(part) => {
                let memories: Vec<&str> = part.memories().iter().map(|m| m.name.as_str()).collect();
                println!("  {:10} {:12} {}", part.id, part.desc, memories.join(", "));
            }
            Err(e) => warn!("Catalog entry {:?} is broken: {}", mcu, e),
        }
    }
}
