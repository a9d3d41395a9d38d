use avrspi::error::AvrResult;
use clap::{ArgAction, Parser, Subcommand};
use commands::{
    CmdOptions, ReadOptions, SessionOptions, WriteOptions, handle_cmd, handle_erase, handle_parts,
    handle_probe, handle_read, handle_write,
};

mod commands;

#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
struct Cli {
    /// More output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Enter programming mode and read the device signature
    Probe(SessionOptions),

    /// Erase flash and eeprom
    Erase(SessionOptions),

    /// Dump a memory region
    #[command(alias = "r")]
    Read(ReadOptions),

    /// Write bytes to a memory region
    #[command(alias = "w")]
    Write(WriteOptions),

    /// Send a raw 4-byte ISP instruction
    Cmd(CmdOptions),

    /// List known parts
    Parts,
}

fn main() -> AvrResult<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    match cli.command {
        Command::Probe(opts) => handle_probe(opts)?,
        Command::Erase(opts) => handle_erase(opts)?,
        Command::Read(opts) => handle_read(opts)?,
        Command::Write(opts) => handle_write(opts)?,
        Command::Cmd(opts) => handle_cmd(opts)?,
        Command::Parts => handle_parts(),
    }

    Ok(())
}
