use clap::ValueEnum;
use tracing::{debug, info};

use diagnostics::DiagnosticSink;
use error::{AvrError, AvrResult};
use part::{Memory, Part};
use protocols::ProgrammerBackend;
use protocols::handshake::HandshakeOutcome;
use protocols::linuxspi::{LINUXSPI_DESC, LINUXSPI_ID, LinuxSpi};
use util::create_progress_bar;

pub use parts::{Microcontroller, part_for_mcu};

pub mod command;
pub mod constants;
pub mod diagnostics;
pub mod error;
pub mod interface;
pub mod part;
pub mod parts;
pub mod protocols;
pub(crate) mod util;

/// Registered programmer backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProgrammerType {
    /// SPI using Linux spidev driver
    #[value(name = "linuxspi")]
    LinuxSpi,
}

impl ProgrammerType {
    pub fn id(&self) -> &'static str {
        match self {
            ProgrammerType::LinuxSpi => LINUXSPI_ID,
        }
    }

    pub fn desc(&self) -> &'static str {
        match self {
            ProgrammerType::LinuxSpi => LINUXSPI_DESC,
        }
    }

    pub fn build(self, sink: Box<dyn DiagnosticSink>) -> Box<dyn ProgrammerBackend> {
        match self {
            ProgrammerType::LinuxSpi => Box::new(LinuxSpi::new(sink)),
        }
    }
}

/// A programming session against one part.
///
/// Created open, torn down on drop. Memory access and erase are refused
/// until [`Programmer::initialize`] has put the target in programming mode.
pub struct Programmer {
    backend: Box<dyn ProgrammerBackend>,
    part: Part,
    initialized: bool,
    progress_bar_enable: bool,
}

impl Programmer {
    pub fn new(
        programmer: ProgrammerType,
        part: Part,
        port: &str,
        sink: Box<dyn DiagnosticSink>,
    ) -> AvrResult<Self> {
        Self::from_backend(programmer.build(sink), part, port)
    }

    /// Set up and open an already constructed backend.
    pub fn from_backend(
        mut backend: Box<dyn ProgrammerBackend>,
        part: Part,
        port: &str,
    ) -> AvrResult<Self> {
        backend.setup();
        if let Err(e) = backend.open(port) {
            backend.teardown();
            return Err(e);
        }
        debug!("{} opened {} for {}", backend.id(), port, part.desc);

        Ok(Programmer {
            backend,
            part,
            initialized: false,
            progress_bar_enable: false,
        })
    }

    pub fn part(&self) -> &Part {
        &self.part
    }

    pub fn progress_bar(&mut self, enable: bool) {
        self.progress_bar_enable = enable;
    }

    pub fn display(&self, prefix: &str) {
        self.backend.display(prefix);
    }

    /// Put the target into programming mode.
    pub fn initialize(&mut self) -> AvrResult<()> {
        self.backend.enable();
        self.backend.initialize(&self.part)?;
        self.initialized = true;
        Ok(())
    }

    fn ensure_initialized(&self) -> AvrResult<()> {
        if self.initialized {
            Ok(())
        } else {
            let error = AvrError::Protocol(format!(
                "{} is not in programming mode; initialize first",
                self.part.desc
            ));
            self.backend.diagnostics().report(&error.to_string());
            Err(error)
        }
    }

    fn memory(&self, name: &str, start: u32, len: usize) -> AvrResult<Memory> {
        let memory = match self.part.memory(name) {
            None => Err(AvrError::ConfigurationError(format!(
                "Part \"{}\" has no memory named \"{}\"",
                self.part.desc, name
            ))),
            Some(m) if start as u64 + len as u64 > m.size as u64 => {
                Err(AvrError::ConfigurationError(format!(
                    "{} bytes at {:#06x} exceed {} size of {} bytes",
                    len, start, m.name, m.size
                )))
            }
            Some(m) => Ok(m.clone()),
        };
        memory.inspect_err(|e| self.backend.diagnostics().report(&e.to_string()))
    }

    pub fn chip_erase(&mut self) -> AvrResult<()> {
        self.ensure_initialized()?;
        info!("Erasing {}", self.part.desc);
        self.backend.chip_erase(&self.part)?;

        // Erase leaves programming mode; a target that did not come back
        // needs a fresh initialize.
        if matches!(self.backend.last_handshake(), Some(HandshakeOutcome::Failed(_))) {
            self.initialized = false;
        }
        Ok(())
    }

    /// Send a raw ISP instruction.
    pub fn send_command(&mut self, cmd: [u8; 4]) -> AvrResult<[u8; 4]> {
        self.ensure_initialized()?;
        self.backend.cmd(&cmd)
    }

    pub fn read_memory(&mut self, name: &str, start: u32, len: usize) -> AvrResult<Vec<u8>> {
        self.ensure_initialized()?;
        let memory = self.memory(name, start, len)?;

        let pb = self
            .progress_bar_enable
            .then(|| create_progress_bar(len as u64, &format!("Reading {}", memory.name)));

        let mut data = Vec::with_capacity(len);
        for addr in start..start + len as u32 {
            data.push(self.backend.read_byte(&self.part, &memory, addr)?);
            if let Some(pb) = &pb {
                pb.inc(1);
            }
        }

        if let Some(pb) = pb {
            pb.finish();
        }
        Ok(data)
    }

    pub fn write_memory(&mut self, name: &str, start: u32, data: &[u8]) -> AvrResult<()> {
        self.ensure_initialized()?;
        let memory = self.memory(name, start, data.len())?;

        let pb = self.progress_bar_enable.then(|| {
            create_progress_bar(data.len() as u64, &format!("Writing {}", memory.name))
        });

        for (addr, byte) in (start..).zip(data) {
            self.backend.write_byte(&self.part, &memory, addr, *byte)?;
            if let Some(pb) = &pb {
                pb.inc(1);
            }
        }

        if let Some(pb) = pb {
            pb.finish();
        }
        Ok(())
    }

    pub fn read_signature(&mut self) -> AvrResult<[u8; 3]> {
        let bytes = self.read_memory("signature", 0, 3)?;
        Ok([bytes[0], bytes[1], bytes[2]])
    }
}

impl Drop for Programmer {
    fn drop(&mut self) {
        self.backend.disable();
        self.backend.close();
        self.backend.teardown();
    }
}
