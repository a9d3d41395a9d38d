//! AVR ISP over the Linux spidev driver.
//!
//! The kernel owns the SPI controller, so there is no session to keep: each
//! instruction opens the device node, exchanges four bytes and closes it.
//! Reset and chip select are handled by the board wiring, which is why
//! enable, disable and close have nothing to do.

use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::handshake::{HandshakeFailure, HandshakeOutcome, ProgramEnableHandshake};
use super::{ProgrammerBackend, report};
use crate::command::CommandFrame;
use crate::constants::{CMD_FRAME_LEN, UNKNOWN_PORT};
use crate::diagnostics::DiagnosticSink;
use crate::error::{AvrError, AvrResult};
use crate::interface::{DuplexTransport, SpidevTransport};
use crate::part::{Operation, Part, PartFlags};

pub const LINUXSPI_ID: &str = "linuxspi";
pub const LINUXSPI_DESC: &str = "SPI using Linux spidev driver";

/// Private data of the backend, alive between `setup` and `teardown`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendState {
    speed_hz: u32,
    port: Option<String>,
}

impl BackendState {
    /// Not used for transfers, which always run at the fixed ISP clock.
    pub fn speed_hz(&self) -> u32 {
        self.speed_hz
    }

    pub fn port(&self) -> Option<&str> {
        self.port.as_deref()
    }
}

pub struct LinuxSpi<T: DuplexTransport = SpidevTransport> {
    transport: T,
    sink: Box<dyn DiagnosticSink>,
    state: Option<BackendState>,
    last_handshake: Option<HandshakeOutcome>,
}

impl LinuxSpi<SpidevTransport> {
    pub fn new(sink: Box<dyn DiagnosticSink>) -> Self {
        Self::with_transport(SpidevTransport::new(), sink)
    }
}

impl<T: DuplexTransport> LinuxSpi<T> {
    pub fn with_transport(transport: T, sink: Box<dyn DiagnosticSink>) -> Self {
        LinuxSpi {
            transport,
            sink,
            state: None,
            last_handshake: None,
        }
    }

    pub fn state(&self) -> Option<&BackendState> {
        self.state.as_ref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn fail(&self, error: AvrError) -> AvrError {
        report(self.sink.as_ref(), error)
    }

    fn run_handshake(&mut self, part: &Part) -> HandshakeOutcome {
        let outcome = ProgramEnableHandshake::default().run(|| self.program_enable(part));
        self.last_handshake = Some(outcome.clone());
        outcome
    }
}

fn interface_name(flags: PartFlags) -> &'static str {
    if flags.contains(PartFlags::HAS_TPI) {
        "TPI"
    } else if flags.contains(PartFlags::HAS_PDI) {
        "PDI"
    } else {
        "UPDI"
    }
}

impl<T: DuplexTransport> ProgrammerBackend for LinuxSpi<T> {
    fn id(&self) -> &'static str {
        LINUXSPI_ID
    }

    fn diagnostics(&self) -> &dyn DiagnosticSink {
        self.sink.as_ref()
    }

    fn last_handshake(&self) -> Option<&HandshakeOutcome> {
        self.last_handshake.as_ref()
    }

    fn setup(&mut self) {
        self.state = Some(BackendState::default());
    }

    fn teardown(&mut self) {
        self.state = None;
    }

    fn open(&mut self, port: &str) -> AvrResult<()> {
        if port.is_empty() || port == UNKNOWN_PORT {
            return Err(self.fail(AvrError::Fatal(
                "No port specified. Port should point to an SPI interface.".into(),
            )));
        }

        match self.state.as_mut() {
            Some(state) => {
                state.port = Some(port.to_owned());
                debug!("Using SPI port {}", port);
                Ok(())
            }
            None => Err(self.fail(AvrError::Fatal("linuxspi backend used before setup".into()))),
        }
    }

    fn close(&mut self) {}

    fn enable(&mut self) {}

    fn disable(&mut self) {}

    fn display(&self, _prefix: &str) {}

    fn initialize(&mut self, part: &Part) -> AvrResult<()> {
        if part.requires_non_isp_interface() {
            return Err(self.fail(AvrError::UnsupportedOperation(format!(
                "Programmer {} does not support {} ({})",
                LINUXSPI_ID,
                interface_name(part.flags),
                part.desc
            ))));
        }

        match self.run_handshake(part) {
            HandshakeOutcome::Enabled { attempts } => {
                info!("{} entered programming mode after {} attempt(s)", part.desc, attempts);
                Ok(())
            }
            HandshakeOutcome::Failed(failure) => {
                self.sink.report("AVR device not responding");
                Err(match failure {
                    HandshakeFailure::Exhausted { attempts } => AvrError::Protocol(format!(
                        "AVR device not responding after {} attempts",
                        attempts
                    )),
                    HandshakeFailure::Aborted { error, .. } => error,
                })
            }
        }
    }

    fn program_enable(&mut self, part: &Part) -> AvrResult<()> {
        let mut frame =
            CommandFrame::for_part(part, Operation::PgmEnable).map_err(|e| self.fail(e))?;
        frame.rx = self.cmd(&frame.tx)?;

        if frame.rx[2] != frame.tx[1] {
            return Err(AvrError::Protocol(format!(
                "Expected echo {:#04x}, got {:#04x}",
                frame.tx[1], frame.rx[2]
            )));
        }

        Ok(())
    }

    fn chip_erase(&mut self, part: &Part) -> AvrResult<()> {
        let frame =
            CommandFrame::for_part(part, Operation::ChipErase).map_err(|e| self.fail(e))?;

        // The erase is confirmed indirectly by the handshake below.
        if let Err(e) = self.cmd(&frame.tx) {
            warn!("Chip erase transfer failed, continuing: {}", e);
        }

        thread::sleep(Duration::from_micros(part.chip_erase_delay.into()));

        // Erasing drops the target out of programming mode.
        match self.run_handshake(part) {
            HandshakeOutcome::Enabled { .. } => debug!("{} erased", part.desc),
            HandshakeOutcome::Failed(failure) => {
                warn!(
                    "{} did not re-enter programming mode after erase: {:?}",
                    part.desc, failure
                );
                self.sink.report("AVR device not responding");
            }
        }

        Ok(())
    }

    fn cmd(&mut self, cmd: &[u8; CMD_FRAME_LEN]) -> AvrResult<[u8; CMD_FRAME_LEN]> {
        let Some(port) = self.state.as_ref().and_then(|s| s.port.as_deref()) else {
            return Err(self.fail(AvrError::ConfigurationError("No SPI port opened".into())));
        };

        let mut res = [0u8; CMD_FRAME_LEN];
        match self.transport.duplex(port, cmd, &mut res) {
            Ok(CMD_FRAME_LEN) => Ok(res),
            Ok(n) => Err(self.fail(AvrError::Transport(format!(
                "Unable to send SPI message: {} of {} bytes transferred",
                n, CMD_FRAME_LEN
            )))),
            Err(e) => Err(self.fail(e)),
        }
    }
}
