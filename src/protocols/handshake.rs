//! Program-enable handshake.
//!
//! After reset the target only answers ISP instructions once it has
//! acknowledged Programming Enable by echoing the second command byte back
//! in the third response byte. The echo can take a few tries while the
//! target powers up, so attempts are repeated up to a fixed ceiling.

use tracing::{debug, trace};

use crate::constants::PROGRAM_ENABLE_ATTEMPTS;
use crate::error::{AvrError, AvrResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeFailure {
    /// A transport or configuration error stopped the handshake early.
    Aborted { attempts: u32, error: AvrError },
    /// The target never echoed.
    Exhausted { attempts: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeState {
    Idle,
    /// `attempts` have been made so far, all without an echo.
    Attempting { attempts: u32 },
    Enabled { attempts: u32 },
    Failed(HandshakeFailure),
}

/// Where a completed handshake ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
    Enabled { attempts: u32 },
    Failed(HandshakeFailure),
}

#[derive(Debug, Clone)]
pub struct ProgramEnableHandshake {
    max_attempts: u32,
    state: HandshakeState,
}

impl Default for ProgramEnableHandshake {
    fn default() -> Self {
        Self::new(PROGRAM_ENABLE_ATTEMPTS)
    }
}

impl ProgramEnableHandshake {
    pub fn new(max_attempts: u32) -> Self {
        ProgramEnableHandshake {
            max_attempts: max_attempts.max(1),
            state: HandshakeState::Idle,
        }
    }

    pub fn state(&self) -> &HandshakeState {
        &self.state
    }

    /// Feed in the result of one program-enable attempt.
    ///
    /// `Err(AvrError::Protocol)` means the echo did not match and is the
    /// only error that leads to another attempt. Calls after a terminal
    /// state has been reached are ignored.
    pub fn advance(&mut self, attempt: AvrResult<()>) -> &HandshakeState {
        let attempts = match self.state {
            HandshakeState::Idle => 1,
            HandshakeState::Attempting { attempts } => attempts + 1,
            _ => return &self.state,
        };

        self.state = match attempt {
            Ok(()) => HandshakeState::Enabled { attempts },
            Err(AvrError::Protocol(reason)) => {
                trace!("Program enable attempt {} rejected: {}", attempts, reason);
                if attempts >= self.max_attempts {
                    HandshakeState::Failed(HandshakeFailure::Exhausted { attempts })
                } else {
                    HandshakeState::Attempting { attempts }
                }
            }
            Err(error) => HandshakeState::Failed(HandshakeFailure::Aborted { attempts, error }),
        };
        &self.state
    }

    /// Run attempts until a terminal state is reached.
    pub fn run<F>(mut self, mut attempt: F) -> HandshakeOutcome
    where
        F: FnMut() -> AvrResult<()>,
    {
        loop {
            let result = attempt();
            let outcome = match self.advance(result) {
                HandshakeState::Enabled { attempts } => HandshakeOutcome::Enabled {
                    attempts: *attempts,
                },
                HandshakeState::Failed(failure) => HandshakeOutcome::Failed(failure.clone()),
                HandshakeState::Idle | HandshakeState::Attempting { .. } => continue,
            };
            debug!("Program enable handshake finished: {:?}", outcome);
            return outcome;
        }
    }
}
