/// Every ISP command is four bytes out, four bytes back.
pub const CMD_FRAME_LEN: usize = 4;

pub(crate) const SPI_DELAY_USECS: u16 = 1;
/// Settles around 400 kHz on most controllers, the usual ISP speed.
pub(crate) const SPI_SPEED_HZ: u32 = 500_000;
pub(crate) const SPI_BITS_PER_WORD: u8 = 8;

pub const PROGRAM_ENABLE_ATTEMPTS: u32 = 65;

/// Placeholder port handed over by callers that never got a real one.
pub(crate) const UNKNOWN_PORT: &str = "unknown";

pub(crate) const PROGNAME: &str = "avrspi";
