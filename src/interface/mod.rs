pub mod spidev;

use crate::error::AvrResult;

pub use spidev::SpidevTransport;

/// One shot full-duplex SPI exchange.
///
/// Implementations open `port`, clock `tx` out while filling `rx`, and
/// close the port again before returning. Nothing is kept between calls.
pub trait DuplexTransport {
    /// Returns the number of bytes exchanged, which is always `tx.len()`.
    fn duplex(&mut self, port: &str, tx: &[u8], rx: &mut [u8]) -> AvrResult<usize>;
}
