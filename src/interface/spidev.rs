use std::fs::OpenOptions;
use std::os::unix::io::AsRawFd;

use tracing::trace;

use super::DuplexTransport;
use crate::constants::{SPI_BITS_PER_WORD, SPI_DELAY_USECS, SPI_SPEED_HZ};
use crate::error::{AvrError, AvrResult};

mod ioctl {
    use super::SpiIocTransfer;

    const SPI_IOC_MAGIC: u8 = b'k';
    const SPI_IOC_NR_MESSAGE: u8 = 0;

    // SPI_IOC_MESSAGE(n) is _IOW('k', 0, n * sizeof(spi_ioc_transfer)), which
    // is what a write-buffer ioctl over a slice of transfers computes.
    nix::ioctl_write_buf!(
        spi_ioc_message,
        SPI_IOC_MAGIC,
        SPI_IOC_NR_MESSAGE,
        SpiIocTransfer
    );
}

/// Kernel `struct spi_ioc_transfer`
#[repr(C)]
#[derive(Debug, Default, Clone)]
pub(crate) struct SpiIocTransfer {
    tx_buf: u64,
    rx_buf: u64,
    len: u32,
    speed_hz: u32,
    delay_usecs: u16,
    bits_per_word: u8,
    cs_change: u8,
    tx_nbits: u8,
    rx_nbits: u8,
    word_delay_usecs: u8,
    _pad: u8,
}

/// Transfers through a Linux `/dev/spidevX.Y` node.
///
/// The clock is fixed; any speed configured elsewhere is ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpidevTransport;

impl SpidevTransport {
    pub fn new() -> Self {
        SpidevTransport
    }
}

impl DuplexTransport for SpidevTransport {
    fn duplex(&mut self, port: &str, tx: &[u8], rx: &mut [u8]) -> AvrResult<usize> {
        if tx.len() != rx.len() {
            return Err(AvrError::Transport(format!(
                "Transmit and receive buffers differ in length ({} vs {})",
                tx.len(),
                rx.len()
            )));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(port)
            .map_err(|e| AvrError::Transport(format!("Unable to open SPI port {}: {}", port, e)))?;

        let transfer = [SpiIocTransfer {
            tx_buf: tx.as_ptr() as u64,
            rx_buf: rx.as_mut_ptr() as u64,
            len: tx.len() as u32,
            speed_hz: SPI_SPEED_HZ,
            delay_usecs: SPI_DELAY_USECS,
            bits_per_word: SPI_BITS_PER_WORD,
            ..Default::default()
        }];

        // SAFETY: both buffers outlive the call and are `len` bytes long.
        let ret = unsafe { ioctl::spi_ioc_message(file.as_raw_fd(), &transfer) };
        drop(file);

        let sent =
            ret.map_err(|e| AvrError::Transport(format!("Unable to send SPI message: {}", e)))?;
        if sent < 0 || sent as usize != tx.len() {
            return Err(AvrError::Transport(format!(
                "Unable to send SPI message: {} of {} bytes transferred",
                sent,
                tx.len()
            )));
        }

        trace!("SPI {:02x?} -> {:02x?}", tx, rx);
        Ok(sent as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_struct_matches_kernel_layout() {
        assert_eq!(std::mem::size_of::<SpiIocTransfer>(), 32);
    }

    #[test]
    fn missing_device_is_transport_error() {
        let mut rx = [0u8; 4];
        let err = SpidevTransport::new()
            .duplex("/dev/spidev-does-not-exist", &[0xac, 0x53, 0, 0], &mut rx)
            .unwrap_err();
        assert!(matches!(err, AvrError::Transport(_)));
    }

    #[test]
    fn non_spi_file_is_transport_error() {
        let path = std::env::temp_dir().join(format!("avrspi-not-spidev-{}", std::process::id()));
        std::fs::write(&path, [0u8; 4]).unwrap();

        let mut rx = [0u8; 4];
        let result =
            SpidevTransport::new().duplex(path.to_str().unwrap(), &[0xac, 0x53, 0, 0], &mut rx);
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(result, Err(AvrError::Transport(_))));
    }

    #[test]
    fn unequal_buffers_rejected_before_open() {
        let mut rx = [0u8; 3];
        let err = SpidevTransport::new()
            .duplex("/dev/spidev-does-not-exist", &[0; 4], &mut rx)
            .unwrap_err();
        assert_eq!(
            err,
            AvrError::Transport("Transmit and receive buffers differ in length (4 vs 3)".into())
        );
    }
}
