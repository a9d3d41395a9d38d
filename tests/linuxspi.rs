#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use avrspi::diagnostics::MemorySink;
    use avrspi::error::{AvrError, AvrResult};
    use avrspi::interface::DuplexTransport;
    use avrspi::protocols::linuxspi::LinuxSpi;
    use avrspi::{Microcontroller, Programmer, part_for_mcu};

    /// Enough of an ATmega328P to answer ISP instructions. Like the real
    /// thing it shifts each byte back one position late.
    struct Target {
        enabled: bool,
        refuse_enable: u32,
        transfers: Vec<Vec<u8>>,
        eeprom: Vec<u8>,
        flash: Vec<u8>,
        lock: u8,
    }

    impl Target {
        fn new() -> Self {
            Target {
                enabled: false,
                refuse_enable: 0,
                transfers: Vec::new(),
                eeprom: vec![0xff; 1024],
                flash: (0..=255).cycle().take(32768).collect(),
                lock: 0xff,
            }
        }

        fn respond(&mut self, tx: &[u8]) -> [u8; 4] {
            let mut rx = [0, tx[0], tx[1], tx[2]];
            if tx[0] == 0xac && tx[1] == 0x53 {
                if self.refuse_enable > 0 {
                    self.refuse_enable -= 1;
                    return [0; 4];
                }
                self.enabled = true;
                return rx;
            }
            if !self.enabled {
                return [0; 4];
            }

            let addr = ((tx[1] as usize) << 8) | tx[2] as usize;
            match tx[0] {
                // The two unused lock bits always read back as one.
                0xac if tx[1] & 0xe0 == 0xe0 => self.lock = tx[3] | 0xc0,
                0xac if tx[1] & 0xe0 == 0x80 => {
                    self.eeprom.fill(0xff);
                    self.flash.fill(0xff);
                    self.enabled = false;
                }
                0x30 => rx[3] = [0x1e, 0x95, 0x0f][tx[2] as usize & 0x03],
                0xa0 => rx[3] = self.eeprom[addr & 0x3ff],
                0xc0 => self.eeprom[addr & 0x3ff] = tx[3],
                0x20 => rx[3] = self.flash[(addr & 0x3fff) * 2],
                0x28 => rx[3] = self.flash[(addr & 0x3fff) * 2 + 1],
                0x58 if tx[1] == 0x00 => rx[3] = self.lock,
                _ => {}
            }
            rx
        }
    }

    #[derive(Clone)]
    struct FakeSpidev(Arc<Mutex<Target>>);

    impl DuplexTransport for FakeSpidev {
        fn duplex(&mut self, port: &str, tx: &[u8], rx: &mut [u8]) -> AvrResult<usize> {
            if port != "/dev/spidev0.0" {
                return Err(AvrError::Transport(format!("Unable to open SPI port {}", port)));
            }
            let mut target = self.0.lock().unwrap();
            target.transfers.push(tx.to_vec());
            rx.copy_from_slice(&target.respond(tx));
            Ok(tx.len())
        }
    }

    fn session(target: &Arc<Mutex<Target>>, port: &str) -> (AvrResult<Programmer>, MemorySink) {
        let sink = MemorySink::new();
        let transport = FakeSpidev(target.clone());
        let backend = LinuxSpi::with_transport(transport, Box::new(sink.clone()));
        let part = part_for_mcu(Microcontroller::Atmega328p).unwrap();
        (Programmer::from_backend(Box::new(backend), part, port), sink)
    }

    fn transfers(target: &Arc<Mutex<Target>>) -> usize {
        target.lock().unwrap().transfers.len()
    }

    #[test]
    fn probe_reads_signature() {
        let target = Arc::new(Mutex::new(Target::new()));
        target.lock().unwrap().refuse_enable = 3;
        let (programmer, sink) = session(&target, "/dev/spidev0.0");
        let mut programmer = programmer.unwrap();

        programmer.initialize().unwrap();
        assert_eq!(transfers(&target), 4);
        assert_eq!(programmer.read_signature().unwrap(), [0x1e, 0x95, 0x0f]);
        assert!(sink.messages().is_empty());
    }

    #[test]
    fn unknown_port_fails_before_any_transfer() {
        let target = Arc::new(Mutex::new(Target::new()));
        let (programmer, sink) = session(&target, "unknown");

        assert!(programmer.err().unwrap().is_fatal());
        assert_eq!(transfers(&target), 0);
        assert_eq!(
            sink.messages(),
            vec!["Fatal: No port specified. Port should point to an SPI interface."]
        );
    }

    #[test]
    fn memory_access_needs_programming_mode() {
        let target = Arc::new(Mutex::new(Target::new()));
        let (programmer, _) = session(&target, "/dev/spidev0.0");
        let mut programmer = programmer.unwrap();

        assert!(programmer.read_memory("eeprom", 0, 4).is_err());
        assert!(programmer.chip_erase().is_err());
        assert_eq!(transfers(&target), 0);
    }

    #[test]
    fn silent_target_is_not_responding() {
        let target = Arc::new(Mutex::new(Target::new()));
        target.lock().unwrap().refuse_enable = u32::MAX;
        let (programmer, sink) = session(&target, "/dev/spidev0.0");
        let mut programmer = programmer.unwrap();

        assert!(matches!(programmer.initialize(), Err(AvrError::Protocol(_))));
        assert_eq!(transfers(&target), 65);
        assert_eq!(sink.messages(), vec!["AVR device not responding"]);
        assert!(programmer.read_signature().is_err());
    }

    #[test]
    fn missing_device_aborts_handshake() {
        let target = Arc::new(Mutex::new(Target::new()));
        let (programmer, _) = session(&target, "/dev/spidev9.9");
        let mut programmer = programmer.unwrap();

        assert!(matches!(programmer.initialize(), Err(AvrError::Transport(_))));
    }

    #[test]
    fn eeprom_write_then_read() {
        let target = Arc::new(Mutex::new(Target::new()));
        let (programmer, _) = session(&target, "/dev/spidev0.0");
        let mut programmer = programmer.unwrap();
        programmer.initialize().unwrap();

        programmer.write_memory("eeprom", 0x1fe, &[0x12, 0x34, 0xff]).unwrap();
        assert_eq!(
            programmer.read_memory("eeprom", 0x1fd, 5).unwrap(),
            vec![0xff, 0x12, 0x34, 0xff, 0xff]
        );
        assert_eq!(target.lock().unwrap().eeprom[0x1ff], 0x34);
    }

    #[test]
    fn flash_bytes_come_from_low_and_high_instructions() {
        let target = Arc::new(Mutex::new(Target::new()));
        let (programmer, _) = session(&target, "/dev/spidev0.0");
        let mut programmer = programmer.unwrap();
        programmer.initialize().unwrap();

        assert_eq!(
            programmer.read_memory("flash", 0x201, 3).unwrap(),
            vec![0x01, 0x02, 0x03]
        );
        let target = target.lock().unwrap();
        let last = &target.transfers[target.transfers.len() - 3..];
        assert_eq!(last[0][..3], [0x28, 0x01, 0x00]);
        assert_eq!(last[1][..3], [0x20, 0x01, 0x01]);
        assert_eq!(last[2][..3], [0x28, 0x01, 0x01]);
    }

    #[test]
    fn chip_erase_re_enters_programming_mode() {
        let target = Arc::new(Mutex::new(Target::new()));
        target.lock().unwrap().eeprom[0] = 0x42;
        let (programmer, _) = session(&target, "/dev/spidev0.0");
        let mut programmer = programmer.unwrap();
        programmer.initialize().unwrap();

        programmer.chip_erase().unwrap();
        assert!(target.lock().unwrap().enabled);
        assert_eq!(programmer.read_memory("eeprom", 0, 1).unwrap(), vec![0xff]);
    }

    #[test]
    fn silent_target_after_erase_needs_initialize() {
        let target = Arc::new(Mutex::new(Target::new()));
        let (programmer, sink) = session(&target, "/dev/spidev0.0");
        let mut programmer = programmer.unwrap();
        programmer.initialize().unwrap();
        target.lock().unwrap().refuse_enable = u32::MAX;
        let before = transfers(&target);

        programmer.chip_erase().unwrap();
        assert_eq!(transfers(&target), before + 1 + 65);
        assert_eq!(sink.messages(), vec!["AVR device not responding"]);

        assert!(programmer.read_memory("eeprom", 0, 1).is_err());
        assert_eq!(transfers(&target), before + 1 + 65);

        target.lock().unwrap().refuse_enable = 0;
        programmer.initialize().unwrap();
        assert_eq!(programmer.read_memory("eeprom", 0, 1).unwrap(), vec![0xff]);
    }

    #[test]
    fn lock_write_confirms_returned_bits_only() {
        let target = Arc::new(Mutex::new(Target::new()));
        let (programmer, sink) = session(&target, "/dev/spidev0.0");
        let mut programmer = programmer.unwrap();
        programmer.initialize().unwrap();

        programmer.write_memory("lock", 0, &[0xfc]).unwrap();
        assert_eq!(target.lock().unwrap().lock, 0xfc);
        assert_eq!(programmer.read_memory("lock", 0, 1).unwrap(), vec![0x3c]);
        assert!(sink.messages().is_empty());
    }

    #[test]
    fn out_of_range_read_is_rejected() {
        let target = Arc::new(Mutex::new(Target::new()));
        let (programmer, sink) = session(&target, "/dev/spidev0.0");
        let mut programmer = programmer.unwrap();
        programmer.initialize().unwrap();
        let before = transfers(&target);

        let err = programmer.read_memory("eeprom", 1020, 8).unwrap_err();
        assert!(matches!(err, AvrError::ConfigurationError(_)));
        assert!(programmer.read_memory("bootrom", 0, 1).is_err());
        assert_eq!(transfers(&target), before);
        assert_eq!(sink.messages().len(), 2);
    }

    #[test]
    fn tpi_parts_are_refused() {
        let target = Arc::new(Mutex::new(Target::new()));
        let transport = FakeSpidev(target.clone());
        let backend = LinuxSpi::with_transport(transport, Box::new(MemorySink::new()));
        let part = part_for_mcu(Microcontroller::Attiny10).unwrap();
        let mut programmer =
            Programmer::from_backend(Box::new(backend), part, "/dev/spidev0.0").unwrap();

        assert!(matches!(
            programmer.initialize(),
            Err(AvrError::UnsupportedOperation(_))
        ));
        assert_eq!(transfers(&target), 0);
    }
}
