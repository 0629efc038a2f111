use super::{PortDevice, KEYBOARD_DATA_PORT, KEYBOARD_STATUS_PORT};
use crate::error::{Result, VmmError};
use crate::types::Direction;


/// Single-slot keyboard latch.
///
/// A new host key always replaces the previous one, consumed or not. Reading
/// the data port leaves `available` untouched; the guest acknowledges a key by
/// writing zero to the status port.
#[derive(Debug, Default)]
pub struct Keyboard {
    available: bool,
    last_key: u8,
}


impl Keyboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key_pressed(&mut self, key: u8) {
        self.last_key = key;
        self.available = true;
    }

    pub fn available(&self) -> bool {
        self.available
    }

    pub fn last_key(&self) -> u8 {
        self.last_key
    }
}


impl PortDevice for Keyboard {
    fn read(&mut self, port: u16) -> Result<u8> {
        match port {
            KEYBOARD_DATA_PORT => Ok(self.last_key),
            KEYBOARD_STATUS_PORT => Ok(self.available as u8),
            _ => Err(VmmError::UnhandledPortIo { direction: Direction::In, port, size: 1 }),
        }
    }

    fn write(&mut self, port: u16, value: u8) -> Result<()> {
        match port {
            KEYBOARD_STATUS_PORT => {
                self.available = value != 0;
                Ok(())
            }
            _ => Err(VmmError::UnhandledPortIo { direction: Direction::Out, port, size: 1 }),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_sets_status_and_data() {
        let mut kbd = Keyboard::new();
        assert_eq!(kbd.read(KEYBOARD_STATUS_PORT).unwrap(), 0);

        kbd.key_pressed(b'x');
        assert_eq!(kbd.read(KEYBOARD_STATUS_PORT).unwrap(), 1);
        assert_eq!(kbd.read(KEYBOARD_DATA_PORT).unwrap(), b'x');
    }

    #[test]
    fn data_read_does_not_acknowledge() {
        let mut kbd = Keyboard::new();
        kbd.key_pressed(b'q');
        kbd.read(KEYBOARD_DATA_PORT).unwrap();
        kbd.read(KEYBOARD_DATA_PORT).unwrap();
        assert_eq!(kbd.read(KEYBOARD_STATUS_PORT).unwrap(), 1);
    }

    #[test]
    fn guest_clears_status() {
        let mut kbd = Keyboard::new();
        kbd.key_pressed(b'x');
        kbd.write(KEYBOARD_STATUS_PORT, 0).unwrap();
        assert_eq!(kbd.read(KEYBOARD_STATUS_PORT).unwrap(), 0);
        assert_eq!(kbd.read(KEYBOARD_DATA_PORT).unwrap(), b'x');
    }

    #[test]
    fn any_nonzero_status_write_reads_back_as_one() {
        let mut kbd = Keyboard::new();
        kbd.write(KEYBOARD_STATUS_PORT, 0x80).unwrap();
        assert_eq!(kbd.read(KEYBOARD_STATUS_PORT).unwrap(), 1);
    }

    #[test]
    fn newer_key_overwrites_unread_key() {
        let mut kbd = Keyboard::new();
        kbd.key_pressed(b'a');
        kbd.key_pressed(b'b');
        assert_eq!(kbd.read(KEYBOARD_DATA_PORT).unwrap(), b'b');
    }

    #[test]
    fn data_port_is_read_only() {
        let mut kbd = Keyboard::new();
        assert!(kbd.write(KEYBOARD_DATA_PORT, 1).is_err());
    }
}
