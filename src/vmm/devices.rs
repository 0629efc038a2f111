//! Port-mapped devices and the table that routes guest port I/O to them.
//!
//! Guest-facing ABI. Every access is a single byte with a repeat count of one;
//! anything else stops the monitor.
//!
//! | Port | Dir | Effect |
//! |------|-----|--------|
//! | 0x42 | out | append to the console line |
//! | 0x44 | in  | last key received |
//! | 0x45 | in  | 1 if a key is available, else 0 |
//! | 0x45 | out | set key availability (write 0 to acknowledge) |
//! | 0x46 | out | timer interval in milliseconds |
//! | 0x47 | in  | timer status (bit 0 enabled, bit 1 fired) |
//! | 0x47 | out | replace timer status; see [`timer`] |

pub mod console;
pub mod keyboard;
pub mod timer;

use std::io::Write;

use log::trace;

use self::console::Console;
use self::keyboard::Keyboard;
use self::timer::{Clock, Timer};
use super::event_loop::PortIoHandler;
use crate::config::VmConfig;
use crate::error::{Result, VmmError};
use crate::types::{Direction, IoAccess};


pub const CONSOLE_PORT: u16 = 0x42;
pub const KEYBOARD_DATA_PORT: u16 = 0x44;
pub const KEYBOARD_STATUS_PORT: u16 = 0x45;
pub const TIMER_INTERVAL_PORT: u16 = 0x46;
pub const TIMER_STATUS_PORT: u16 = 0x47;


/// Byte-wide register interface shared by every device.
pub trait PortDevice {
    fn read(&mut self, port: u16) -> Result<u8>;
    fn write(&mut self, port: u16, value: u8) -> Result<()>;
}


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceId {
    Console,
    Keyboard,
    Timer,
}


pub const PORT_MAP: &[(u16, Direction, DeviceId)] = &[
    (CONSOLE_PORT, Direction::Out, DeviceId::Console),
    (KEYBOARD_DATA_PORT, Direction::In, DeviceId::Keyboard),
    (KEYBOARD_STATUS_PORT, Direction::In, DeviceId::Keyboard),
    (KEYBOARD_STATUS_PORT, Direction::Out, DeviceId::Keyboard),
    (TIMER_INTERVAL_PORT, Direction::Out, DeviceId::Timer),
    (TIMER_STATUS_PORT, Direction::In, DeviceId::Timer),
    (TIMER_STATUS_PORT, Direction::Out, DeviceId::Timer),
];


pub fn route(port: u16, direction: Direction) -> Option<DeviceId> {
    PORT_MAP
        .iter()
        .find(|(p, d, _)| *p == port && *d == direction)
        .map(|(_, _, id)| *id)
}


/// All device state, owned by the exit loop and touched only between resumes.
pub struct DeviceContext<W: Write, C: Clock> {
    pub console: Console<W>,
    pub keyboard: Keyboard,
    pub timer: Timer<C>,
}


impl<W: Write, C: Clock> DeviceContext<W, C> {
    pub fn new(config: &VmConfig, out: W, clock: C) -> Self {
        Self {
            console: Console::new(out, &config.console),
            keyboard: Keyboard::new(),
            timer: Timer::new(clock),
        }
    }

    fn device(&mut self, id: DeviceId) -> &mut dyn PortDevice {
        match id {
            DeviceId::Console => &mut self.console,
            DeviceId::Keyboard => &mut self.keyboard,
            DeviceId::Timer => &mut self.timer,
        }
    }
}


impl<W: Write, C: Clock> PortIoHandler for DeviceContext<W, C> {
    fn port_io(&mut self, port: u16, access: IoAccess<'_>) -> Result<()> {
        let direction = access.direction();
        let size = access.len();
        let id = route(port, direction)
            .filter(|_| size == 1)
            .ok_or(VmmError::UnhandledPortIo { direction, port, size })?;

        match access {
            IoAccess::In(data) => {
                data[0] = self.device(id).read(port)?;
                trace!("in  {:#04x} -> {:#04x}", port, data[0]);
            }
            IoAccess::Out(data) => {
                trace!("out {:#04x} <- {:#04x}", port, data[0]);
                self.device(id).write(port, data[0])?;
            }
        }
        Ok(())
    }
}
