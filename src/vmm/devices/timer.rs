//! Auto-repeating interval timer on ports 0x46 (interval) and 0x47 (status).
//!
//! Status byte layout:
//!
//! | bit | meaning |
//! |-----|---------|
//! | 0   | enabled |
//! | 1   | fire pending |
//!
//! A guest write to 0x47 replaces the whole byte. Writing `0x01` to keep the
//! timer running therefore also acknowledges a pending fire; guests that want
//! to preserve a pending fire must read the byte first and write it back.

use std::time::{Duration, Instant};

use log::trace;

use super::{PortDevice, TIMER_INTERVAL_PORT, TIMER_STATUS_PORT};
use crate::error::{Result, VmmError};
use crate::types::Direction;


pub const TIMER_ENABLED: u8 = 1 << 0;
pub const TIMER_FIRED: u8 = 1 << 1;


/// Source of the host's monotonic time.
pub trait Clock {
    fn now(&self) -> Instant;
}


#[derive(Debug, Default, Clone, Copy)]
pub struct HostClock;


impl Clock for HostClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}


pub struct Timer<C: Clock> {
    clock: C,
    enabled: bool,
    interval_ms: u8,
    started: Instant,
    status: u8,
    fires: u64,
}


impl<C: Clock> Timer<C> {
    pub fn new(clock: C) -> Self {
        let started = clock.now();
        Self { clock, enabled: false, interval_ms: 0, started, status: 0, fires: 0 }
    }

    /// Sets the fire bit once `interval` has elapsed since the baseline and
    /// moves the baseline to the sampled time. Several missed periods collapse
    /// into one fire.
    pub fn tick(&mut self) {
        if !self.enabled {
            return;
        }
        let now = self.clock.now();
        let elapsed = now.saturating_duration_since(self.started);
        if elapsed >= Duration::from_millis(self.interval_ms as u64) {
            self.status |= TIMER_FIRED;
            self.started = now;
            self.fires += 1;
            trace!("timer fired after {:?}", elapsed);
        }
    }

    fn set_status(&mut self, value: u8) {
        let was_enabled = self.enabled;
        self.status = value;
        self.enabled = value & TIMER_ENABLED != 0;
        if self.enabled && !was_enabled {
            self.started = self.clock.now();
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn interval_ms(&self) -> u8 {
        self.interval_ms
    }

    pub fn status(&self) -> u8 {
        self.status
    }

    pub fn fires(&self) -> u64 {
        self.fires
    }
}


impl<C: Clock> PortDevice for Timer<C> {
    fn read(&mut self, port: u16) -> Result<u8> {
        match port {
            TIMER_STATUS_PORT => Ok(self.status),
            _ => Err(VmmError::UnhandledPortIo { direction: Direction::In, port, size: 1 }),
        }
    }

    fn write(&mut self, port: u16, value: u8) -> Result<()> {
        match port {
            TIMER_INTERVAL_PORT => {
                self.interval_ms = value;
                Ok(())
            }
            TIMER_STATUS_PORT => {
                self.set_status(value);
                Ok(())
            }
            _ => Err(VmmError::UnhandledPortIo { direction: Direction::Out, port, size: 1 }),
        }
    }
}
