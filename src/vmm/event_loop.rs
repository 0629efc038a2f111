//! The exit-dispatch loop.
//!
//! One host thread owns the devices and alternates between host-side polling
//! and a blocking resume of the single vCPU. Each iteration runs, in order:
//!
//! 1. shutdown check,
//! 2. non-blocking keyboard poll,
//! 3. timer tick,
//! 4. vCPU resume; port I/O is serviced by the device router while the exit
//!    data is still borrowed from the vCPU,
//! 5. classification of the returned exit.
//!
//! The resume call is the only place the loop blocks. Device state is only
//! ever touched between one resume returning and the next one starting.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info};

use super::devices::timer::Clock;
use super::devices::DeviceContext;
use crate::error::{Result, VmmError};
use crate::types::{ExitEvent, IoAccess, RunOutcome, RunSummary};


/// Services a guest port access while its data window is live.
pub trait PortIoHandler {
    fn port_io(&mut self, port: u16, access: IoAccess<'_>) -> Result<()>;
}


/// A resumable virtual CPU.
pub trait Vcpu {
    /// Runs the guest until the next exit. Port exits are handed to `io`
    /// before returning.
    fn resume(&mut self, io: &mut dyn PortIoHandler) -> Result<ExitEvent>;
}


/// Host keyboard as seen by the loop.
pub trait KeyInput {
    /// Returns immediately; `None` when no key is waiting.
    fn poll_key(&mut self) -> Result<Option<u8>>;
}


pub struct VmLoop<W: Write, C: Clock> {
    pub devices: DeviceContext<W, C>,
    shutdown: &'static AtomicBool,
    summary: RunSummary,
}


impl<W: Write, C: Clock> VmLoop<W, C> {
    pub fn new(devices: DeviceContext<W, C>, shutdown: &'static AtomicBool) -> Self {
        Self { devices, shutdown, summary: RunSummary::default() }
    }

    pub fn run_until_exit<V, K>(&mut self, vcpu: &mut V, input: &mut K) -> Result<RunOutcome>
    where
        V: Vcpu,
        K: KeyInput,
    {
        let outcome = self.dispatch(vcpu, input);
        self.summary.console_lines = self.devices.console.lines_flushed();
        self.summary.timer_fires = self.devices.timer.fires();
        self.summary.outcome = outcome.as_ref().ok().copied();
        match serde_json::to_string(&self.summary) {
            Ok(json) => debug!("run summary: {}", json),
            Err(e) => debug!("run summary unavailable: {}", e),
        }
        outcome
    }

    fn dispatch<V: Vcpu, K: KeyInput>(&mut self, vcpu: &mut V, input: &mut K) -> Result<RunOutcome> {
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                info!("shutdown requested, leaving run loop");
                return Ok(RunOutcome::Cancelled);
            }

            if let Some(key) = input.poll_key()? {
                self.devices.keyboard.key_pressed(key);
            }

            self.devices.timer.tick();

            self.summary.resumes += 1;
            match vcpu.resume(&mut self.devices)? {
                ExitEvent::Halt => {
                    info!("guest halted");
                    return Ok(RunOutcome::Halted);
                }
                ExitEvent::PortIo { .. } => self.summary.port_io_exits += 1,
                ExitEvent::Interrupted => {
                    self.summary.interrupted_exits += 1;
                    debug!("vCPU run interrupted");
                }
                ExitEvent::Mmio { address, is_write, data } => {
                    return Err(VmmError::UnexpectedMmio { address, len: data.len(), is_write, data });
                }
                ExitEvent::EntryFailure { reason } => return Err(VmmError::EntryFailure { reason }),
                ExitEvent::InternalError { suberror } => {
                    return Err(VmmError::InternalError { suberror })
                }
                ExitEvent::Unknown { code } => return Err(VmmError::UnknownExit { code }),
            }
        }
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }
}
