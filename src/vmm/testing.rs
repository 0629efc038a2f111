//! Test doubles for the host-facing seams: vCPU, keyboard and clock.

use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::{Duration, Instant};

use super::devices::timer::Clock;
use super::event_loop::{KeyInput, PortIoHandler, Vcpu};
use crate::error::Result;
use crate::types::{Direction, ExitEvent, IoAccess};


/// Clock that only moves when told to. Clones share the same time.
#[derive(Clone)]
pub struct ManualClock {
    now: Rc<Cell<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self { now: Rc::new(Cell::new(Instant::now())) }
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.get()
    }
}


/// One scripted guest exit.
pub enum Step {
    Halt,
    /// 1-byte `out` of a value to a port.
    Out(u16, u8),
    /// 1-byte `in` from a port; the value read is recorded.
    In(u16),
    /// Host time passes during the resume, which then reports an interrupt.
    Wait(Duration),
    Exit(ExitEvent),
}


pub struct ScriptedVcpu {
    steps: VecDeque<Step>,
    resumes: usize,
    reads: Vec<(u16, u8)>,
    clock: Option<ManualClock>,
    hook: Option<Box<dyn FnMut(usize)>>,
}

impl ScriptedVcpu {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps: steps.into(), resumes: 0, reads: Vec::new(), clock: None, hook: None }
    }

    pub fn attach_clock(&mut self, clock: ManualClock) {
        self.clock = Some(clock);
    }

    /// Runs `hook` with the 1-based resume count at the start of every resume.
    pub fn on_resume<F: FnMut(usize) + 'static>(&mut self, hook: F) {
        self.hook = Some(Box::new(hook));
    }

    pub fn resumes(&self) -> usize {
        self.resumes
    }

    pub fn reads(&self) -> &[(u16, u8)] {
        &self.reads
    }
}

impl Vcpu for ScriptedVcpu {
    fn resume(&mut self, io: &mut dyn PortIoHandler) -> Result<ExitEvent> {
        self.resumes += 1;
        if let Some(hook) = self.hook.as_mut() {
            hook(self.resumes);
        }
        let step = self
            .steps
            .pop_front()
            .unwrap_or_else(|| panic!("vCPU resumed after the script ended (resume {})", self.resumes));
        match step {
            Step::Halt => Ok(ExitEvent::Halt),
            Step::Out(port, value) => {
                io.port_io(port, IoAccess::Out(&[value]))?;
                Ok(ExitEvent::PortIo { port, direction: Direction::Out, size: 1 })
            }
            Step::In(port) => {
                let mut data = [0u8];
                io.port_io(port, IoAccess::In(&mut data))?;
                self.reads.push((port, data[0]));
                Ok(ExitEvent::PortIo { port, direction: Direction::In, size: 1 })
            }
            Step::Wait(by) => {
                if let Some(clock) = &self.clock {
                    clock.advance(by);
                }
                Ok(ExitEvent::Interrupted)
            }
            Step::Exit(exit) => Ok(exit),
        }
    }
}


/// Keyboard that yields a fixed sequence of poll results, then nothing.
pub struct ScriptedInput {
    polls: VecDeque<Option<u8>>,
}

impl ScriptedInput {
    pub fn new(polls: Vec<Option<u8>>) -> Self {
        Self { polls: polls.into() }
    }

    pub fn idle() -> Self {
        Self::new(Vec::new())
    }
}

impl KeyInput for ScriptedInput {
    fn poll_key(&mut self) -> Result<Option<u8>> {
        Ok(self.polls.pop_front().flatten())
    }
}
