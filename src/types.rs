use serde::Serialize;
use std::fmt;


/// Direction of a port access, seen from the guest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Direction {
    In,
    Out,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::In => write!(f, "in"),
            Direction::Out => write!(f, "out"),
        }
    }
}


/// Data window of a port exit. KVM lays out `width * count` bytes, so a plain
/// one-byte `in`/`out` is exactly a slice of length 1.
#[derive(Debug)]
pub enum IoAccess<'a> {
    /// Guest `in`: the monitor fills the slice.
    In(&'a mut [u8]),
    /// Guest `out`: the bytes the guest wrote.
    Out(&'a [u8]),
}

impl IoAccess<'_> {
    pub fn direction(&self) -> Direction {
        match self {
            IoAccess::In(_) => Direction::In,
            IoAccess::Out(_) => Direction::Out,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            IoAccess::In(data) => data.len(),
            IoAccess::Out(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}


/// One vCPU exit. Port accesses have already been serviced by the handler
/// passed to the resume call when the event is returned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExitEvent {
    Halt,
    PortIo { port: u16, direction: Direction, size: usize },
    Mmio { address: u64, is_write: bool, data: Vec<u8> },
    EntryFailure { reason: u64 },
    InternalError { suberror: u32 },
    Unknown { code: u32 },
    /// The resume call was interrupted by a host signal before the guest exited.
    Interrupted,
}


/// How the exit-dispatch loop ended when it did not fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Halted,
    Cancelled,
}


/// Counters gathered over one run, logged as JSON when the loop stops.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub resumes: u64,
    pub port_io_exits: u64,
    pub interrupted_exits: u64,
    pub console_lines: u64,
    pub timer_fires: u64,
    pub outcome: Option<RunOutcome>,
}
