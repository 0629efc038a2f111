//! flatvmm: a single-vCPU KVM monitor for flat guest binaries.
//!
//! The guest is loaded verbatim at guest-physical 0x1000 and started in real
//! mode. It talks to the host only through port I/O:
//!
//! - [`vmm::devices::console`]: line-buffered output on port 0x42
//! - [`vmm::devices::keyboard`]: host keystrokes on ports 0x44/0x45
//! - [`vmm::devices::timer`]: periodic timer on ports 0x46/0x47
//!
//! [`vmm::event_loop::VmLoop`] resumes the vCPU and routes each exit. Any
//! exit it does not model is an error.


pub mod config;
pub mod error;
pub mod types;
pub mod vmm;


pub use crate::config::VmConfig;
pub use crate::error::{Result, VmmError};
pub use crate::types::{RunOutcome, RunSummary};
