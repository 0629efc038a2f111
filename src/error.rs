use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::Direction;


/// Every unrecoverable condition of the monitor. None of these is retried; the
/// binary reports the error and exits non-zero.
#[derive(Error, Debug)]
pub enum VmmError {
    #[error("unable to read guest image {}", .path.display())]
    ImageRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("guest image is {len} bytes, guest memory holds {capacity}")]
    ImageTooLarge { len: usize, capacity: usize },

    #[error("failed to open /dev/kvm")]
    KvmOpen(#[source] kvm_ioctls::Error),

    #[error("unsupported host interface: KVM API version {found}, expected {expected}")]
    UnsupportedApiVersion { found: i32, expected: i32 },

    #[error("failed to create VM")]
    VmCreate(#[source] kvm_ioctls::Error),

    #[error("failed to allocate {size:#x} bytes of guest memory at {base:#x}")]
    GuestMemoryCreate { base: u64, size: usize },

    #[error("failed to access guest memory")]
    GuestMemoryAccess(#[source] vm_memory::GuestMemoryError),

    #[error("failed to set user memory region")]
    SetUserMemoryRegion(#[source] kvm_ioctls::Error),

    #[error("failed to create vCPU")]
    VcpuCreate(#[source] kvm_ioctls::Error),

    #[error("failed to query vCPU mmap size")]
    VcpuMmapSize(#[source] kvm_ioctls::Error),

    #[error("vCPU mmap size {found} is smaller than kvm_run ({required})")]
    VcpuMmapTooSmall { found: usize, required: usize },

    #[error("failed to get vCPU special registers")]
    GetSregs(#[source] kvm_ioctls::Error),

    #[error("failed to set vCPU special registers")]
    SetSregs(#[source] kvm_ioctls::Error),

    #[error("failed to get vCPU registers")]
    GetRegisters(#[source] kvm_ioctls::Error),

    #[error("failed to set vCPU registers")]
    SetRegisters(#[source] kvm_ioctls::Error),

    #[error("failed to run vCPU")]
    VcpuRun(#[source] kvm_ioctls::Error),

    #[error("unhandled port I/O: {direction} port {port:#x}, {size} byte(s)")]
    UnhandledPortIo {
        direction: Direction,
        port: u16,
        size: usize,
    },

    #[error(
        "unexpected MMIO exit: phys_addr {address:#x}, data {}, len {len}, is_write {is_write}",
        hex_bytes(.data)
    )]
    UnexpectedMmio {
        address: u64,
        len: usize,
        is_write: bool,
        data: Vec<u8>,
    },

    #[error("KVM_EXIT_FAIL_ENTRY: hardware_entry_failure_reason = {reason:#x}")]
    EntryFailure { reason: u64 },

    #[error("KVM_EXIT_INTERNAL_ERROR: suberror = {suberror:#x}")]
    InternalError { suberror: u32 },

    #[error("unknown exit reason {code:#x}")]
    UnknownExit { code: u32 },

    #[error("console output failed")]
    Console(#[source] io::Error),

    #[error("terminal error")]
    Terminal(#[source] io::Error),

    #[error("failed to install signal handler")]
    Signal(#[source] vmm_sys_util::errno::Error),
}


pub type Result<T> = std::result::Result<T, VmmError>;


fn hex_bytes(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unhandled_port_io_names_the_access() {
        let err = VmmError::UnhandledPortIo {
            direction: Direction::Out,
            port: 0x50,
            size: 1,
        };
        assert_eq!(err.to_string(), "unhandled port I/O: out port 0x50, 1 byte(s)");
    }

    #[test]
    fn mmio_diagnostic_lists_data_bytes() {
        let err = VmmError::UnexpectedMmio {
            address: 0xd000_0000,
            len: 2,
            is_write: true,
            data: vec![0xab, 0x01],
        };
        let msg = err.to_string();
        assert!(msg.contains("phys_addr 0xd0000000"), "{msg}");
        assert!(msg.contains("data ab 01"), "{msg}");
        assert!(msg.contains("is_write true"), "{msg}");
    }

    #[test]
    fn api_mismatch_mentions_both_versions() {
        let err = VmmError::UnsupportedApiVersion {
            found: 11,
            expected: 12,
        };
        assert!(err.to_string().contains("version 11, expected 12"));
    }

    #[test]
    fn cause_is_chained_not_repeated() {
        let err = VmmError::ImageRead {
            path: PathBuf::from("/nonexistent/guest.bin"),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        let msg = err.to_string();
        assert_eq!(msg, "unable to read guest image /nonexistent/guest.bin");

        let cause = std::error::Error::source(&err).unwrap().to_string();
        assert!(!msg.contains(&cause), "{msg}");

        let chained = format!("{:#}", anyhow::Error::new(err));
        assert_eq!(chained.matches(cause.as_str()).count(), 1, "{chained}");
    }
}
