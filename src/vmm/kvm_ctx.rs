use kvm_bindings::{
    kvm_run, kvm_userspace_memory_region, KVM_EXIT_DEBUG, KVM_EXIT_EXCEPTION, KVM_EXIT_INTR,
    KVM_EXIT_IRQ_WINDOW_OPEN, KVM_EXIT_NMI, KVM_EXIT_SHUTDOWN, KVM_EXIT_SYSTEM_EVENT,
    KVM_EXIT_UNKNOWN, KVM_EXIT_WATCHDOG,
};
use kvm_ioctls::{Kvm, VcpuExit, VcpuFd, VmFd};
use log::{debug, info};

use super::event_loop::{PortIoHandler, Vcpu};
use super::memory::GuestMem;
use crate::error::{Result, VmmError};
use crate::types::{Direction, ExitEvent, IoAccess};


/// Open KVM handle plus the one VM built on it.
pub struct KvmContext {
    pub kvm: Kvm,
    pub vm: VmFd,
}


impl KvmContext {
    pub fn new(expected_api: i32) -> Result<Self> {
        let kvm = Kvm::new().map_err(VmmError::KvmOpen)?;
        let found = kvm.get_api_version();
        if found != expected_api {
            return Err(VmmError::UnsupportedApiVersion { found, expected: expected_api });
        }
        let vm = kvm.create_vm().map_err(VmmError::VmCreate)?;
        info!("KVM API version {}, VM created", found);
        Ok(Self { kvm, vm })
    }

    /// Registers the guest region as slot 0. `mem` must outlive the VM.
    pub fn register_memory(&self, mem: &GuestMem) -> Result<()> {
        let region = kvm_userspace_memory_region {
            slot: 0,
            flags: 0,
            guest_phys_addr: mem.base().0,
            memory_size: mem.size() as u64,
            userspace_addr: mem.host_address()?,
        };
        // SAFETY: the host range comes from a live GuestMemoryMmap sized to
        // `memory_size`, and the caller keeps it mapped for the VM's lifetime.
        unsafe { self.vm.set_user_memory_region(region) }
            .map_err(VmmError::SetUserMemoryRegion)?;
        debug!(
            "slot 0: guest {:#x}..{:#x} -> host {:#x}",
            region.guest_phys_addr,
            region.guest_phys_addr + region.memory_size,
            region.userspace_addr
        );
        Ok(())
    }

    /// Creates vCPU 0 after checking the host's shared run area is large
    /// enough to hold `kvm_run`.
    pub fn create_vcpu(&self) -> Result<KvmVcpu> {
        let found = self.kvm.get_vcpu_mmap_size().map_err(VmmError::VcpuMmapSize)?;
        let required = std::mem::size_of::<kvm_run>();
        if found < required {
            return Err(VmmError::VcpuMmapTooSmall { found, required });
        }
        let fd = self.vm.create_vcpu(0).map_err(VmmError::VcpuCreate)?;
        debug!("vCPU 0 created, run area {} bytes", found);
        Ok(KvmVcpu { fd })
    }
}


pub struct KvmVcpu {
    pub fd: VcpuFd,
}


impl Vcpu for KvmVcpu {
    fn resume(&mut self, io: &mut dyn PortIoHandler) -> Result<ExitEvent> {
        let exit = match self.fd.run() {
            Ok(exit) => exit,
            Err(e) if e.errno() == libc::EINTR || e.errno() == libc::EAGAIN => {
                return Ok(ExitEvent::Interrupted)
            }
            Err(e) => return Err(VmmError::VcpuRun(e)),
        };
        match exit {
            VcpuExit::Hlt => Ok(ExitEvent::Halt),
            VcpuExit::IoIn(port, data) => {
                let size = data.len();
                io.port_io(port, IoAccess::In(data))?;
                Ok(ExitEvent::PortIo { port, direction: Direction::In, size })
            }
            VcpuExit::IoOut(port, data) => {
                let size = data.len();
                io.port_io(port, IoAccess::Out(data))?;
                Ok(ExitEvent::PortIo { port, direction: Direction::Out, size })
            }
            VcpuExit::MmioRead(address, data) => {
                Ok(ExitEvent::Mmio { address, is_write: false, data: data.to_vec() })
            }
            VcpuExit::MmioWrite(address, data) => {
                Ok(ExitEvent::Mmio { address, is_write: true, data: data.to_vec() })
            }
            VcpuExit::FailEntry(reason, _cpu) => Ok(ExitEvent::EntryFailure { reason }),
            VcpuExit::InternalError => {
                let suberror = internal_suberror(self.fd.get_kvm_run());
                Ok(ExitEvent::InternalError { suberror })
            }
            other => Ok(ExitEvent::Unknown { code: exit_reason_code(&other) }),
        }
    }
}


fn internal_suberror(run: &kvm_run) -> u32 {
    // SAFETY: only called after KVM_EXIT_INTERNAL_ERROR, for which `internal`
    // is the active union member.
    unsafe { run.__bindgen_anon_1.internal.suberror }
}


/// Raw KVM exit number for exits this monitor does not model.
fn exit_reason_code(exit: &VcpuExit<'_>) -> u32 {
    match exit {
        VcpuExit::Unsupported(code) => *code,
        VcpuExit::Exception => KVM_EXIT_EXCEPTION,
        VcpuExit::Debug(_) => KVM_EXIT_DEBUG,
        VcpuExit::IrqWindowOpen => KVM_EXIT_IRQ_WINDOW_OPEN,
        VcpuExit::Shutdown => KVM_EXIT_SHUTDOWN,
        VcpuExit::Intr => KVM_EXIT_INTR,
        VcpuExit::Nmi => KVM_EXIT_NMI,
        VcpuExit::Watchdog => KVM_EXIT_WATCHDOG,
        VcpuExit::SystemEvent(..) => KVM_EXIT_SYSTEM_EVENT,
        _ => KVM_EXIT_UNKNOWN,
    }
}
