use std::io;
use std::path::Path;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

use libc::{c_int, c_void, siginfo_t};
use log::info;
use vmm_sys_util::signal::register_signal_handler;

use super::boot;
use super::devices::timer::HostClock;
use super::devices::DeviceContext;
use super::event_loop::VmLoop;
use super::kvm_ctx::{KvmContext, KvmVcpu};
use super::memory::GuestMem;
use super::terminal::HostTerminal;
use crate::config::VmConfig;
use crate::error::{Result, VmmError};
use crate::types::RunOutcome;


static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// `immediate_exit` byte of the running vCPU's `kvm_run`, or null.
static IMMEDIATE_EXIT: AtomicPtr<u8> = AtomicPtr::new(ptr::null_mut());


extern "C" fn request_shutdown(_num: c_int, _info: *mut siginfo_t, _unused: *mut c_void) {
    SHUTDOWN.store(true, Ordering::SeqCst);
    let kick = IMMEDIATE_EXIT.load(Ordering::SeqCst);
    if !kick.is_null() {
        // SAFETY: non-null only while the vCPU owning the mapping is alive,
        // see `ImmediateExit`.
        unsafe { ptr::write_volatile(kick, 1) };
    }
}


/// Publishes a vCPU's `immediate_exit` byte to the signal handler until
/// dropped. A signal landing between the loop's shutdown check and `KVM_RUN`
/// then still makes the next run return at once.
struct ImmediateExit;


impl ImmediateExit {
    fn arm(vcpu: &mut KvmVcpu) -> Self {
        let run = vcpu.fd.get_kvm_run();
        IMMEDIATE_EXIT.store(&mut run.immediate_exit as *mut u8, Ordering::SeqCst);
        ImmediateExit
    }
}


impl Drop for ImmediateExit {
    fn drop(&mut self) {
        IMMEDIATE_EXIT.store(ptr::null_mut(), Ordering::SeqCst);
    }
}


/// SIGINT and SIGTERM set the shutdown flag. Delivery also kicks the vCPU out
/// of `KVM_RUN`, so the flag is seen on the next loop iteration.
pub fn install_signal_handlers() -> Result<()> {
    for signum in [libc::SIGINT, libc::SIGTERM] {
        register_signal_handler(signum, request_shutdown).map_err(VmmError::Signal)?;
    }
    Ok(())
}


/// A VM ready to resume. Fields drop in declaration order: the vCPU and its
/// run mapping first, then the VM, then the guest memory backing it.
pub struct ReadyVm {
    pub vcpu: KvmVcpu,
    pub kvm: KvmContext,
    pub memory: GuestMem,
}


pub fn initialize(config: &VmConfig, image_path: &Path) -> Result<ReadyVm> {
    // 1) guest image
    let image = std::fs::read(image_path)
        .map_err(|source| VmmError::ImageRead { path: image_path.to_path_buf(), source })?;

    // 2) KVM + VM
    let kvm = KvmContext::new(config.api_version)?;

    // 3) memory + image copy
    let memory = GuestMem::create(config)?;
    memory.load_image(&image)?;
    kvm.register_memory(&memory)?;
    info!(
        "loaded {} bytes from {} at {:#x}",
        image.len(),
        image_path.display(),
        memory.base().0
    );

    // 4) vCPU
    let vcpu = kvm.create_vcpu()?;
    boot::setup_vcpu(&vcpu.fd, memory.base())?;

    Ok(ReadyVm { vcpu, kvm, memory })
}


pub fn run_vm(config: &VmConfig, image_path: &Path) -> Result<RunOutcome> {
    let mut ready = initialize(config, image_path)?;
    let _kick = ImmediateExit::arm(&mut ready.vcpu);
    install_signal_handlers()?;

    let mut terminal = HostTerminal::acquire()?;
    let devices = DeviceContext::new(config, io::stdout(), HostClock);
    let mut vml = VmLoop::new(devices, &SHUTDOWN);
    vml.run_until_exit(&mut ready.vcpu, &mut terminal)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_image_fails_before_touching_kvm() {
        let path = Path::new("/nonexistent/flatvmm/guest.bin");
        let err = initialize(&VmConfig::default(), path).err().unwrap();
        match err {
            VmmError::ImageRead { path: reported, source } => {
                assert_eq!(reported, path);
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("expected ImageRead, got {other}"),
        }
    }

    #[test]
    fn shutdown_request_sets_flag_and_kicks_vcpu() {
        let mut byte = 0u8;
        IMMEDIATE_EXIT.store(&mut byte as *mut u8, Ordering::SeqCst);
        request_shutdown(libc::SIGINT, ptr::null_mut(), ptr::null_mut());
        IMMEDIATE_EXIT.store(ptr::null_mut(), Ordering::SeqCst);

        assert_eq!(byte, 1);
        assert!(SHUTDOWN.load(Ordering::SeqCst));
    }
}
