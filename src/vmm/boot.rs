use kvm_bindings::{kvm_regs, kvm_sregs};
use kvm_ioctls::VcpuFd;
use log::debug;
use vm_memory::GuestAddress;

use crate::error::{Result, VmmError};


/// RFLAGS bit 1 is reserved and must read as one.
pub const X86_RFLAGS_RESERVED: u64 = 0x2;


/// Zero the code segment so real-mode `cs:ip` equals the raw guest-physical
/// load address.
pub fn flatten_code_segment(sregs: &mut kvm_sregs) {
    sregs.cs.base = 0;
    sregs.cs.selector = 0;
}


/// Start execution at `entry` with only the reserved flag set. Other general
/// registers are left as they are.
pub fn point_at_entry(regs: &mut kvm_regs, entry: GuestAddress) {
    regs.rip = entry.0;
    regs.rflags = X86_RFLAGS_RESERVED;
}


/// Point the vCPU at `entry`. Both register files are updated
/// read-modify-write, so KVM's reset values for everything but CS, RIP and
/// RFLAGS are kept.
pub fn setup_vcpu(vcpu: &VcpuFd, entry: GuestAddress) -> Result<()> {
    let mut sregs = vcpu.get_sregs().map_err(VmmError::GetSregs)?;
    flatten_code_segment(&mut sregs);
    vcpu.set_sregs(&sregs).map_err(VmmError::SetSregs)?;

    let mut regs = vcpu.get_regs().map_err(VmmError::GetRegisters)?;
    point_at_entry(&mut regs, entry);
    vcpu.set_regs(&regs).map_err(VmmError::SetRegisters)?;
    debug!("vCPU entry at {:#x}, rflags {:#x}", regs.rip, regs.rflags);
    Ok(())
}
