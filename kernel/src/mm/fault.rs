//! TLB-miss fault handling
//!
//! The trap layer hands every TLB miss to [`vm_fault`]: validate the
//! faulting address against the current address space, make sure a frame
//! backs the page (allocating one on first touch), and install the
//! translation. With no write protection in this design every entry is
//! installed dirty and valid, and read, write, and read-only faults are
//! treated alike.

use log::debug;

use super::address_space::AddressSpace;
use super::{VirtAddr, Vm};
use crate::arch::mips::tlb::EntryLo;
use crate::error::{KernelError, KernelResult};

/// Kind of access that missed in the TLB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultType {
    Read,
    Write,
    /// Write to an entry the TLB holds read-only. Accepted and handled
    /// like a plain write; permission enforcement is a non-goal.
    ReadOnly,
}

/// Handle a TLB miss for the current address space.
///
/// Idempotent under spurious re-entry: if a translation for the page is
/// already present, it is left in place.
pub fn vm_fault(
    vm: &Vm,
    as_: &mut AddressSpace,
    fault_type: FaultType,
    fault_address: VirtAddr,
) -> KernelResult<()> {
    if !as_.contains(fault_address) {
        debug!(
            "vm_fault: {:?} at {:#010x} outside every segment of pid {}",
            fault_type, fault_address.0, as_.pid.0
        );
        return Err(KernelError::BadAddress {
            addr: fault_address.0,
        });
    }

    let ppn = as_.page_table.map(vm, as_.pid, fault_address)?;

    let flags = (EntryLo::DIRTY | EntryLo::VALID).bits();
    let vpn = fault_address.vpn();
    let entryhi = vpn.0 | flags;
    let entrylo = ppn.0 | flags;
    vm.tlb.insert_if_absent(entryhi, entrylo);

    Ok(())
}

/// TLB shootdown is not implemented; this kernel assumes a single CPU.
pub fn tlb_shootdown() -> ! {
    panic!("tlb shootdown requested on a single-cpu kernel");
}
