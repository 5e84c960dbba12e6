//! Memory system calls
//!
//! `sbrk` is the only call that goes straight at the VM core: everything
//! it does is delegated to [`crate::mm::AddressSpace::sbrk`], which
//! validates the amount, moves the break, and releases frames on shrink.

use crate::error::{KernelError, KernelResult};
use crate::mm::{VirtAddr, Vm};
use crate::process::{Pid, ProcessTable};

/// Adjust the heap of `pid` by `amount` bytes and return the old break.
pub fn sys_sbrk(vm: &Vm, table: &ProcessTable, pid: Pid, amount: i32) -> KernelResult<VirtAddr> {
    let mut addrspace = table
        .take_addrspace(pid)
        .ok_or(KernelError::NoSuchProcess { pid: pid.0 })?;

    let result = addrspace.sbrk(vm, amount);
    table.put_addrspace(pid, addrspace);
    result
}
