//! Kernel bootstrap
//!
//! The machine and the process table come up exactly once and live for
//! the whole run of the kernel; the [`Kernel`] bundle behind a
//! `spin::Once` is that singleton. The trap layer reaches it through
//! [`kernel`]; tests build private [`Kernel`] values instead and never
//! touch the global.

use core::sync::atomic::{AtomicU32, Ordering};

use spin::Once;

use crate::error::{KernelError, KernelResult};
use crate::mm::fault::{vm_fault, FaultType};
use crate::mm::{VirtAddr, Vm};
use crate::process::{Pid, ProcessTable};

/// Everything global in the kernel: the machine and the process table.
pub struct Kernel {
    pub vm: Vm,
    pub processes: ProcessTable,
    current: AtomicU32,
}

impl Kernel {
    /// Bring the machine up with `ramsize` bytes of RAM, of which the
    /// first `kernel_image_bytes` are the resident kernel image.
    pub fn new(ramsize: usize, kernel_image_bytes: usize) -> Self {
        Self {
            vm: Vm::new(ramsize, kernel_image_bytes),
            processes: ProcessTable::new(),
            current: AtomicU32::new(Pid::KERNEL.0),
        }
    }

    /// PID of the process currently on the CPU.
    pub fn current(&self) -> Pid {
        Pid(self.current.load(Ordering::Acquire))
    }

    /// Record a context switch to `pid`.
    pub fn set_current(&self, pid: Pid) {
        self.current.store(pid.0, Ordering::Release);
    }

    /// Trap entry for a TLB miss: resolve it against the current
    /// process's address space.
    pub fn handle_tlb_miss(&self, fault_type: FaultType, vaddr: VirtAddr) -> KernelResult<()> {
        let pid = self.current();
        let mut addrspace =
            self.processes
                .take_addrspace(pid)
                .ok_or(KernelError::OutOfMemory {
                    requested: 0,
                })?;

        let result = vm_fault(&self.vm, &mut addrspace, fault_type, vaddr);
        self.processes.put_addrspace(pid, addrspace);
        result
    }
}

static KERNEL: Once<Kernel> = Once::new();

/// First-boot initialization. Later calls return the already-built
/// kernel unchanged.
pub fn bootstrap(ramsize: usize, kernel_image_bytes: usize) -> &'static Kernel {
    KERNEL.call_once(|| Kernel::new(ramsize, kernel_image_bytes))
}

/// The kernel singleton, if bootstrap has run.
pub fn kernel() -> Option<&'static Kernel> {
    KERNEL.get()
}
