//! Processes
//!
//! The process control block and the global process table. Only the
//! pieces the VM subsystem needs are here: identity (PID, parent),
//! lifecycle state for waitpid, the owned address space, and the
//! refcounted file-handle table that fork duplicates.

pub mod file_table;
pub mod table;

extern crate alloc;

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use crate::mm::AddressSpace;
use crate::sync::Semaphore;

pub use file_table::{FileHandle, FileTable};
pub use table::ProcessTable;

/// Process identifier. Zero is the kernel itself and never names a
/// process-table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Pid(pub u32);

impl Pid {
    pub const KERNEL: Pid = Pid(0);
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    /// Exited; waiting to be reaped by the parent.
    Zombie,
}

/// Process control block.
pub struct Process {
    pub pid: Pid,
    pub ppid: Pid,
    pub name: String,
    pub state: ProcessState,
    pub exit_code: i32,
    /// The owned address space. `None` while exiting or before the first
    /// exec populates it.
    pub addrspace: Option<AddressSpace>,
    pub file_table: FileTable,
    pub children: Vec<Pid>,
    /// Signalled exactly once when this process exits; waitpid P()s it.
    pub exit_sem: Arc<Semaphore>,
}

impl Process {
    pub fn new(pid: Pid, ppid: Pid, name: &str) -> Self {
        Self {
            pid,
            ppid,
            name: String::from(name),
            state: ProcessState::Running,
            exit_code: 0,
            addrspace: None,
            file_table: FileTable::new(),
            children: Vec::new(),
            exit_sem: Arc::new(Semaphore::new(0)),
        }
    }
}
