//! Global process table
//!
//! A single sleep-lock-style mutex covers PID assignment, entry
//! insertion and removal, and parent/child queries; everything waitpid
//! and fork need to look up happens under it. Address spaces are taken
//! out of the table while VM operations run on them (single-owner), so
//! the table lock is never held across a coremap or RAM operation.

extern crate alloc;

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::Mutex;

use super::{Pid, Process, ProcessState};
use crate::mm::AddressSpace;
use crate::sync::Semaphore;

struct TableInner {
    procs: BTreeMap<u32, Process>,
    next_pid: u32,
}

/// The system-wide table of live processes.
pub struct ProcessTable {
    inner: Mutex<TableInner>,
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(TableInner {
                procs: BTreeMap::new(),
                next_pid: 1,
            }),
        }
    }

    /// Assign a fresh PID, insert a running process under it, and record
    /// it as a child of `ppid`.
    pub fn create_process(&self, name: &str, ppid: Pid) -> Pid {
        let mut inner = self.inner.lock();
        let pid = Pid(inner.next_pid);
        inner.next_pid += 1;

        inner.procs.insert(pid.0, Process::new(pid, ppid, name));
        if let Some(parent) = inner.procs.get_mut(&ppid.0) {
            parent.children.push(pid);
        }
        pid
    }

    /// Remove a process outright, unlinking it from its parent's child
    /// list. Returns the entry so the caller can release its resources.
    pub fn remove(&self, pid: Pid) -> Option<Process> {
        let mut inner = self.inner.lock();
        let proc = inner.procs.remove(&pid.0)?;
        if let Some(parent) = inner.procs.get_mut(&proc.ppid.0) {
            parent.children.retain(|c| *c != pid);
        }
        Some(proc)
    }

    /// Run `f` against the process entry, under the table lock.
    pub fn with_process<R>(&self, pid: Pid, f: impl FnOnce(&mut Process) -> R) -> Option<R> {
        let mut inner = self.inner.lock();
        inner.procs.get_mut(&pid.0).map(f)
    }

    pub fn exists(&self, pid: Pid) -> bool {
        self.inner.lock().procs.contains_key(&pid.0)
    }

    pub fn count(&self) -> usize {
        self.inner.lock().procs.len()
    }

    pub fn state_of(&self, pid: Pid) -> Option<ProcessState> {
        self.inner.lock().procs.get(&pid.0).map(|p| p.state)
    }

    pub fn is_child_of(&self, parent: Pid, child: Pid) -> bool {
        self.inner
            .lock()
            .procs
            .get(&child.0)
            .map(|p| p.ppid == parent)
            .unwrap_or(false)
    }

    pub fn children_of(&self, pid: Pid) -> Vec<Pid> {
        self.inner
            .lock()
            .procs
            .get(&pid.0)
            .map(|p| p.children.clone())
            .unwrap_or_default()
    }

    /// The exit semaphore of a process, cloned out so the caller can
    /// wait on it without holding the table lock.
    pub fn exit_sem_of(&self, pid: Pid) -> Option<Arc<Semaphore>> {
        self.inner
            .lock()
            .procs
            .get(&pid.0)
            .map(|p| p.exit_sem.clone())
    }

    /// Detach the address space of `pid` for a VM operation. The space
    /// is single-owner; callers put it back with [`Self::put_addrspace`].
    pub fn take_addrspace(&self, pid: Pid) -> Option<AddressSpace> {
        let mut inner = self.inner.lock();
        inner.procs.get_mut(&pid.0).and_then(|p| p.addrspace.take())
    }

    /// Reattach an address space detached by [`Self::take_addrspace`].
    pub fn put_addrspace(&self, pid: Pid, addrspace: AddressSpace) {
        let mut inner = self.inner.lock();
        if let Some(p) = inner.procs.get_mut(&pid.0) {
            p.addrspace = Some(addrspace);
        }
    }
}
