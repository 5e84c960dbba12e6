//! Per-process file-handle table
//!
//! The open-file layer itself (VFS, offsets, read/write) lives outside
//! the VM subsystem; what matters here is the ownership contract: each
//! handle is shared by reference count across fork and dup, and an
//! exiting process drops all of its references.

extern crate alloc;

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::error::{KernelError, KernelResult};

/// An open file. Shared between descriptors (dup) and across fork via
/// `Arc`; the strong count is the handle's reference count.
#[derive(Debug)]
pub struct FileHandle {
    pub name: String,
}

/// The per-process descriptor table.
#[derive(Debug, Default)]
pub struct FileTable {
    slots: Vec<Option<Arc<FileHandle>>>,
}

impl FileTable {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Install a handle in the lowest free slot and return its
    /// descriptor.
    pub fn open(&mut self, name: &str) -> usize {
        let handle = Arc::new(FileHandle {
            name: String::from(name),
        });
        self.install(handle)
    }

    fn install(&mut self, handle: Arc<FileHandle>) -> usize {
        if let Some(fd) = self.slots.iter().position(Option::is_none) {
            self.slots[fd] = Some(handle);
            fd
        } else {
            self.slots.push(Some(handle));
            self.slots.len() - 1
        }
    }

    pub fn get(&self, fd: usize) -> Option<&Arc<FileHandle>> {
        self.slots.get(fd).and_then(Option::as_ref)
    }

    /// Duplicate `fd` into a new descriptor sharing the same handle.
    pub fn dup(&mut self, fd: usize) -> KernelResult<usize> {
        let handle = self
            .get(fd)
            .cloned()
            .ok_or(KernelError::NotFound {
                what: "file descriptor",
            })?;
        Ok(self.install(handle))
    }

    pub fn close(&mut self, fd: usize) -> KernelResult<()> {
        match self.slots.get_mut(fd) {
            Some(slot @ Some(_)) => {
                *slot = None;
                Ok(())
            }
            _ => Err(KernelError::NotFound {
                what: "file descriptor",
            }),
        }
    }

    /// Drop every reference this table holds.
    pub fn close_all(&mut self) {
        self.slots.clear();
    }

    /// The child's table after a fork: same descriptors, each handle's
    /// reference count bumped by the shared `Arc`.
    pub fn clone_for_fork(&self) -> FileTable {
        FileTable {
            slots: self.slots.clone(),
        }
    }

    /// Reference count of the handle behind `fd`.
    pub fn handle_refs(&self, fd: usize) -> Option<usize> {
        self.get(fd).map(Arc::strong_count)
    }
}
