//! Program images
//!
//! execv's view of the filesystem and the executable loader. A
//! [`Program`] is the already-parsed form of an executable: an entry
//! point plus loadable segments. The [`ProgramStore`] is the boot image
//! the kernel mounts at startup, mapping paths to programs.
//!
//! Loading defines one region per segment and copies the initialization
//! bytes out through the normal user-copy path; no frame is allocated
//! ahead of first touch except those the initialization bytes land in.

extern crate alloc;

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::Mutex;

use crate::error::KernelResult;
use crate::mm::copyio::copyout;
use crate::mm::{AddressSpace, RegionFlags, VirtAddr, Vm};

/// One loadable segment of an executable.
#[derive(Debug, Clone)]
pub struct Segment {
    /// Where the segment lives in user space.
    pub vaddr: VirtAddr,
    /// Size of the region to define. May exceed `data.len()`; the tail
    /// is zero-fill (bss).
    pub size: usize,
    pub flags: RegionFlags,
    /// Initialization bytes copied to the start of the segment.
    pub data: Vec<u8>,
}

/// A parsed executable.
#[derive(Debug, Clone)]
pub struct Program {
    pub entry: VirtAddr,
    pub segments: Vec<Segment>,
}

/// The boot file image: path -> program.
pub struct ProgramStore {
    inner: Mutex<BTreeMap<String, Arc<Program>>>,
}

impl Default for ProgramStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn insert(&self, path: &str, program: Program) {
        self.inner
            .lock()
            .insert(String::from(path), Arc::new(program));
    }

    pub fn lookup(&self, path: &str) -> Option<Arc<Program>> {
        self.inner.lock().get(path).cloned()
    }
}

/// Populate a fresh address space from a program: define every segment's
/// region, then copy the initialization bytes in.
pub fn load_program(vm: &Vm, as_: &mut AddressSpace, program: &Program) -> KernelResult<()> {
    for segment in &program.segments {
        as_.define_region(segment.vaddr, segment.size, segment.flags)?;
    }
    for segment in &program.segments {
        if !segment.data.is_empty() {
            copyout(vm, as_, &segment.data, segment.vaddr)?;
        }
    }
    Ok(())
}
