//! Page table
//!
//! The per-address-space mapping from virtual page numbers to physical
//! page numbers. Entries live in an insertion-ordered vector with linear
//! lookup; frames are obtained from the coremap only on first touch and
//! every entry owns exactly one frame.

extern crate alloc;

use alloc::vec::Vec;
use log::trace;

use super::{PhysAddr, VirtAddr, Vm, PAGE_SIZE};
use crate::error::{KernelError, KernelResult};
use crate::process::Pid;

/// One mapped user page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTableEntry {
    pub vpn: VirtAddr,
    pub ppn: PhysAddr,
}

/// The mapping table of one address space.
#[derive(Debug, Default)]
pub struct PageTable {
    entries: Vec<PageTableEntry>,
}

impl PageTable {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// The frame backing `vpn`, if one has been allocated.
    pub fn lookup(&self, vpn: VirtAddr) -> Option<PhysAddr> {
        let vpn = vpn.vpn();
        self.entries
            .iter()
            .find(|e| e.vpn == vpn)
            .map(|e| e.ppn)
    }

    /// Ensure `vaddr`'s page is backed by a frame, allocating and zeroing
    /// one on first touch. Returns the frame's physical address.
    pub fn map(&mut self, vm: &Vm, pid: Pid, vaddr: VirtAddr) -> KernelResult<PhysAddr> {
        let vpn = vaddr.vpn();
        if let Some(ppn) = self.lookup(vpn) {
            return Ok(ppn);
        }

        let ppn = vm
            .alloc_upages(1, vpn, pid)
            .ok_or(KernelError::OutOfMemory {
                requested: PAGE_SIZE,
            })?;
        vm.ram.zero_frame(ppn);
        self.entries.push(PageTableEntry { vpn, ppn });

        trace!(
            "pt: pid {} mapped {:#010x} -> {:#010x}",
            pid.0,
            vpn.0,
            ppn.0
        );
        Ok(ppn)
    }

    /// Drop the mapping for `vaddr`'s page: release its frame and retire
    /// any TLB entry translating it.
    pub fn unmap(&mut self, vm: &Vm, pid: Pid, vaddr: VirtAddr) -> KernelResult<()> {
        let vpn = vaddr.vpn();
        let index = self
            .entries
            .iter()
            .position(|e| e.vpn == vpn)
            .ok_or(KernelError::BadAddress { addr: vpn.0 })?;

        let entry = self.entries.remove(index);
        vm.free_upage_at(entry.ppn.frame_index(), pid, vpn);
        vm.tlb.invalidate(vpn.0);
        Ok(())
    }

    /// Deep copy into `dst`: every mapped page gets a fresh frame in the
    /// destination (owned by `dst_pid`) carrying a byte-identical copy of
    /// the source frame.
    pub fn copy_into(&self, vm: &Vm, dst: &mut PageTable, dst_pid: Pid) -> KernelResult<()> {
        for entry in &self.entries {
            let new_ppn = dst.map(vm, dst_pid, entry.vpn)?;
            vm.ram.copy_frame(entry.ppn, new_ppn);
        }
        Ok(())
    }

    /// Release every frame and retire every TLB entry. Leaves the table
    /// empty.
    pub fn destroy(&mut self, vm: &Vm, pid: Pid) {
        for entry in self.entries.drain(..) {
            vm.free_upage_at(entry.ppn.frame_index(), pid, entry.vpn);
            vm.tlb.invalidate(entry.vpn.0);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &PageTableEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mm::PAGE_SIZE;

    fn test_vm() -> Vm {
        Vm::new(64 * PAGE_SIZE, 4 * PAGE_SIZE)
    }

    #[test]
    fn test_map_is_lazy_and_unique_per_vpn() {
        let vm = test_vm();
        let mut pt = PageTable::new();
        let pid = Pid(1);

        let ppn = pt
            .map(&vm, pid, VirtAddr(0x0040_0123))
            .expect("first touch should allocate a frame");
        // A second touch anywhere in the same page reuses the entry.
        let again = pt
            .map(&vm, pid, VirtAddr(0x0040_0FFF))
            .expect("second touch should find the mapping");
        assert_eq!(ppn, again);
        assert_eq!(pt.len(), 1);
        assert_eq!(pt.lookup(VirtAddr(0x0040_0000)), Some(ppn));
    }

    #[test]
    fn test_fresh_frame_is_zeroed() {
        let vm = test_vm();
        let mut pt = PageTable::new();

        // Dirty a frame through a kernel allocation, then free it so the
        // user allocation below reuses it.
        let kva = vm.alloc_kpages(1).expect("kernel page should fit");
        let ppn = crate::arch::mips::kseg0_to_paddr(kva);
        vm.ram.write(ppn, &[0xFF; 64]);
        vm.free_kpages(kva);

        let mapped = pt
            .map(&vm, Pid(1), VirtAddr(0x0040_0000))
            .expect("map should succeed");
        assert_eq!(mapped, ppn);

        let mut buf = [0xAAu8; 64];
        vm.ram.read(mapped, &mut buf);
        assert_eq!(buf, [0u8; 64]);
    }

    #[test]
    fn test_unmap_frees_the_frame() {
        let vm = test_vm();
        let mut pt = PageTable::new();
        let pid = Pid(1);
        let before = vm.used_bytes();

        pt.map(&vm, pid, VirtAddr(0x0040_0000))
            .expect("map should succeed");
        assert_eq!(vm.used_bytes(), before + PAGE_SIZE);

        pt.unmap(&vm, pid, VirtAddr(0x0040_0000))
            .expect("unmap of a mapped page should succeed");
        assert_eq!(vm.used_bytes(), before);
        assert!(pt.is_empty());

        let err = pt
            .unmap(&vm, pid, VirtAddr(0x0040_0000))
            .expect_err("second unmap must fail");
        assert!(matches!(err, KernelError::BadAddress { .. }));
    }

    #[test]
    fn test_copy_gets_distinct_frames_with_equal_contents() {
        let vm = test_vm();
        let pid_src = Pid(1);
        let pid_dst = Pid(2);
        let mut src = PageTable::new();

        let src_ppn = src
            .map(&vm, pid_src, VirtAddr(0x0040_0000))
            .expect("map should succeed");
        vm.ram.write(src_ppn, b"copy-on-fork");

        let mut dst = PageTable::new();
        src.copy_into(&vm, &mut dst, pid_dst)
            .expect("copy should succeed");

        let dst_ppn = dst
            .lookup(VirtAddr(0x0040_0000))
            .expect("destination should have the same vpn mapped");
        assert_ne!(src_ppn, dst_ppn);

        let mut buf = [0u8; 12];
        vm.ram.read(dst_ppn, &mut buf);
        assert_eq!(&buf, b"copy-on-fork");

        // Writes to the copy do not show through to the source.
        vm.ram.write(dst_ppn, b"xxxx");
        let mut src_buf = [0u8; 4];
        vm.ram.read(src_ppn, &mut src_buf);
        assert_eq!(&src_buf, b"copy");
    }

    #[test]
    fn test_destroy_releases_everything() {
        let vm = test_vm();
        let mut pt = PageTable::new();
        let pid = Pid(5);
        let before = vm.used_bytes();

        for page in 0..4u32 {
            pt.map(&vm, pid, VirtAddr(0x0040_0000 + page * PAGE_SIZE as u32))
                .expect("map should succeed");
        }
        assert_eq!(vm.used_bytes(), before + 4 * PAGE_SIZE);
        assert_eq!(vm.coremap.pages_owned_by(pid), 4);

        pt.destroy(&vm, pid);
        assert_eq!(vm.used_bytes(), before);
        assert_eq!(vm.coremap.pages_owned_by(pid), 0);
        assert!(pt.is_empty());
    }
}
