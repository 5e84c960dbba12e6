//! Address spaces
//!
//! Everything one process sees of virtual memory: the defined regions,
//! the page table, and the heap and stack descriptors. An address space
//! has exactly one owner (its process), so it carries no lock of its
//! own; the fault handler only ever runs against the current process's
//! space.

extern crate alloc;

use alloc::vec::Vec;
use log::warn;

use super::page_table::PageTable;
use super::region::{RegionFlags, RegionList};
use super::{VirtAddr, Vm, PAGE_SIZE};
use crate::arch::mips::USERSTACK;
use crate::error::{KernelError, KernelResult};
use crate::process::Pid;

/// Fixed size of the reserved user stack range (4 MiB).
pub const USER_STACK_SIZE: usize = 4 * 1024 * 1024;

/// A process's virtual memory layout.
#[derive(Debug, Default)]
pub struct AddressSpace {
    pub page_table: PageTable,
    pub regions: RegionList,
    pub heap_start: VirtAddr,
    pub heap_size: usize,
    pub stack_start: VirtAddr,
    pub stack_size: usize,
    /// Owning PID, written into coremap entries for this space's frames.
    /// Zero until a process adopts the space.
    pub pid: Pid,
}

impl AddressSpace {
    /// A fresh, empty address space.
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a segment at `vaddr` covering `size` bytes. The first
    /// successful definition also places the heap.
    pub fn define_region(
        &mut self,
        vaddr: VirtAddr,
        size: usize,
        flags: RegionFlags,
    ) -> KernelResult<()> {
        self.regions.add(vaddr, size, flags)?;
        self.place_heap();
        Ok(())
    }

    /// Heap placement: the page-aligned address just above the highest
    /// region end. Recomputed after each definition; the heap itself
    /// starts empty.
    fn place_heap(&mut self) {
        if self.regions.is_empty() {
            return;
        }
        let top = self.regions.highest_end() + PAGE_SIZE as u64;
        self.heap_start = VirtAddr((top as u32) & !(PAGE_SIZE as u32 - 1));
        self.heap_size = 0;
    }

    /// Reserve the stack range and hand back the initial stack pointer.
    pub fn define_stack(&mut self) -> VirtAddr {
        self.stack_start = USERSTACK;
        self.stack_size = USER_STACK_SIZE;
        USERSTACK
    }

    /// Clone this space for a fork: same regions and heap/stack layout,
    /// fresh frames holding byte-identical contents, owned by `new_pid`.
    /// A failed copy leaves no trace of the partial space.
    pub fn copy(&self, vm: &Vm, new_pid: Pid) -> KernelResult<AddressSpace> {
        let mut new_as = AddressSpace {
            page_table: PageTable::new(),
            regions: self.regions.clone(),
            heap_start: self.heap_start,
            heap_size: self.heap_size,
            stack_start: self.stack_start,
            stack_size: self.stack_size,
            pid: new_pid,
        };

        match self.page_table.copy_into(vm, &mut new_as.page_table, new_pid) {
            Ok(()) => Ok(new_as),
            Err(_) => {
                new_as.destroy(vm);
                Err(KernelError::OutOfMemory {
                    requested: PAGE_SIZE,
                })
            }
        }
    }

    fn in_stack(&self, vaddr: VirtAddr) -> bool {
        vaddr < self.stack_start
            && vaddr.0 as u64 >= self.stack_start.0 as u64 - self.stack_size as u64
    }

    fn in_heap(&self, vaddr: VirtAddr) -> bool {
        vaddr >= self.heap_start
            && (vaddr.0 as u64) < self.heap_start.0 as u64 + self.heap_size as u64
    }

    /// Is `vaddr` inside any segment: a region, the stack range, or the
    /// live part of the heap?
    pub fn contains(&self, vaddr: VirtAddr) -> bool {
        self.regions.contains(vaddr) || self.in_stack(vaddr) || self.in_heap(vaddr)
    }

    /// Does any segment still cover the page at `vpn`?
    pub fn page_still_needed(&self, vpn: VirtAddr) -> bool {
        self.in_heap(vpn) || self.in_stack(vpn) || self.regions.uses_page(vpn)
    }

    /// Drop every page-table entry whose page no segment covers any
    /// longer, returning its frame to the coremap. Run after the heap
    /// shrinks.
    pub fn clean_segments(&mut self, vm: &Vm) -> KernelResult<()> {
        let stale: Vec<VirtAddr> = self
            .page_table
            .iter()
            .map(|entry| entry.vpn)
            .filter(|vpn| !self.page_still_needed(*vpn))
            .collect();

        let pid = self.pid;
        for vpn in stale {
            self.page_table.unmap(vm, pid, vpn)?;
        }
        Ok(())
    }

    /// Adjust the heap by `amount` bytes and return the old break.
    ///
    /// `amount` must be a whole number of pages. Shrinking below an
    /// empty heap is an error; growing into the stack's reserved range
    /// is out-of-memory. Shrinking releases the frames of the pages
    /// that fell off the heap.
    pub fn sbrk(&mut self, vm: &Vm, amount: i32) -> KernelResult<VirtAddr> {
        if amount % PAGE_SIZE as i32 != 0 {
            return Err(KernelError::InvalidArgument {
                what: "sbrk amount is not page-aligned",
            });
        }

        let old_break = VirtAddr(self.heap_start.0 + self.heap_size as u32);
        let amount = amount as i64;

        if amount < 0 {
            let shrink = (-amount) as usize;
            if shrink > self.heap_size {
                return Err(KernelError::InvalidArgument {
                    what: "sbrk shrink exceeds heap size",
                });
            }
            self.heap_size -= shrink;
            self.clean_segments(vm)?;
        } else if amount > 0 {
            let new_top = self.heap_start.0 as u64 + self.heap_size as u64 + amount as u64;
            let stack_bottom = self.stack_start.0 as u64 - self.stack_size as u64;
            if new_top > stack_bottom {
                warn!(
                    "sbrk: heap top {:#x} would run into the stack at {:#x}",
                    new_top, stack_bottom
                );
                return Err(KernelError::OutOfMemory {
                    requested: amount as usize,
                });
            }
            self.heap_size += amount as usize;
        }

        Ok(old_break)
    }

    /// Tear the space down: free every frame and retire its TLB entries.
    pub fn destroy(mut self, vm: &Vm) {
        self.page_table.destroy(vm, self.pid);
    }

    /// Make this the translated address space: wipe the TLB so no stale
    /// entry from the previous space survives the switch.
    pub fn activate(&self, vm: &Vm) {
        vm.tlb.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mm::region::RegionFlags;

    fn rwx() -> RegionFlags {
        RegionFlags::READ | RegionFlags::WRITE | RegionFlags::EXEC
    }

    fn test_vm() -> Vm {
        Vm::new(64 * PAGE_SIZE, 4 * PAGE_SIZE)
    }

    #[test]
    fn test_heap_sits_above_the_highest_region() {
        let mut as_ = AddressSpace::new();
        as_.define_region(VirtAddr(0x0040_0000), 0x4000, rwx())
            .expect("region should be accepted");

        assert_eq!(as_.heap_start, VirtAddr(0x0040_5000));
        assert_eq!(as_.heap_size, 0);
        assert!(as_.heap_start.is_page_aligned());

        // A later, higher region pushes the heap up.
        as_.define_region(VirtAddr(0x0041_0000), 0x800, rwx())
            .expect("region should be accepted");
        assert_eq!(as_.heap_start, VirtAddr(0x0041_1000));
    }

    #[test]
    fn test_define_stack_reserves_four_megabytes() {
        let mut as_ = AddressSpace::new();
        let sp = as_.define_stack();
        assert_eq!(sp, USERSTACK);
        assert_eq!(as_.stack_size, 4 * 1024 * 1024);

        assert!(as_.contains(VirtAddr(USERSTACK.0 - 1)));
        assert!(as_.contains(VirtAddr(USERSTACK.0 - USER_STACK_SIZE as u32)));
        assert!(!as_.contains(VirtAddr(USERSTACK.0 - USER_STACK_SIZE as u32 - 1)));
    }

    #[test]
    fn test_sbrk_validates_its_argument() {
        let vm = test_vm();
        let mut as_ = AddressSpace::new();
        as_.define_region(VirtAddr(0x0040_0000), 0x1000, rwx())
            .unwrap();
        as_.define_stack();

        let err = as_
            .sbrk(&vm, 123)
            .expect_err("unaligned sbrk must be rejected");
        assert!(matches!(err, KernelError::InvalidArgument { .. }));

        let err = as_
            .sbrk(&vm, -(PAGE_SIZE as i32))
            .expect_err("shrinking an empty heap must be rejected");
        assert!(matches!(err, KernelError::InvalidArgument { .. }));
    }

    #[test]
    fn test_sbrk_grow_touch_shrink() {
        let vm = test_vm();
        let mut as_ = AddressSpace::new();
        as_.pid = Pid(1);
        as_.define_region(VirtAddr(0x0040_0000), 0x4000, rwx())
            .unwrap();
        as_.define_stack();
        assert_eq!(as_.heap_start, VirtAddr(0x0040_5000));

        let old = as_.sbrk(&vm, 2 * PAGE_SIZE as i32).expect("grow should work");
        assert_eq!(old, VirtAddr(0x0040_5000));
        assert_eq!(as_.heap_size, 8192);

        // Touch the second heap page so a frame exists.
        let used_before = vm.used_bytes();
        as_.page_table
            .map(&vm, as_.pid, VirtAddr(0x0040_6000))
            .expect("heap page should be mappable");
        assert_eq!(vm.used_bytes(), used_before + PAGE_SIZE);

        let old = as_
            .sbrk(&vm, -(PAGE_SIZE as i32))
            .expect("shrink should work");
        assert_eq!(old, VirtAddr(0x0040_7000));
        assert_eq!(as_.heap_size, 4096);

        // The frame behind the released page went back to the free pool.
        assert_eq!(vm.used_bytes(), used_before);
        assert_eq!(as_.page_table.lookup(VirtAddr(0x0040_6000)), None);
    }

    #[test]
    fn test_sbrk_grow_and_shrink_is_identity() {
        let vm = test_vm();
        let mut as_ = AddressSpace::new();
        as_.pid = Pid(1);
        as_.define_region(VirtAddr(0x0040_0000), 0x1000, rwx())
            .unwrap();
        as_.define_stack();

        let used = vm.used_bytes();
        let heap_size = as_.heap_size;

        as_.sbrk(&vm, PAGE_SIZE as i32).expect("grow should work");
        as_.page_table
            .map(&vm, as_.pid, as_.heap_start)
            .expect("map should work");
        as_.sbrk(&vm, -(PAGE_SIZE as i32))
            .expect("shrink should work");

        assert_eq!(as_.heap_size, heap_size);
        assert_eq!(vm.used_bytes(), used);
        assert!(as_.page_table.is_empty());
    }

    #[test]
    fn test_sbrk_growth_stops_at_the_stack() {
        let vm = test_vm();
        let mut as_ = AddressSpace::new();
        as_.define_region(VirtAddr(0x0040_0000), 0x1000, rwx())
            .unwrap();
        as_.define_stack();

        // One page short of the stack bottom is fine; one more collides.
        let stack_bottom = as_.stack_start.0 - as_.stack_size as u32;
        let room = (stack_bottom - as_.heap_start.0) as i64;
        assert!(room % PAGE_SIZE as i64 == 0);

        // Growing past the bottom in one jump is rejected and leaves the
        // heap untouched.
        let err = as_
            .sbrk(&vm, (room + PAGE_SIZE as i64) as i32)
            .expect_err("growth into the stack must fail");
        assert!(matches!(err, KernelError::OutOfMemory { .. }));
        assert_eq!(as_.heap_size, 0);
    }

    #[test]
    fn test_copy_failure_leaves_no_trace() {
        // A machine with exactly one free frame: the parent maps it, so
        // the copy cannot allocate and must fail cleanly. Five of the six
        // frames are fixed (4-page kernel image plus the coremap page).
        let vm = Vm::new(6 * PAGE_SIZE, 4 * PAGE_SIZE);
        let mut parent = AddressSpace::new();
        parent.pid = Pid(1);
        parent
            .define_region(VirtAddr(0x0040_0000), 0x1000, rwx())
            .unwrap();
        parent
            .page_table
            .map(&vm, parent.pid, VirtAddr(0x0040_0000))
            .expect("the only free frame goes to the parent");

        let err = parent
            .copy(&vm, Pid(2))
            .expect_err("copy without free frames must fail");
        assert!(matches!(err, KernelError::OutOfMemory { .. }));
        assert_eq!(vm.coremap.pages_owned_by(Pid(2)), 0);
    }

    #[test]
    fn test_destroy_returns_every_frame() {
        let vm = test_vm();
        let mut as_ = AddressSpace::new();
        as_.pid = Pid(3);
        as_.define_region(VirtAddr(0x0040_0000), 3 * PAGE_SIZE, rwx())
            .unwrap();
        for page in 0..3u32 {
            as_.page_table
                .map(&vm, as_.pid, VirtAddr(0x0040_0000 + page * PAGE_SIZE as u32))
                .expect("map should work");
        }
        assert_eq!(vm.coremap.pages_owned_by(Pid(3)), 3);

        as_.destroy(&vm);
        assert_eq!(vm.coremap.pages_owned_by(Pid(3)), 0);
    }
}
