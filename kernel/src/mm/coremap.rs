//! Coremap: physical frame accounting
//!
//! One bit-packed 64-bit entry per physical frame records what the frame
//! is doing: the length of the contiguous allocation it belongs to, the
//! owning PID (0 for the kernel), the virtual address handed to the
//! owner, and the free / clean / first-chunk / fixed bits.
//!
//! Allocation is first-fit: a linear scan from the first non-fixed frame
//! upward takes the lowest free run that is long enough. No free list is
//! maintained, which keeps the scan deterministic for identical inputs.
//!
//! A single spin lock guards the whole table plus the used-page counter.
//! It is a leaf lock: nothing else is acquired while it is held.

extern crate alloc;

use alloc::vec::Vec;
use log::trace;
use spin::Mutex;

use super::{PhysAddr, VirtAddr, PAGE_SIZE};
use crate::arch::mips::kseg0_direct_map;
use crate::process::Pid;

/// One bit-packed coremap entry.
///
/// Canonical field tuple: `(chunk_size, owner_pid, is_free, is_clean,
/// is_first_chunk, is_fixed, owner_vaddr)`. The packing below is internal;
/// [`CoremapEntry::build`] and the per-field accessors are exact inverses
/// of each other.
///
/// Layout: the owner vaddr is stored as its 20-bit page number in bits
/// 0..20, the four flag bits follow, the owner PID sits in bits 24..40,
/// and the chunk size in bits 40..60.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoremapEntry(u64);

impl CoremapEntry {
    const VPN_MASK: u64 = 0x000F_FFFF;
    const FIXED_BIT: u64 = 1 << 20;
    const FIRST_CHUNK_BIT: u64 = 1 << 21;
    const CLEAN_BIT: u64 = 1 << 22;
    const FREE_BIT: u64 = 1 << 23;
    const OWNER_SHIFT: u32 = 24;
    const OWNER_MASK: u64 = 0xFFFF;
    const CHUNK_SHIFT: u32 = 40;
    const CHUNK_MASK: u64 = 0x000F_FFFF;

    /// An unused frame: the free bit set and every other field zero.
    pub const FREE: Self = Self(Self::FREE_BIT);

    /// One-shot constructor for a fully-specified entry.
    pub fn build(
        chunk_size: usize,
        owner: Pid,
        is_free: bool,
        is_clean: bool,
        is_first_chunk: bool,
        is_fixed: bool,
        owner_vaddr: VirtAddr,
    ) -> Self {
        let mut entry = Self(0);
        entry.set_chunk_size(chunk_size);
        entry.set_owner(owner);
        entry.set_is_free(is_free);
        entry.set_is_clean(is_clean);
        entry.set_is_first_chunk(is_first_chunk);
        entry.set_is_fixed(is_fixed);
        entry.set_owner_vaddr(owner_vaddr);
        entry
    }

    pub fn chunk_size(&self) -> usize {
        ((self.0 >> Self::CHUNK_SHIFT) & Self::CHUNK_MASK) as usize
    }

    pub fn set_chunk_size(&mut self, chunk_size: usize) {
        self.0 &= !(Self::CHUNK_MASK << Self::CHUNK_SHIFT);
        self.0 |= (chunk_size as u64 & Self::CHUNK_MASK) << Self::CHUNK_SHIFT;
    }

    pub fn owner(&self) -> Pid {
        Pid(((self.0 >> Self::OWNER_SHIFT) & Self::OWNER_MASK) as u32)
    }

    pub fn set_owner(&mut self, owner: Pid) {
        self.0 &= !(Self::OWNER_MASK << Self::OWNER_SHIFT);
        self.0 |= (owner.0 as u64 & Self::OWNER_MASK) << Self::OWNER_SHIFT;
    }

    pub fn is_free(&self) -> bool {
        self.0 & Self::FREE_BIT != 0
    }

    pub fn set_is_free(&mut self, is_free: bool) {
        if is_free {
            self.0 |= Self::FREE_BIT;
        } else {
            self.0 &= !Self::FREE_BIT;
        }
    }

    pub fn is_clean(&self) -> bool {
        self.0 & Self::CLEAN_BIT != 0
    }

    pub fn set_is_clean(&mut self, is_clean: bool) {
        if is_clean {
            self.0 |= Self::CLEAN_BIT;
        } else {
            self.0 &= !Self::CLEAN_BIT;
        }
    }

    pub fn is_first_chunk(&self) -> bool {
        self.0 & Self::FIRST_CHUNK_BIT != 0
    }

    pub fn set_is_first_chunk(&mut self, is_first_chunk: bool) {
        if is_first_chunk {
            self.0 |= Self::FIRST_CHUNK_BIT;
        } else {
            self.0 &= !Self::FIRST_CHUNK_BIT;
        }
    }

    pub fn is_fixed(&self) -> bool {
        self.0 & Self::FIXED_BIT != 0
    }

    pub fn set_is_fixed(&mut self, is_fixed: bool) {
        if is_fixed {
            self.0 |= Self::FIXED_BIT;
        } else {
            self.0 &= !Self::FIXED_BIT;
        }
    }

    pub fn owner_vaddr(&self) -> VirtAddr {
        VirtAddr(((self.0 & Self::VPN_MASK) as u32) << 12)
    }

    pub fn set_owner_vaddr(&mut self, vaddr: VirtAddr) {
        self.0 &= !Self::VPN_MASK;
        self.0 |= (vaddr.0 >> 12) as u64 & Self::VPN_MASK;
    }
}

struct CoreMapInner {
    entries: Vec<CoremapEntry>,
    used_pages: usize,
    num_fixed_pages: usize,
}

/// The frame table for all of physical memory.
pub struct CoreMap {
    inner: Mutex<CoreMapInner>,
}

impl CoreMap {
    /// Build the table for `total_frames` frames, with the lowest
    /// `num_fixed_pages` permanently reserved for the kernel image and
    /// the coremap array itself.
    pub fn new(total_frames: usize, num_fixed_pages: usize) -> Self {
        assert!(
            num_fixed_pages <= total_frames,
            "reserved pages exceed physical memory"
        );

        let mut entries = Vec::with_capacity(total_frames);
        let kvaddr = kseg0_direct_map(PhysAddr(0));
        for index in 0..num_fixed_pages {
            entries.push(CoremapEntry::build(
                num_fixed_pages,
                Pid::KERNEL,
                false,
                false,
                index == 0,
                true,
                kvaddr,
            ));
        }
        entries.resize(total_frames, CoremapEntry::FREE);

        Self {
            inner: Mutex::new(CoreMapInner {
                entries,
                used_pages: num_fixed_pages,
                num_fixed_pages,
            }),
        }
    }

    /// First-fit allocation of `npages` contiguous frames.
    ///
    /// For kernel allocations (`owner == Pid::KERNEL`) the recorded owner
    /// vaddr is the `kseg0` address of the run and `vpn` is ignored; for
    /// user allocations the caller supplies the user page number.
    /// Returns `(owner_vaddr, ppn)`, or `None` when no run fits.
    pub fn alloc_pages(
        &self,
        npages: usize,
        is_fixed: bool,
        owner: Pid,
        vpn: VirtAddr,
    ) -> Option<(VirtAddr, PhysAddr)> {
        if npages == 0 {
            return None;
        }

        let mut inner = self.inner.lock();
        let total = inner.entries.len();
        let start = inner.num_fixed_pages;

        let mut found = None;
        for index in start..total {
            if index + npages > total {
                break;
            }
            if inner.entries[index..index + npages]
                .iter()
                .all(CoremapEntry::is_free)
            {
                found = Some(index);
                break;
            }
        }
        let first_index = found?;

        let ppn = PhysAddr((first_index * PAGE_SIZE) as u32);
        let owner_vaddr = if owner == Pid::KERNEL {
            kseg0_direct_map(ppn)
        } else {
            vpn
        };

        for offset in 0..npages {
            inner.entries[first_index + offset] = CoremapEntry::build(
                npages,
                owner,
                false,
                false,
                offset == 0,
                is_fixed,
                owner_vaddr,
            );
        }
        inner.used_pages += npages;

        trace!(
            "coremap: alloc {} page(s) at frame {} for pid {}",
            npages,
            first_index,
            owner.0
        );
        Some((owner_vaddr, ppn))
    }

    /// Release a whole run by the virtual address recorded at allocation
    /// time. A miss is an invariant violation and panics.
    pub fn free_pages(&self, owner_vaddr: VirtAddr, owner: Pid) {
        let mut inner = self.inner.lock();
        let start = inner.num_fixed_pages;
        let total = inner.entries.len();

        for index in start..total {
            let entry = inner.entries[index];
            if !entry.is_free() && entry.owner_vaddr() == owner_vaddr && entry.owner() == owner {
                assert!(
                    entry.is_first_chunk(),
                    "coremap: free_pages matched a mid-run frame"
                );
                let chunk_size = entry.chunk_size();
                for offset in 0..chunk_size {
                    inner.entries[index + offset] = CoremapEntry::FREE;
                }
                inner.used_pages -= chunk_size;
                trace!(
                    "coremap: freed {} page(s) at frame {} for pid {}",
                    chunk_size,
                    index,
                    owner.0
                );
                return;
            }
        }

        panic!(
            "coremap: free_pages found no allocation at {:#010x} owned by pid {}",
            owner_vaddr.0, owner.0
        );
    }

    /// Release the single frame at `index`, checking it against the
    /// `(owner, vpn)` recorded when the page table allocated it.
    pub fn free_page_at_index(&self, index: usize, owner: Pid, vpn: VirtAddr) {
        let mut inner = self.inner.lock();
        let entry = inner.entries[index];
        assert!(
            !entry.is_free() && entry.owner() == owner && entry.owner_vaddr() == vpn,
            "coremap: frame {} is not the ({}, {:#010x}) allocation being released",
            index,
            owner.0,
            vpn.0
        );
        inner.entries[index] = CoremapEntry::FREE;
        inner.used_pages -= 1;
    }

    /// Bytes accounted as in use (fixed pages included).
    pub fn used_bytes(&self) -> usize {
        self.inner.lock().used_pages * PAGE_SIZE
    }

    /// Number of frames currently owned by `pid`.
    pub fn pages_owned_by(&self, pid: Pid) -> usize {
        let inner = self.inner.lock();
        inner
            .entries
            .iter()
            .filter(|e| !e.is_free() && e.owner() == pid)
            .count()
    }

    /// Total frames the table covers.
    pub fn total_frames(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// The fixed-frame boundary the allocator never scans below.
    pub fn num_fixed_pages(&self) -> usize {
        self.inner.lock().num_fixed_pages
    }

    /// Snapshot of a single entry, for diagnostics and invariant checks.
    pub fn entry(&self, index: usize) -> CoremapEntry {
        self.inner.lock().entries[index]
    }
}
