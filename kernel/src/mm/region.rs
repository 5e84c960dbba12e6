//! Memory regions
//!
//! The per-address-space list of defined segments (code, data, and
//! whatever else the loader asks for). Regions record their permission
//! bits but the fault path does not enforce them. Once defined, a region
//! lives until its address space is destroyed; there is no removal.

extern crate alloc;

use alloc::vec::Vec;
use bitflags::bitflags;
use log::warn;

use super::{VirtAddr, PAGE_SIZE};
use crate::error::{KernelError, KernelResult};

bitflags! {
    /// Segment permissions. Recorded at definition time, not enforced.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RegionFlags: u8 {
        const READ = 0b001;
        const WRITE = 0b010;
        const EXEC = 0b100;
    }
}

/// A contiguous segment of user virtual memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub start: VirtAddr,
    pub size: usize,
    pub flags: RegionFlags,
}

impl Region {
    /// One past the last byte, widened so a segment touching the top of
    /// the address space cannot wrap.
    pub fn end(&self) -> u64 {
        self.start.0 as u64 + self.size as u64
    }

    /// Does `vaddr` fall inside this region?
    pub fn contains(&self, vaddr: VirtAddr) -> bool {
        vaddr >= self.start && (vaddr.0 as u64) < self.end()
    }

    /// Does `[vaddr, vaddr + size)` intersect this region?
    pub fn overlaps(&self, vaddr: VirtAddr, size: usize) -> bool {
        let other_end = vaddr.0 as u64 + size as u64;
        (vaddr.0 as u64) < self.end() && (self.start.0 as u64) < other_end
    }

    /// Does this region intersect the page starting at `vpn`?
    pub fn uses_page(&self, vpn: VirtAddr) -> bool {
        self.overlaps(vpn, PAGE_SIZE)
    }
}

/// The ordered set of segments defined in one address space.
#[derive(Debug, Clone, Default)]
pub struct RegionList {
    regions: Vec<Region>,
}

impl RegionList {
    pub fn new() -> Self {
        Self {
            regions: Vec::new(),
        }
    }

    /// Append a new region, rejecting empty sizes and overlaps with any
    /// existing region.
    pub fn add(&mut self, vaddr: VirtAddr, size: usize, flags: RegionFlags) -> KernelResult<()> {
        if size == 0 {
            warn!("region: rejecting zero-size segment at {:#010x}", vaddr.0);
            return Err(KernelError::InvalidArgument {
                what: "zero-size region",
            });
        }
        if !self.available(vaddr, size) {
            return Err(KernelError::RegionOverlap { addr: vaddr.0 });
        }
        self.regions.push(Region {
            start: vaddr,
            size,
            flags,
        });
        Ok(())
    }

    /// Is `vaddr` inside some defined region?
    pub fn contains(&self, vaddr: VirtAddr) -> bool {
        self.regions.iter().any(|r| r.contains(vaddr))
    }

    /// Is `[vaddr, vaddr + size)` disjoint from every defined region?
    pub fn available(&self, vaddr: VirtAddr, size: usize) -> bool {
        !self.regions.iter().any(|r| r.overlaps(vaddr, size))
    }

    /// Does any region intersect the page starting at `vpn`?
    pub fn uses_page(&self, vpn: VirtAddr) -> bool {
        self.regions.iter().any(|r| r.uses_page(vpn))
    }

    /// The highest region end, or 0 when nothing is defined.
    pub fn highest_end(&self) -> u64 {
        self.regions.iter().map(Region::end).max().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}
