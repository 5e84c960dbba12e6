//! MIPS-like machine constants
//!
//! Address-space layout of the modeled platform: user space occupies the
//! lower 2 GiB, and the kernel segment `kseg0` maps physical memory
//! one-to-one starting at [`KSEG0_BASE`]. Physical RAM is capped at
//! 512 MiB so that all of it is reachable through `kseg0`.

pub mod tlb;

use crate::mm::{PhysAddr, VirtAddr};

/// Base of the directly-mapped kernel segment.
pub const KSEG0_BASE: u32 = 0x8000_0000;

/// One past the last user virtual address.
pub const USERSPACE_TOP: u32 = 0x8000_0000;

/// Initial user stack pointer (the stack grows down from here).
pub const USERSTACK: VirtAddr = VirtAddr(USERSPACE_TOP);

/// Translate a physical address into its `kseg0` kernel virtual address.
pub const fn kseg0_direct_map(paddr: PhysAddr) -> VirtAddr {
    VirtAddr(KSEG0_BASE + paddr.0)
}

/// Inverse of [`kseg0_direct_map`].
pub const fn kseg0_to_paddr(vaddr: VirtAddr) -> PhysAddr {
    PhysAddr(vaddr.0 - KSEG0_BASE)
}
