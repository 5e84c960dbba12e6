//! Tern kernel library
//!
//! The virtual-memory core of a small teaching kernel for a 32-bit
//! MIPS-like machine with a software-managed TLB: physical frame
//! accounting (the coremap), per-process address spaces with region
//! lists and lazily-filled page tables, the TLB-miss fault handler,
//! copy-on-fork address-space duplication, and the `sbrk`/`fork`/
//! `execv` syscall glue on top.
//!
//! The crate is `no_std` for the kernel proper; hosted builds (the unit
//! and scenario tests) link `std` and run against a modeled machine.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod arch;
pub mod bootstrap;
pub mod error;
pub mod loader;
pub mod mm;
pub mod process;
pub mod sync;
pub mod syscall;

pub use bootstrap::{bootstrap, kernel, Kernel};
pub use error::{KernelError, KernelResult};
pub use mm::{AddressSpace, PhysAddr, VirtAddr, Vm, PAGE_SIZE};
pub use process::{Pid, ProcessTable};
