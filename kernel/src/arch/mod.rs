//! Architecture support
//!
//! The kernel targets a single architecture: a 32-bit MIPS-like machine
//! with a software-managed TLB and a directly-mapped kernel segment.

pub mod mips;

pub use mips::{kseg0_direct_map, kseg0_to_paddr, KSEG0_BASE, USERSPACE_TOP, USERSTACK};
