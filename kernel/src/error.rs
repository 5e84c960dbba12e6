//! Kernel error types
//!
//! A single error enum shared by the memory subsystem and the syscall
//! layer. Fatal invariant violations (a coremap free that matches no
//! allocation, a TLB shootdown request) are not representable here; they
//! terminate the kernel via `panic!`.

use core::fmt;

/// Main kernel error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "kernel errors must be handled, not silently discarded"]
pub enum KernelError {
    /// No physical frame or backing memory is available.
    OutOfMemory { requested: usize },
    /// A user address outside every segment of the address space.
    BadAddress { addr: u32 },
    /// Caller precondition violation (misaligned sbrk, zero-size region,
    /// oversized argument list).
    InvalidArgument { what: &'static str },
    /// A requested segment intersects an existing one.
    RegionOverlap { addr: u32 },
    /// The PID does not identify an existing process.
    NoSuchProcess { pid: u32 },
    /// The PID identifies a process that is not a child of the caller.
    NotChild { pid: u32 },
    /// A named object (executable path, file handle) does not exist.
    NotFound { what: &'static str },
    /// A user string exceeded its transfer bound.
    StringTooLong { max: usize },
}

/// Result type alias for kernel operations
pub type KernelResult<T> = Result<T, KernelError>;

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory { requested } => {
                write!(f, "Out of memory: requested {} bytes", requested)
            }
            Self::BadAddress { addr } => write!(f, "Bad user address: {:#010x}", addr),
            Self::InvalidArgument { what } => write!(f, "Invalid argument: {}", what),
            Self::RegionOverlap { addr } => {
                write!(f, "Region overlaps an existing segment at {:#010x}", addr)
            }
            Self::NoSuchProcess { pid } => write!(f, "No process with pid {}", pid),
            Self::NotChild { pid } => write!(f, "Process {} is not a child of the caller", pid),
            Self::NotFound { what } => write!(f, "Not found: {}", what),
            Self::StringTooLong { max } => {
                write!(f, "User string exceeds the {}-byte transfer bound", max)
            }
        }
    }
}
