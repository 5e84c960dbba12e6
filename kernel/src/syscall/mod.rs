//! System calls
//!
//! The VM-visible syscall surface: `sbrk`, plus the process calls that
//! mutate address spaces (`fork`, `execv`, `exit`, `waitpid`, `getpid`).
//! Argument marshalling from user space happens here, through the
//! copyin/copyout layer; everything below this boundary works on kernel
//! types.

pub mod memory;
pub mod process;

/// Longest accepted executable path, NUL included.
pub const PATH_MAX: usize = 1024;

/// Bound on the total size of an execv argument block.
pub const ARG_MAX: usize = 64 * 1024;

pub use memory::sys_sbrk;
pub use process::{sys_execv, sys_exit, sys_fork, sys_getpid, sys_waitpid, ExecImage};
