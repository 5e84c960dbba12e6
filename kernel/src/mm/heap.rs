//! Kernel heap
//!
//! On bare-metal builds the kernel's own `alloc` support comes from a
//! linked-list allocator over a fixed arena handed in by the boot code
//! (typically carved out with `alloc_kpages` once the coremap is up).
//! Hosted builds (unit tests, tooling) link `std` and use the system
//! allocator instead, so none of this is active there.

#[cfg(target_os = "none")]
use linked_list_allocator::LockedHeap;

#[cfg(target_os = "none")]
#[global_allocator]
static KERNEL_HEAP: LockedHeap = LockedHeap::empty();

/// Default kernel heap size: 1 MiB (256 pages).
pub const KERNEL_HEAP_PAGES: usize = 256;

/// Hand the kernel heap its arena. Called once during boot, before the
/// first kernel allocation.
///
/// # Safety
///
/// `arena` must point to `size` bytes of memory that are reserved for
/// the heap for the lifetime of the kernel and are not used for anything
/// else. Must be called at most once.
#[cfg(target_os = "none")]
pub unsafe fn init(arena: *mut u8, size: usize) {
    // SAFETY: forwarded contract; the caller guarantees the arena is
    // exclusively owned by the heap and outlives it.
    unsafe { KERNEL_HEAP.lock().init(arena, size) }
}
