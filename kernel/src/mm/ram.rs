//! Physical RAM
//!
//! The machine's physical memory, reached through the directly-mapped
//! `kseg0` window. All frame contents live here; the page table and the
//! fault handler move bytes through the frame-granular operations, and
//! copyin/copyout use the byte-granular ones.
//!
//! The window is guarded by a leaf spin lock held only for the duration
//! of a single transfer. It is never held together with the coremap lock.

extern crate alloc;

use alloc::boxed::Box;
use alloc::vec;
use spin::Mutex;

use super::{PhysAddr, PAGE_SIZE};

/// Most RAM the machine can address through `kseg0`.
pub const MAX_RAM: usize = 512 * 1024 * 1024;

/// Bytes one coremap entry occupies in the reserved array.
const COREMAP_ENTRY_BYTES: usize = 8;

/// Number of low frames permanently reserved for the kernel image and
/// the coremap array itself. The allocator never scans below this
/// boundary.
pub fn reserved_frame_count(ramsize: usize, kernel_image_bytes: usize) -> usize {
    // The exception vectors occupy page zero even for a tiny image.
    let kernel_pages = kernel_image_bytes.div_ceil(PAGE_SIZE).max(1);
    let coremap_bytes = (ramsize / PAGE_SIZE) * COREMAP_ENTRY_BYTES;
    let coremap_pages = coremap_bytes.div_ceil(PAGE_SIZE);
    kernel_pages + coremap_pages
}

/// Physical memory, as seen through the kernel's direct map.
pub struct Ram {
    bytes: Mutex<Box<[u8]>>,
    size: usize,
}

impl Ram {
    /// Discover and zero physical memory. `ramsize` is rounded down to a
    /// whole number of pages and capped at [`MAX_RAM`].
    pub fn new(ramsize: usize) -> Self {
        let size = ramsize.min(MAX_RAM) / PAGE_SIZE * PAGE_SIZE;
        Self {
            bytes: Mutex::new(vec![0u8; size].into_boxed_slice()),
            size,
        }
    }

    /// Usable bytes of physical memory.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Zero the frame at `ppn`.
    pub fn zero_frame(&self, ppn: PhysAddr) {
        let start = ppn.as_usize();
        let mut bytes = self.bytes.lock();
        bytes[start..start + PAGE_SIZE].fill(0);
    }

    /// Byte-copy the frame at `src` onto the frame at `dst`.
    pub fn copy_frame(&self, src: PhysAddr, dst: PhysAddr) {
        if src == dst {
            return;
        }
        let mut bytes = self.bytes.lock();
        bytes.copy_within(src.as_usize()..src.as_usize() + PAGE_SIZE, dst.as_usize());
    }

    /// Read `buf.len()` bytes starting at `paddr`.
    pub fn read(&self, paddr: PhysAddr, buf: &mut [u8]) {
        let start = paddr.as_usize();
        let bytes = self.bytes.lock();
        buf.copy_from_slice(&bytes[start..start + buf.len()]);
    }

    /// Write `buf` starting at `paddr`.
    pub fn write(&self, paddr: PhysAddr, buf: &[u8]) {
        let start = paddr.as_usize();
        let mut bytes = self.bytes.lock();
        bytes[start..start + buf.len()].copy_from_slice(buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ram_is_page_granular_and_capped() {
        let ram = Ram::new(3 * PAGE_SIZE + 123);
        assert_eq!(ram.size(), 3 * PAGE_SIZE);
    }

    #[test]
    fn test_frame_copy_and_zero() {
        let ram = Ram::new(4 * PAGE_SIZE);
        let src = PhysAddr(0);
        let dst = PhysAddr(PAGE_SIZE as u32);

        ram.write(src, &[0xAB; 16]);
        ram.copy_frame(src, dst);

        let mut buf = [0u8; 16];
        ram.read(dst, &mut buf);
        assert_eq!(buf, [0xAB; 16]);

        ram.zero_frame(dst);
        ram.read(dst, &mut buf);
        assert_eq!(buf, [0u8; 16]);
    }

    #[test]
    fn test_reserved_frames_cover_kernel_and_coremap() {
        // 64 frames of RAM -> 512 coremap bytes -> 1 coremap page, plus a
        // 4-page kernel image.
        assert_eq!(reserved_frame_count(64 * PAGE_SIZE, 4 * PAGE_SIZE), 5);
        // A zero-size image still reserves the exception-vector page.
        assert_eq!(reserved_frame_count(64 * PAGE_SIZE, 0), 2);
        // 4 MiB of RAM -> 1024 entries -> 8192 bytes -> 2 coremap pages.
        assert_eq!(
            reserved_frame_count(1024 * PAGE_SIZE, 16 * PAGE_SIZE),
            16 + 2
        );
    }
}
