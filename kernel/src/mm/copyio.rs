//! User/kernel memory transfer
//!
//! `copyin`/`copyout` move bytes between kernel buffers and a user
//! address space, one page chunk at a time. Every touched page must lie
//! inside some segment of the space (a miss is the EFAULT of this
//! kernel, [`KernelError::BadAddress`]); backing frames appear through
//! the same lazy path the fault handler uses.

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;

use super::address_space::AddressSpace;
use super::{PhysAddr, VirtAddr, Vm, PAGE_SIZE};
use crate::error::{KernelError, KernelResult};

/// Resolve one user chunk: validate the address, materialize the page,
/// and return the physical address plus how many bytes fit before the
/// page ends.
fn resolve_chunk(
    vm: &Vm,
    as_: &mut AddressSpace,
    uaddr: VirtAddr,
    wanted: usize,
) -> KernelResult<(PhysAddr, usize)> {
    if !as_.contains(uaddr) {
        return Err(KernelError::BadAddress { addr: uaddr.0 });
    }
    let ppn = as_.page_table.map(vm, as_.pid, uaddr)?;
    let offset = uaddr.page_offset();
    let len = wanted.min(PAGE_SIZE - offset);
    Ok((PhysAddr(ppn.0 + offset as u32), len))
}

/// Copy `src` into user memory at `udest`.
pub fn copyout(vm: &Vm, as_: &mut AddressSpace, src: &[u8], udest: VirtAddr) -> KernelResult<()> {
    let mut done = 0;
    while done < src.len() {
        let uaddr = udest.offset(done as u32);
        let (paddr, len) = resolve_chunk(vm, as_, uaddr, src.len() - done)?;
        vm.ram.write(paddr, &src[done..done + len]);
        done += len;
    }
    Ok(())
}

/// Copy `dst.len()` bytes of user memory at `usrc` into `dst`.
pub fn copyin(vm: &Vm, as_: &mut AddressSpace, usrc: VirtAddr, dst: &mut [u8]) -> KernelResult<()> {
    let mut done = 0;
    while done < dst.len() {
        let uaddr = usrc.offset(done as u32);
        let (paddr, len) = resolve_chunk(vm, as_, uaddr, dst.len() - done)?;
        vm.ram.read(paddr, &mut dst[done..done + len]);
        done += len;
    }
    Ok(())
}

/// Copy a NUL-terminated user string of at most `max` bytes (terminator
/// included).
pub fn copyin_str(
    vm: &Vm,
    as_: &mut AddressSpace,
    usrc: VirtAddr,
    max: usize,
) -> KernelResult<String> {
    let mut bytes: Vec<u8> = Vec::new();
    let mut addr = usrc;

    'outer: loop {
        let (paddr, len) = resolve_chunk(vm, as_, addr, max - bytes.len())?;
        let mut chunk = alloc::vec![0u8; len];
        vm.ram.read(paddr, &mut chunk);

        for &byte in &chunk {
            if byte == 0 {
                break 'outer;
            }
            bytes.push(byte);
        }
        if bytes.len() >= max {
            return Err(KernelError::StringTooLong { max });
        }
        addr = addr.offset(len as u32);
    }

    String::from_utf8(bytes).map_err(|_| KernelError::InvalidArgument {
        what: "user string is not valid utf-8",
    })
}

/// Read one user word. The address must be word-aligned.
pub fn copyin_u32(vm: &Vm, as_: &mut AddressSpace, usrc: VirtAddr) -> KernelResult<u32> {
    if usrc.0 % 4 != 0 {
        return Err(KernelError::InvalidArgument {
            what: "unaligned user word read",
        });
    }
    let mut buf = [0u8; 4];
    copyin(vm, as_, usrc, &mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Write one user word. The address must be word-aligned.
pub fn copyout_u32(vm: &Vm, as_: &mut AddressSpace, value: u32, udest: VirtAddr) -> KernelResult<()> {
    if udest.0 % 4 != 0 {
        return Err(KernelError::InvalidArgument {
            what: "unaligned user word write",
        });
    }
    copyout(vm, as_, &value.to_le_bytes(), udest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mm::region::RegionFlags;
    use crate::process::Pid;

    fn rw() -> RegionFlags {
        RegionFlags::READ | RegionFlags::WRITE
    }

    fn setup() -> (Vm, AddressSpace) {
        let vm = Vm::new(64 * PAGE_SIZE, 4 * PAGE_SIZE);
        let mut as_ = AddressSpace::new();
        as_.pid = Pid(1);
        as_.define_region(VirtAddr(0x0040_0000), 2 * PAGE_SIZE, rw())
            .expect("region should be accepted");
        (vm, as_)
    }

    #[test]
    fn test_round_trip_within_one_page() {
        let (vm, mut as_) = setup();
        copyout(&vm, &mut as_, b"hello, user", VirtAddr(0x0040_0100))
            .expect("copyout must succeed");

        let mut buf = [0u8; 11];
        copyin(&vm, &mut as_, VirtAddr(0x0040_0100), &mut buf).expect("copyin must succeed");
        assert_eq!(&buf, b"hello, user");
    }

    #[test]
    fn test_transfer_spanning_a_page_boundary() {
        let (vm, mut as_) = setup();
        let data: Vec<u8> = (0..=255u8).cycle().take(600).collect();
        let base = VirtAddr(0x0040_0F00);

        copyout(&vm, &mut as_, &data, base).expect("copyout must succeed");
        // Two frames were materialized lazily.
        assert_eq!(as_.page_table.len(), 2);

        let mut back = alloc::vec![0u8; 600];
        copyin(&vm, &mut as_, base, &mut back).expect("copyin must succeed");
        assert_eq!(back, data);
    }

    #[test]
    fn test_unmapped_address_is_efault() {
        let (vm, mut as_) = setup();
        let err = copyout(&vm, &mut as_, b"x", VirtAddr(0x0100_0000))
            .expect_err("copyout outside every segment must fail");
        assert_eq!(err, KernelError::BadAddress { addr: 0x0100_0000 });

        // A transfer that starts valid but runs off the region fails too.
        let end = VirtAddr(0x0040_0000 + 2 * PAGE_SIZE as u32 - 2);
        let err = copyout(&vm, &mut as_, b"abcd", end)
            .expect_err("transfer running past the region must fail");
        assert!(matches!(err, KernelError::BadAddress { .. }));
    }

    #[test]
    fn test_copyin_str_stops_at_nul_and_honors_max() {
        let (vm, mut as_) = setup();
        copyout(&vm, &mut as_, b"/bin/true\0garbage", VirtAddr(0x0040_0000))
            .expect("copyout must succeed");

        let s = copyin_str(&vm, &mut as_, VirtAddr(0x0040_0000), 64)
            .expect("string read must succeed");
        assert_eq!(s, "/bin/true");

        let err = copyin_str(&vm, &mut as_, VirtAddr(0x0040_0000), 4)
            .expect_err("string longer than the bound must fail");
        assert_eq!(err, KernelError::StringTooLong { max: 4 });
    }

    #[test]
    fn test_word_helpers() {
        let (vm, mut as_) = setup();
        copyout_u32(&vm, &mut as_, 0xDEAD_BEEF, VirtAddr(0x0040_0010))
            .expect("word write must succeed");
        assert_eq!(
            copyin_u32(&vm, &mut as_, VirtAddr(0x0040_0010)).expect("word read must succeed"),
            0xDEAD_BEEF
        );

        let err = copyin_u32(&vm, &mut as_, VirtAddr(0x0040_0011))
            .expect_err("unaligned word read must fail");
        assert!(matches!(err, KernelError::InvalidArgument { .. }));
    }
}
