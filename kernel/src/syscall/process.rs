//! Process system calls
//!
//! The process-lifecycle calls, reduced to their VM-relevant substance:
//!
//! - `fork` clones the file table, allocates a PID, and deep-copies the
//!   address space. Any failure unwinds every step already taken, in
//!   reverse order.
//! - `execv` marshals the path and argument vector into kernel buffers,
//!   builds a brand-new address space from the named program, lays the
//!   argv image out on the new user stack, and only then destroys the
//!   old space. Failure at any earlier point leaves the caller's space
//!   untouched.
//! - `exit` releases the VM and file resources, turns the process into a
//!   zombie, and signals the parent's wait exactly once.
//! - `waitpid` validates the target, waits for the exit signal, and
//!   reaps the zombie.

extern crate alloc;

use alloc::vec::Vec;
use log::debug;

use super::{ARG_MAX, PATH_MAX};
use crate::error::{KernelError, KernelResult};
use crate::loader::load_program;
use crate::mm::copyio::{copyin_str, copyin_u32, copyout, copyout_u32};
use crate::mm::{AddressSpace, VirtAddr, Vm};
use crate::process::{Pid, ProcessState, ProcessTable};

/// What execv hands back for the trap layer to enter user mode with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecImage {
    /// Program entry point.
    pub entry: VirtAddr,
    /// Initial stack pointer (sits at the argv array).
    pub stack_ptr: VirtAddr,
    pub argc: usize,
    /// User address of the argv pointer array.
    pub argv: VirtAddr,
}

/// The caller's own PID.
pub fn sys_getpid(pid: Pid) -> Pid {
    pid
}

/// Create a child of `parent`: shared file handles, fresh PID, and a
/// deep copy of the parent's address space.
pub fn sys_fork(vm: &Vm, table: &ProcessTable, parent: Pid) -> KernelResult<Pid> {
    // Clone the descriptor table first; dropping the clone undoes the
    // reference-count increments if anything later fails.
    let (parent_name, child_ft) = table
        .with_process(parent, |p| (p.name.clone(), p.file_table.clone_for_fork()))
        .ok_or(KernelError::NoSuchProcess { pid: parent.0 })?;

    let mut child_name = parent_name;
    child_name.push_str("-fork");
    let child = table.create_process(&child_name, parent);

    let parent_as = match table.take_addrspace(parent) {
        Some(space) => space,
        None => {
            table.remove(child);
            return Err(KernelError::NoSuchProcess { pid: parent.0 });
        }
    };

    let copied = parent_as.copy(vm, child);
    table.put_addrspace(parent, parent_as);

    match copied {
        Ok(child_as) => {
            table.with_process(child, |c| {
                c.addrspace = Some(child_as);
                c.file_table = child_ft;
            });
            debug!("fork: pid {} -> child {}", parent.0, child.0);
            Ok(child)
        }
        Err(err) => {
            // Reverse order: the failed copy already destroyed the
            // partial space, so clear the PID entry and let the cloned
            // descriptor table drop.
            table.remove(child);
            Err(err)
        }
    }
}

/// Marshalled argument block: every argument NUL-terminated and padded
/// to the next word boundary, plus the offset of each argument within
/// the block.
struct ArgBlock {
    bytes: Vec<u8>,
    offsets: Vec<usize>,
}

/// Copy the user argv array (NULL-terminated vector of string pointers)
/// into one concatenated, word-aligned kernel buffer.
fn marshal_args(vm: &Vm, as_: &mut AddressSpace, uargv: VirtAddr) -> KernelResult<ArgBlock> {
    let mut bytes: Vec<u8> = Vec::new();
    let mut offsets: Vec<usize> = Vec::new();

    for index in 0..ARG_MAX as u32 {
        let uptr = copyin_u32(vm, as_, uargv.offset(index * 4))?;
        if uptr == 0 {
            break;
        }
        let arg = copyin_str(vm, as_, VirtAddr(uptr), ARG_MAX)?;

        offsets.push(bytes.len());
        bytes.extend_from_slice(arg.as_bytes());
        bytes.push(0);
        while bytes.len() % 4 != 0 {
            bytes.push(0);
        }
        if bytes.len() > ARG_MAX {
            return Err(KernelError::InvalidArgument {
                what: "argument block exceeds ARG_MAX",
            });
        }
    }

    Ok(ArgBlock { bytes, offsets })
}

/// Lay the argv image out on a fresh user stack: the padded string block
/// topmost, the NULL-terminated pointer array just beneath it. The new
/// stack pointer sits at the argv array; both are word-aligned because
/// the block is padded and the array holds words.
fn build_argv_image(
    vm: &Vm,
    as_: &mut AddressSpace,
    args: &ArgBlock,
) -> KernelResult<VirtAddr> {
    let stack_top = as_.define_stack();

    let string_base = VirtAddr(stack_top.0 - args.bytes.len() as u32);
    if !args.bytes.is_empty() {
        copyout(vm, as_, &args.bytes, string_base)?;
    }

    let argc = args.offsets.len();
    let argv_base = VirtAddr(string_base.0 - ((argc + 1) * 4) as u32);
    for (slot, offset) in args.offsets.iter().enumerate() {
        copyout_u32(
            vm,
            as_,
            string_base.0 + *offset as u32,
            argv_base.offset((slot * 4) as u32),
        )?;
    }
    copyout_u32(vm, as_, 0, argv_base.offset((argc * 4) as u32))?;

    Ok(argv_base)
}

/// Replace the address space of `pid` with a fresh one running the
/// program named by the user string at `upath`, with the argument
/// vector at `uargv`.
pub fn sys_execv(
    vm: &Vm,
    table: &ProcessTable,
    pid: Pid,
    upath: VirtAddr,
    uargv: VirtAddr,
) -> KernelResult<ExecImage> {
    let mut old_as = table
        .take_addrspace(pid)
        .ok_or(KernelError::NoSuchProcess { pid: pid.0 })?;

    // Everything up to the commit point runs against the old space and
    // restores it on failure.
    let staged = stage_exec(vm, &mut old_as, pid, upath, uargv);
    match staged {
        Ok((new_as, image)) => {
            new_as.activate(vm);
            old_as.destroy(vm);
            table.put_addrspace(pid, new_as);
            debug!("execv: pid {} entering at {:#010x}", pid.0, image.entry.0);
            Ok(image)
        }
        Err(err) => {
            table.put_addrspace(pid, old_as);
            Err(err)
        }
    }
}

/// Marshal from the old space, then build and populate the new one.
fn stage_exec(
    vm: &Vm,
    old_as: &mut AddressSpace,
    pid: Pid,
    upath: VirtAddr,
    uargv: VirtAddr,
) -> KernelResult<(AddressSpace, ExecImage)> {
    let path = copyin_str(vm, old_as, upath, PATH_MAX)?;
    let args = marshal_args(vm, old_as, uargv)?;

    let program = vm
        .programs
        .lookup(&path)
        .ok_or(KernelError::NotFound { what: "executable" })?;

    let mut new_as = AddressSpace::new();
    new_as.pid = pid;

    let built = load_program(vm, &mut new_as, &program)
        .and_then(|()| build_argv_image(vm, &mut new_as, &args));
    match built {
        Ok(argv_base) => Ok((
            new_as,
            ExecImage {
                entry: program.entry,
                stack_ptr: argv_base,
                argc: args.offsets.len(),
                argv: argv_base,
            },
        )),
        Err(err) => {
            new_as.destroy(vm);
            Err(err)
        }
    }
}

/// Terminate `pid`: release the address space and file handles, become
/// a zombie holding `code`, and signal the parent's wait exactly once.
pub fn sys_exit(vm: &Vm, table: &ProcessTable, pid: Pid, code: i32) -> KernelResult<()> {
    if let Some(space) = table.take_addrspace(pid) {
        space.destroy(vm);
    }

    let sem = table
        .with_process(pid, |p| {
            p.file_table.close_all();
            p.state = ProcessState::Zombie;
            p.exit_code = code;
            p.exit_sem.clone()
        })
        .ok_or(KernelError::NoSuchProcess { pid: pid.0 })?;

    // Exactly one signal, on every exit path.
    sem.v();
    Ok(())
}

/// Wait for child `target` of `caller` to exit; reap it and return its
/// exit code.
pub fn sys_waitpid(table: &ProcessTable, caller: Pid, target: Pid) -> KernelResult<i32> {
    if !table.exists(target) {
        return Err(KernelError::NoSuchProcess { pid: target.0 });
    }
    if !table.is_child_of(caller, target) {
        return Err(KernelError::NotChild { pid: target.0 });
    }

    let sem = table
        .exit_sem_of(target)
        .ok_or(KernelError::NoSuchProcess { pid: target.0 })?;
    sem.p();

    let proc = table
        .remove(target)
        .ok_or(KernelError::NoSuchProcess { pid: target.0 })?;
    Ok(proc.exit_code)
}
