use std::ffi::c_void;
use std::mem;

use nix::errno::Errno;
use nix::libc;
use nix::sys::ptrace::regset::NT_PRSTATUS;
use nix::sys::ptrace::{self, RegisterSet};
use nix::unistd::Pid;

// Requests and note types the `nix` wrapper does not cover.
const PTRACE_GETFPREGS: libc::c_uint = 14;
const PTRACE_GETFPXREGS: libc::c_uint = 18;
const PTRACE_GET_THREAD_AREA: libc::c_uint = 25;
const NT_X86_XSTATE: libc::c_int = 0x202;

const LDT_ENTRY_SIZE: u32 = 8;

/// Size of an FXSAVE image (x87 + SSE state).
pub const FXSAVE_LEN: usize = 512;

/// Size of a legacy FSAVE image (x87 state only, 32-bit FPREGS).
pub const FSAVE_LEN: usize = 108;

/// Upper bound for the processor's XSAVE area.
const XSAVE_BUF_LEN: usize = 4096;

#[repr(C)]
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, Default)]
pub struct user_regs_32 {
    pub ebx: u32,
    pub ecx: u32,
    pub edx: u32,
    pub esi: u32,
    pub edi: u32,
    pub ebp: u32,
    pub eax: u32,
    pub ds: u32,
    pub es: u32,
    pub fs: u32,
    pub gs: u32,
    pub orig_eax: u32,
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
    pub esp: u32,
    pub ss: u32,
}

#[repr(C)]
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, Default)]
pub struct user_regs_64 {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub rbp: u64,
    pub rbx: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rax: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rsi: u64,
    pub rdi: u64,
    pub orig_rax: u64,
    pub rip: u64,
    pub cs: u64,
    pub eflags: u64,
    pub rsp: u64,
    pub ss: u64,
    pub fs_base: u64,
    pub gs_base: u64,
    pub ds: u64,
    pub es: u64,
    pub fs: u64,
    pub gs: u64,
}

#[repr(C)]
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Default)]
struct user_desc {
    entry_number: u32,
    base_addr: u32,
    limit: u32,
    flags: u32,
}

/// General-purpose registers, in the word width of the debuggee.
///
/// The width is discovered at acquisition time from the size the kernel
/// reports for the register set, so a 64-bit engine reassembles 32-bit
/// debuggees correctly.
#[derive(Clone, Copy, Debug)]
pub enum GpRegs {
    B32(user_regs_32),
    B64(user_regs_64),
}

impl GpRegs {
    pub fn instruction_pointer(&self) -> u64 {
        match self {
            Self::B32(regs) => regs.eip as u64,
            Self::B64(regs) => regs.rip,
        }
    }

    pub fn stack_pointer(&self) -> u64 {
        match self {
            Self::B32(regs) => regs.esp as u64,
            Self::B64(regs) => regs.rsp,
        }
    }

    pub fn frame_pointer(&self) -> u64 {
        match self {
            Self::B32(regs) => regs.ebp as u64,
            Self::B64(regs) => regs.rbp,
        }
    }

    pub fn flags(&self) -> u64 {
        match self {
            Self::B32(regs) => regs.eflags as u64,
            Self::B64(regs) => regs.eflags,
        }
    }

    pub fn set_instruction_pointer(&mut self, addr: u64) {
        match self {
            Self::B32(regs) => regs.eip = addr as u32,
            Self::B64(regs) => regs.rip = addr,
        }
    }
}

/// Segment base addresses derived from the thread-area descriptors of a
/// 32-bit debuggee.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SegmentBases {
    pub fs_base: u32,
    pub gs_base: u32,
}

/// Snapshot of one thread's register state.
///
/// Every sub-bank is optional: a `None` means the corresponding state
/// could not be acquired (or does not exist on this combination of CPU,
/// kernel and debuggee width). All presence flags are cleared at the
/// start of every acquisition.
pub struct RegisterBank {
    /// General-purpose registers.
    pub gp: Option<GpRegs>,

    /// FS/GS bases of a 32-bit debuggee; filled only when both lookups
    /// succeed.
    pub seg_bases: Option<SegmentBases>,

    /// XSAVE area, trimmed to the length the kernel reported.
    pub xsave: Option<Vec<u8>>,

    /// FXSAVE image (x87 + SSE).
    pub fx: Option<Box<[u8; FXSAVE_LEN]>>,

    /// Legacy FSAVE image (x87 only).
    pub x87: Option<[u8; FSAVE_LEN]>,

    /// Debug registers 0-7; indices 4 and 5 are always zero.
    pub debug: [u64; 8],

    /// Whether `debug` holds values read from the thread.
    pub debug_filled: bool,
}

impl Default for RegisterBank {
    fn default() -> Self {
        Self {
            gp: None,
            seg_bases: None,
            xsave: None,
            fx: None,
            x87: None,
            debug: [0; 8],
            debug_filled: false,
        }
    }
}

impl RegisterBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears every sub-bank and presence flag.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn instruction_pointer(&self) -> Option<u64> {
        self.gp.as_ref().map(GpRegs::instruction_pointer)
    }

    pub fn stack_pointer(&self) -> Option<u64> {
        self.gp.as_ref().map(GpRegs::stack_pointer)
    }

    pub fn frame_pointer(&self) -> Option<u64> {
        self.gp.as_ref().map(GpRegs::frame_pointer)
    }

    pub fn flags(&self) -> Option<u64> {
        self.gp.as_ref().map(GpRegs::flags)
    }
}

/// Acquires the full register state of a stopped thread.
///
/// `fpx_supported` caches whether `PTRACE_GETFPXREGS` works on this
/// kernel, so an unsupported request is not retried on every call.
pub fn fetch_state(
    tid: Pid,
    fpx_supported: &mut bool,
    bank: &mut RegisterBank,
) -> crate::sys::Result<()> {
    bank.clear();

    let gp = get_gp_regs(tid).inspect_err(
        |e| tracing::error!(error = %e, tid = tid.as_raw(), "PTRACE_GETREGSET/NT_PRSTATUS"),
    )?;

    if let GpRegs::B32(ref regs) = gp {
        bank.seg_bases = get_segment_bases(tid, regs);
    }

    let is_32bit = matches!(gp, GpRegs::B32(_));
    bank.gp = Some(gp);

    match get_xstate(tid) {
        Ok(xsave) => bank.xsave = Some(xsave),
        Err(_) => {
            if is_32bit && *fpx_supported {
                match get_fpxregs(tid) {
                    Ok(fx) => bank.fx = Some(fx),
                    Err(_) => *fpx_supported = false,
                }
            }

            if bank.fx.is_none() {
                // On 32-bit the plain FPREGS carry x87 state only; on
                // 64-bit they already contain the full FXSAVE image.
                match get_fpregs(tid) {
                    Ok(buf) if is_32bit => {
                        let mut x87 = [0u8; FSAVE_LEN];
                        x87.copy_from_slice(&buf[..FSAVE_LEN]);
                        bank.x87 = Some(x87);
                    }
                    Ok(buf) => bank.fx = Some(buf),
                    Err(e) => {
                        tracing::error!(error = %e, tid = tid.as_raw(), "PTRACE_GETFPREGS")
                    }
                }
            }
        }
    }

    for index in [0, 1, 2, 3, 6, 7] {
        bank.debug[index] =
            ptrace::read_user(tid, debug_reg_offset(index) as *mut _)? as u64;
    }
    bank.debug[4] = 0;
    bank.debug[5] = 0;
    bank.debug_filled = true;

    Ok(())
}

/// Writes a register bank back into a stopped thread.
///
/// Restores the general-purpose registers and the debug registers;
/// indices 4 and 5 of the latter are skipped.
pub fn apply_state(tid: Pid, bank: &RegisterBank) -> crate::sys::Result<()> {
    match bank.gp {
        Some(GpRegs::B32(ref regs)) => set_regset(tid, regs)?,
        Some(GpRegs::B64(ref regs)) => set_regset(tid, regs)?,
        None => (),
    }

    if bank.debug_filled {
        for index in [0, 1, 2, 3, 6, 7] {
            ptrace::write_user(
                tid,
                debug_reg_offset(index) as *mut _,
                bank.debug[index] as libc::c_long,
            )?;
        }
    }

    Ok(())
}

fn debug_reg_offset(index: usize) -> usize {
    mem::offset_of!(libc::user, u_debugreg) + index * mem::size_of::<usize>()
}

fn get_gp_regs(tid: Pid) -> crate::sys::Result<GpRegs> {
    let mut data = mem::MaybeUninit::<user_regs_64>::uninit();

    let mut iov = libc::iovec {
        iov_base: data.as_mut_ptr().cast(),
        iov_len: mem::size_of::<user_regs_64>(),
    };

    unsafe {
        Errno::result(libc::ptrace(
            ptrace::Request::PTRACE_GETREGSET as libc::c_uint,
            tid.as_raw(),
            NT_PRSTATUS::VALUE as libc::c_int,
            &mut iov as *mut libc::iovec,
        ))?
    };

    let regs = if iov.iov_len == mem::size_of::<user_regs_64>() {
        GpRegs::B64(unsafe { data.assume_init() })
    } else {
        GpRegs::B32(unsafe { *data.as_ptr().cast::<user_regs_32>() })
    };

    Ok(regs)
}

fn set_regset<T>(tid: Pid, regs: &T) -> crate::sys::Result<()> {
    let mut iov = libc::iovec {
        iov_base: regs as *const T as *mut c_void,
        iov_len: mem::size_of::<T>(),
    };

    unsafe {
        Errno::result(libc::ptrace(
            ptrace::Request::PTRACE_SETREGSET as libc::c_uint,
            tid.as_raw(),
            NT_PRSTATUS::VALUE as libc::c_int,
            &mut iov as *mut libc::iovec,
        ))?
    };

    Ok(())
}

fn get_segment_bases(tid: Pid, regs: &user_regs_32) -> Option<SegmentBases> {
    let fs = get_thread_area(tid, regs.fs / LDT_ENTRY_SIZE);
    let gs = get_thread_area(tid, regs.gs / LDT_ENTRY_SIZE);

    match (fs, gs) {
        (Ok(fs), Ok(gs)) => Some(SegmentBases {
            fs_base: fs.base_addr,
            gs_base: gs.base_addr,
        }),
        _ => None,
    }
}

fn get_thread_area(tid: Pid, entry: u32) -> crate::sys::Result<user_desc> {
    let mut desc = user_desc::default();

    unsafe {
        Errno::result(libc::ptrace(
            PTRACE_GET_THREAD_AREA,
            tid.as_raw(),
            entry as libc::c_int,
            &mut desc as *mut user_desc,
        ))?
    };

    Ok(desc)
}

fn get_xstate(tid: Pid) -> crate::sys::Result<Vec<u8>> {
    let mut buf = vec![0u8; XSAVE_BUF_LEN];

    let mut iov = libc::iovec {
        iov_base: buf.as_mut_ptr().cast(),
        iov_len: buf.len(),
    };

    unsafe {
        Errno::result(libc::ptrace(
            ptrace::Request::PTRACE_GETREGSET as libc::c_uint,
            tid.as_raw(),
            NT_X86_XSTATE,
            &mut iov as *mut libc::iovec,
        ))?
    };

    buf.truncate(iov.iov_len);

    Ok(buf)
}

fn get_fpxregs(tid: Pid) -> crate::sys::Result<Box<[u8; FXSAVE_LEN]>> {
    let mut buf = Box::new([0u8; FXSAVE_LEN]);

    unsafe {
        Errno::result(libc::ptrace(
            PTRACE_GETFPXREGS,
            tid.as_raw(),
            0,
            buf.as_mut_ptr(),
        ))?
    };

    Ok(buf)
}

fn get_fpregs(tid: Pid) -> crate::sys::Result<Box<[u8; FXSAVE_LEN]>> {
    let mut buf = Box::new([0u8; FXSAVE_LEN]);

    unsafe {
        Errno::result(libc::ptrace(
            PTRACE_GETFPREGS,
            tid.as_raw(),
            0,
            buf.as_mut_ptr(),
        ))?
    };

    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleared_bank_has_no_presence_flags() {
        let mut bank = RegisterBank::new();

        bank.gp = Some(GpRegs::B64(user_regs_64 {
            rip: 0x1234,
            ..Default::default()
        }));
        bank.debug_filled = true;
        bank.clear();

        assert!(bank.gp.is_none());
        assert!(bank.seg_bases.is_none());
        assert!(bank.xsave.is_none());
        assert!(bank.fx.is_none());
        assert!(bank.x87.is_none());
        assert!(!bank.debug_filled);
    }

    #[test]
    fn gp_accessors_follow_the_width_variant() {
        let narrow = GpRegs::B32(user_regs_32 {
            eip: 0x0804_8000,
            esp: 0xbfff_0000,
            ..Default::default()
        });
        let wide = GpRegs::B64(user_regs_64 {
            rip: 0x5555_5555_0000,
            rsp: 0x7fff_ffff_e000,
            ..Default::default()
        });

        assert_eq!(narrow.instruction_pointer(), 0x0804_8000);
        assert_eq!(narrow.stack_pointer(), 0xbfff_0000);
        assert_eq!(wide.instruction_pointer(), 0x5555_5555_0000);
        assert_eq!(wide.stack_pointer(), 0x7fff_ffff_e000);
    }

    #[test]
    fn register_set_sizes_discriminate_width() {
        assert_eq!(mem::size_of::<user_regs_32>(), 68);
        assert_eq!(mem::size_of::<user_regs_64>(), 216);
    }
}
