//! CPU identity of the debugger host: architecture tag, instruction-set
//! extensions, pointer formatting, and the textual names of the
//! well-known registers.

/// Architecture the engine was built for.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CpuType {
    X86,
    X86_64,
}

/// Instruction-set extensions a caller may query for.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Extension {
    Mmx,
    Xmm,
}

/// Returns the architecture tag of this build.
pub const fn cpu_type() -> CpuType {
    if cfg!(target_arch = "x86") {
        CpuType::X86
    } else {
        CpuType::X86_64
    }
}

/// Returns whether the CPU supports the given extension.
///
/// On x86-64 both MMX and SSE are part of the baseline, so the answer
/// is CPU-independent there; on 32-bit x86 the CPU is asked directly.
pub fn has_extension(ext: Extension) -> bool {
    #[cfg(target_arch = "x86_64")]
    {
        match ext {
            Extension::Mmx | Extension::Xmm => true,
        }
    }
    #[cfg(target_arch = "x86")]
    {
        const BIT_MMX: u32 = 1 << 23;
        const BIT_SSE: u32 = 1 << 25;

        let info = unsafe { core::arch::x86::__cpuid(1) };

        match ext {
            Extension::Mmx => info.edx & BIT_MMX != 0,
            Extension::Xmm => info.edx & BIT_SSE != 0,
        }
    }
}

/// Formats an address as zero-padded hexadecimal, 8 digits on x86 and
/// 16 on x86-64.
pub fn format_pointer(addr: u64) -> String {
    if cfg!(target_arch = "x86") {
        format!("{addr:08x}")
    } else {
        format!("{addr:016x}")
    }
}

/// Name of the stack-pointer register.
pub const fn stack_pointer() -> &'static str {
    if cfg!(target_arch = "x86") {
        "esp"
    } else {
        "rsp"
    }
}

/// Name of the frame-pointer register.
pub const fn frame_pointer() -> &'static str {
    if cfg!(target_arch = "x86") {
        "ebp"
    } else {
        "rbp"
    }
}

/// Name of the instruction-pointer register.
pub const fn instruction_pointer() -> &'static str {
    if cfg!(target_arch = "x86") {
        "eip"
    } else {
        "rip"
    }
}

/// Name of the flag register.
pub const fn flag_register() -> &'static str {
    if cfg!(target_arch = "x86") {
        "eflags"
    } else {
        "rflags"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pointer_format_width_matches_arch() {
        let formatted = format_pointer(0xdead);

        match cpu_type() {
            CpuType::X86 => assert_eq!(formatted, "0000dead"),
            CpuType::X86_64 => assert_eq!(formatted, "000000000000dead"),
        }
    }

    #[test]
    fn register_names_match_arch() {
        match cpu_type() {
            CpuType::X86 => {
                assert_eq!(stack_pointer(), "esp");
                assert_eq!(instruction_pointer(), "eip");
            }
            CpuType::X86_64 => {
                assert_eq!(stack_pointer(), "rsp");
                assert_eq!(frame_pointer(), "rbp");
                assert_eq!(instruction_pointer(), "rip");
                assert_eq!(flag_register(), "rflags");
            }
        }
    }

    #[test]
    fn baseline_extensions_are_reported() {
        // every CPU this crate can run on has both
        assert!(has_extension(Extension::Mmx));
        assert!(has_extension(Extension::Xmm));
    }
}
