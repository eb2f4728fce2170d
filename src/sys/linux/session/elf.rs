use std::path::PathBuf;

use goblin::elf::dynamic::{Dyn, DT_DEBUG, DT_NULL};
use goblin::elf::header::{EM_386, EM_X86_64, ET_DYN};
use goblin::elf::program_header::PT_DYNAMIC;
use goblin::elf::{Elf, ProgramHeader};

use nix::libc::{AT_ENTRY, AT_PHDR, AT_PHNUM};
use nix::unistd::Pid;

use scroll::Pread;

use super::auxv::auxv_entries;
use crate::sys::process::TracedProcess;

/// What the engine knows about the debuggee's executable image: its ELF
/// container and where the dynamic linker publishes the address of its
/// rendezvous structure.
pub struct BinaryInfo {
    /// Address of the `DT_DEBUG` value slot in the debuggee, or zero.
    rdebug_addr_loc: u64,

    elf_ctx: goblin::container::Ctx,
}

impl BinaryInfo {
    /// Address of the `r_debug` structure in the debuggee, or zero when
    /// unavailable (static binary, or linker not yet initialized).
    ///
    /// The slot is re-read on every call: the linker only patches it in
    /// during its own startup, some time after the initial exec stop.
    pub fn debug_pointer(&self, process: &TracedProcess) -> crate::sys::Result<u64> {
        if self.rdebug_addr_loc == 0 {
            return Ok(0);
        }

        let mut buf = vec![0u8; self.elf_ctx.size()];
        read_exact(process, self.rdebug_addr_loc, &mut buf)?;

        let value = if self.elf_ctx.is_big() {
            buf.pread_with::<u64>(0, self.elf_ctx.le)
                .map_err(goblin::error::Error::from)?
        } else {
            buf.pread_with::<u32>(0, self.elf_ctx.le)
                .map_err(goblin::error::Error::from)? as u64
        };

        Ok(value)
    }

    /// Container (word size, endianness) of the debuggee's executable.
    pub const fn elf_ctx(&self) -> goblin::container::Ctx {
        self.elf_ctx
    }
}

/// Scans the debuggee's mapped executable for the rendezvous pointer.
pub fn scan_debuggee(pid: Pid, process: &TracedProcess) -> crate::sys::Result<BinaryInfo> {
    //
    // Fetch ELF header.
    //

    let path: PathBuf = format!("/proc/{pid}/exe").into();
    let elf = std::fs::read(&path).map_err(|e| crate::sys::Error::File(path, e))?;

    let header = Elf::parse_header(&elf)?;

    if header.e_machine != EM_X86_64 && header.e_machine != EM_386 {
        return Err(crate::sys::Error::ElfPlatform(header.e_machine));
    }

    let elf_ctx = goblin::container::Ctx::new(header.container()?, header.endianness()?);

    //
    // Traverse auxiliary vector.
    //

    let mut phdr = None;
    let mut phnum = None;
    let mut entry_addr = None;

    for (auxv_ty, auxv_val) in auxv_entries(pid, elf_ctx)? {
        if auxv_ty == AT_PHDR as u64 {
            phdr = Some(auxv_val);
        } else if auxv_ty == AT_PHNUM as u64 {
            phnum = Some(auxv_val as usize);
        } else if auxv_ty == AT_ENTRY as u64 {
            entry_addr = Some(auxv_val);
        }
    }

    let phdr = phdr.ok_or(crate::sys::Error::MissingAuxv)?;
    let phnum = phnum.ok_or(crate::sys::Error::MissingAuxv)?;
    let entry_addr = entry_addr.ok_or(crate::sys::Error::MissingAuxv)?;

    //
    // Fetch program headers from the debuggee.
    //

    let mut buf = vec![0u8; ProgramHeader::size(elf_ctx) * phnum];
    read_exact(process, phdr, &mut buf)?;

    let phdrs = ProgramHeader::parse(&buf, 0, phnum, elf_ctx)?;

    // For a PIE the auxv entry point is the relocated one.
    let base_addr = matches!(header.e_type, ET_DYN).then(|| entry_addr - header.e_entry);

    tracing::debug!(
        addr = format_args!("{phdr:#x}"),
        count = phnum,
        base = base_addr.unwrap_or(0),
        "fetched program headers"
    );

    //
    // Fetch the `r_debug` address from DT_DEBUG.
    //

    let Some(pt_dyn) = phdrs.iter().find(|phdr| phdr.p_type == PT_DYNAMIC) else {
        return Ok(BinaryInfo {
            rdebug_addr_loc: 0,
            elf_ctx,
        });
    };

    let dyn_addr = base_addr.map_or(pt_dyn.p_vaddr, |base| base + pt_dyn.p_vaddr);

    let mut dyn_sect = vec![0u8; pt_dyn.p_memsz as usize];
    read_exact(process, dyn_addr, &mut dyn_sect)?;

    let rdebug_addr_loc = fetch_rdebug_addr_loc(dyn_addr, &dyn_sect, elf_ctx)?;

    tracing::debug!(
        addr_of_addr = format_args!("{rdebug_addr_loc:#x}"),
        "fetched r_debug location from PT_DYNAMIC"
    );

    Ok(BinaryInfo {
        rdebug_addr_loc,
        elf_ctx,
    })
}

/// Walks a `_DYNAMIC` section image read out of the debuggee and returns
/// the in-memory address of the `DT_DEBUG` value slot, or zero when the
/// entry is absent.
fn fetch_rdebug_addr_loc(
    dyn_sect_addr: u64,
    dyn_sect: &[u8],
    elf_ctx: goblin::container::Ctx,
) -> crate::sys::Result<u64> {
    let dyn_len = dyn_sect.len() / Dyn::size(elf_ctx.container);

    let mut offset = 0;

    for _ in 0..dyn_len {
        let entry_addr = dyn_sect_addr + offset as u64;

        let dynamic: Dyn = dyn_sect
            .gread_with(&mut offset, elf_ctx)
            .map_err(goblin::error::Error::from)?;

        match dynamic.d_tag {
            DT_NULL => break,
            // the value cell sits one word past the tag
            DT_DEBUG => return Ok(entry_addr + elf_ctx.size() as u64),
            _ => (),
        }
    }

    Ok(0)
}

fn read_exact(process: &TracedProcess, addr: u64, buf: &mut [u8]) -> crate::sys::Result<()> {
    let n = process.read_bytes(addr, buf)?;

    if n != buf.len() {
        return Err(crate::sys::Error::PartialMemOp(n, buf.len()));
    }

    Ok(())
}
