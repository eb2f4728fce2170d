use std::collections::HashSet;

use nix::libc;

use scroll::Pread;

use crate::common::breakpoint::BreakpointSet;
use crate::common::Module;
use crate::sys::mem;
use crate::sys::process::TracedProcess;

/// Walks the dynamic linker's rendezvous structure and returns every
/// shared object recorded in its link map.
///
/// The walk reads `r_map` one word past the structure base, then
/// follows the `l_next` chain; each node contributes a module when its
/// load address is non-zero. A node whose name cannot be read is
/// emitted with an empty name; a node that cannot be read at all ends
/// the walk.
pub fn modules_from_rendezvous(
    process: &TracedProcess,
    breakpoints: &BreakpointSet,
    elf_ctx: goblin::container::Ctx,
    rdebug_addr: u64,
) -> crate::sys::Result<Vec<Module>> {
    let word = elf_ctx.size() as u64;

    let mut modules = Vec::new();

    let mut link_addr = read_addr(process, breakpoints, elf_ctx, rdebug_addr + word)?;

    while link_addr != 0 {
        // link_map: l_addr, l_name, l_ld, l_next, l_prev
        let mut buf = vec![0u8; elf_ctx.size() * 5];
        if process.read_bytes(link_addr, &mut buf)? != buf.len() {
            break;
        }
        breakpoints.mask_buffer(link_addr, &mut buf);

        let mut offset = 0;

        let (l_addr, l_name, l_next) = if elf_ctx.is_big() {
            let l_addr: u64 = buf
                .gread_with(&mut offset, elf_ctx.le)
                .map_err(goblin::error::Error::from)?;
            let l_name: u64 = buf
                .gread_with(&mut offset, elf_ctx.le)
                .map_err(goblin::error::Error::from)?;

            offset += elf_ctx.size(); // skip l_ld

            let l_next: u64 = buf
                .gread_with(&mut offset, elf_ctx.le)
                .map_err(goblin::error::Error::from)?;

            (l_addr, l_name, l_next)
        } else {
            let l_addr: u32 = buf
                .gread_with(&mut offset, elf_ctx.le)
                .map_err(goblin::error::Error::from)?;
            let l_name: u32 = buf
                .gread_with(&mut offset, elf_ctx.le)
                .map_err(goblin::error::Error::from)?;

            offset += elf_ctx.size();

            let l_next: u32 = buf
                .gread_with(&mut offset, elf_ctx.le)
                .map_err(goblin::error::Error::from)?;

            (l_addr as u64, l_name as u64, l_next as u64)
        };

        if l_addr != 0 {
            let name = mem::read_cstring(process.pid(), l_name, libc::PATH_MAX as usize)
                .unwrap_or_default();

            modules.push(Module {
                name,
                base_address: l_addr,
            });
        }

        link_addr = l_next;
    }

    Ok(modules)
}

/// Derives the module list from the debuggee's memory map: every region
/// backed by an absolute path yields one module at the first region
/// carrying that path.
pub fn modules_from_regions(process: &TracedProcess) -> crate::sys::Result<Vec<Module>> {
    let mut found = HashSet::new();
    let mut modules = Vec::new();

    for region in process.regions()? {
        let Some(name) = region.name else {
            continue;
        };

        if !name.starts_with('/') {
            continue;
        }

        if found.insert(name.clone()) {
            modules.push(Module {
                name,
                base_address: region.start,
            });
        }
    }

    Ok(modules)
}

fn read_addr(
    process: &TracedProcess,
    breakpoints: &BreakpointSet,
    elf_ctx: goblin::container::Ctx,
    addr: u64,
) -> crate::sys::Result<u64> {
    let mut buf = vec![0u8; elf_ctx.size()];

    let n = process.read_bytes(addr, &mut buf)?;
    if n != buf.len() {
        return Err(crate::sys::Error::PartialMemOp(n, buf.len()));
    }
    breakpoints.mask_buffer(addr, &mut buf);

    let value = if elf_ctx.is_big() {
        buf.pread_with::<u64>(0, elf_ctx.le)
            .map_err(goblin::error::Error::from)?
    } else {
        buf.pread_with::<u32>(0, elf_ctx.le)
            .map_err(goblin::error::Error::from)? as u64
    };

    Ok(value)
}
