use std::path::PathBuf;

use nix::unistd::Pid;

use scroll::Pread;

/// Reads the auxiliary vector of the process with the given ID.
///
/// Entry width follows the debuggee's ELF container, not the engine's.
pub fn auxv_entries(
    pid: Pid,
    elf_ctx: goblin::container::Ctx,
) -> crate::sys::Result<Vec<(u64, u64)>> {
    let path: PathBuf = format!("/proc/{pid}/auxv").into();

    let bytes = std::fs::read(&path).map_err(|e| crate::sys::Error::File(path, e))?;

    let mut entries = Vec::new();
    let mut offset = 0;

    while offset + elf_ctx.size() * 2 <= bytes.len() {
        let (auxv_ty, auxv_val) = if elf_ctx.is_big() {
            let ty: u64 = bytes
                .gread_with(&mut offset, elf_ctx.le)
                .map_err(goblin::error::Error::from)?;
            let val: u64 = bytes
                .gread_with(&mut offset, elf_ctx.le)
                .map_err(goblin::error::Error::from)?;

            (ty, val)
        } else {
            let ty: u32 = bytes
                .gread_with(&mut offset, elf_ctx.le)
                .map_err(goblin::error::Error::from)?;
            let val: u32 = bytes
                .gread_with(&mut offset, elf_ctx.le)
                .map_err(goblin::error::Error::from)?;

            (ty as u64, val as u64)
        };

        entries.push((auxv_ty, auxv_val));
    }

    Ok(entries)
}
