use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;

use nix::sys::ptrace;
use nix::unistd::Pid;

/// Reads one machine word from memory of the process with the given ID.
pub fn read_word(pid: Pid, addr: u64) -> crate::sys::Result<u64> {
    let word = ptrace::read(pid, addr as *mut _)?;

    Ok(word as u64)
}

/// Writes one machine word into memory of the process with the given ID.
pub fn write_word(pid: Pid, addr: u64, word: u64) -> crate::sys::Result<()> {
    ptrace::write(pid, addr as *mut _, word as i64)?;

    Ok(())
}

/// Reads memory of the process with the given ID through its memory
/// file.
///
/// The file is opened per call and closed on return. Returns the number
/// of bytes actually read, which may be short of `buf.len()` when the
/// range crosses into unmapped space.
pub fn read_mem_file(pid: Pid, addr: u64, buf: &mut [u8]) -> crate::sys::Result<usize> {
    let path: PathBuf = format!("/proc/{pid}/mem").into();

    let mut file = File::open(&path).map_err(|e| crate::sys::Error::File(path.clone(), e))?;

    file.seek(SeekFrom::Start(addr))
        .map_err(|e| crate::sys::Error::File(path.clone(), e))?;

    let mut total = 0;
    while total < buf.len() {
        match file.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if total == 0 => return Err(crate::sys::Error::File(path, e)),
            Err(_) => break,
        }
    }

    Ok(total)
}

/// Writes memory into the process with the given ID.
///
/// Whole words are poked directly; an unaligned tail is merged into the
/// word already present in the debuggee.
pub fn write_bytes(pid: Pid, addr: u64, buf: &[u8]) -> crate::sys::Result<()> {
    let mut data_to_write = buf.chunks_exact(std::mem::size_of::<u64>());

    let mut write_addr = addr;

    for chunk in &mut data_to_write {
        let Ok(data) = chunk.try_into().map(u64::from_le_bytes) else {
            unreachable!("chunk should be 8 bytes long");
        };

        write_word(pid, write_addr, data)?;

        write_addr += chunk.len() as u64;
    }

    let remainder = data_to_write.remainder();

    if !remainder.is_empty() {
        let mut old_data = read_word(pid, write_addr)?.to_le_bytes();

        for (old, new) in old_data.iter_mut().zip(remainder) {
            *old = *new;
        }

        write_word(pid, write_addr, u64::from_le_bytes(old_data))?;
    }

    Ok(())
}

/// Reads a NUL-terminated string from memory of the process with the
/// given ID, giving up after `max_len` bytes.
pub fn read_cstring(pid: Pid, mut addr: u64, max_len: usize) -> crate::sys::Result<String> {
    let mut s = Vec::new();

    'outer: while s.len() < max_len {
        let data = ptrace::read(pid, addr as *mut _)?;

        for c in data.to_le_bytes() {
            if c == 0 {
                break 'outer;
            }

            s.push(c);
            if s.len() >= max_len {
                break 'outer;
            }
        }

        addr += std::mem::size_of::<i64>() as u64;
    }

    Ok(String::from_utf8_lossy(&s).into_owned())
}
