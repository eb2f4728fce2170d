use std::fs;
use std::path::PathBuf;

use nix::unistd::Pid;

use super::mem;

/// Handle to the process under trace.
///
/// Memory access through this handle is raw: bytes patched by software
/// breakpoints are returned as the debuggee sees them. The session layer
/// applies breakpoint masking on top.
pub struct TracedProcess {
    pid: Pid,
}

/// One line of the debuggee's virtual-memory map.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MemoryRegion {
    pub start: u64,
    pub end: u64,

    /// Permission string as reported by the kernel, e.g. `r-xp`.
    pub perms: String,

    /// Backing path, when the region is file-backed or named.
    pub name: Option<String>,
}

impl TracedProcess {
    pub(crate) const fn new(pid: Pid) -> Self {
        Self { pid }
    }

    /// Returns the process ID of the debuggee.
    pub const fn pid(&self) -> Pid {
        self.pid
    }

    /// Reads debuggee memory; returns the number of bytes actually read.
    pub fn read_bytes(&self, addr: u64, buf: &mut [u8]) -> crate::sys::Result<usize> {
        mem::read_mem_file(self.pid, addr, buf)
    }

    /// Writes into debuggee memory.
    pub fn write_bytes(&self, addr: u64, buf: &[u8]) -> crate::sys::Result<()> {
        mem::write_bytes(self.pid, addr, buf)
    }

    /// Parses the debuggee's memory map, in address order.
    pub fn regions(&self) -> crate::sys::Result<Vec<MemoryRegion>> {
        let path: PathBuf = format!("/proc/{}/maps", self.pid).into();

        let contents =
            fs::read_to_string(&path).map_err(|e| crate::sys::Error::File(path, e))?;

        Ok(contents.lines().filter_map(parse_maps_line).collect())
    }
}

fn parse_maps_line(line: &str) -> Option<MemoryRegion> {
    let fields: Vec<&str> = line.split_whitespace().collect();

    let (start, end) = fields.first()?.split_once('-')?;

    Some(MemoryRegion {
        start: u64::from_str_radix(start, 16).ok()?,
        end: u64::from_str_radix(end, 16).ok()?,
        perms: fields.get(1).copied().unwrap_or_default().to_owned(),
        name: (fields.len() > 5).then(|| fields[5..].join(" ")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_line_with_path() {
        let region = parse_maps_line(
            "7f8a5c000000-7f8a5c1a8000 r-xp 00000000 08:01 9571 /usr/lib/libc.so.6",
        )
        .expect("region");

        assert_eq!(region.start, 0x7f8a5c000000);
        assert_eq!(region.end, 0x7f8a5c1a8000);
        assert_eq!(region.perms, "r-xp");
        assert_eq!(region.name.as_deref(), Some("/usr/lib/libc.so.6"));
    }

    #[test]
    fn anonymous_maps_line_has_no_name() {
        let region =
            parse_maps_line("7ffd1c000000-7ffd1c021000 rw-p 00000000 00:00 0").expect("region");

        assert_eq!(region.name, None);
    }

    #[test]
    fn own_maps_contain_an_executable_region() {
        let process = TracedProcess::new(Pid::this());

        let regions = process.regions().expect("regions");

        assert!(regions
            .iter()
            .any(|region| region.perms.contains('x')
                && region.name.as_deref().is_some_and(|name| name.starts_with('/'))));
    }
}
