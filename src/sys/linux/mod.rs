mod error;
pub mod mem;
pub mod procfs;
pub mod process;
pub mod registers;
mod session;

use std::ffi::{CString, OsString};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Command, Stdio};

use nix::libc;
use nix::sys::ptrace;
use nix::unistd::Pid;

pub use self::error::{Error, Result};
pub use self::session::Session;

/// Size of a page on this system.
pub fn page_size() -> usize {
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}

/// Spawns a new child process in debug-mode.
///
/// The child requests tracing of itself before the exec, so the kernel
/// stops it with a SIGTRAP at its entry point. When a tty path is given,
/// the child's standard streams are redirected onto it.
pub(crate) fn spawn_debuggee(
    path: &Path,
    cwd: Option<&Path>,
    args: &[OsString],
    tty: Option<&Path>,
) -> crate::sys::Result<Pid> {
    let mut command = Command::new(path);
    command.args(args);

    if let Some(cwd) = cwd {
        command.current_dir(cwd);
    }

    if tty.is_none() {
        command.stdin(Stdio::inherit());
        command.stdout(Stdio::inherit());
        command.stderr(Stdio::inherit());
    }

    let tty = tty
        .map(|path| CString::new(path.as_os_str().as_bytes()))
        .transpose()?;

    // Only async-signal-safe calls are allowed between fork and exec.
    unsafe {
        command.pre_exec(move || {
            ptrace::traceme().map_err(|e| io::Error::from_raw_os_error(e as i32))?;

            if let Some(ref tty) = tty {
                let fd = libc::open(tty.as_ptr(), libc::O_RDWR);
                if fd < 0 {
                    return Err(io::Error::last_os_error());
                }

                for std_fd in 0..3 {
                    if libc::dup2(fd, std_fd) < 0 {
                        return Err(io::Error::last_os_error());
                    }
                }
            }

            Ok(())
        })
    };

    let child = command.spawn().map_err(Error::ChildExec)?;

    Ok(Pid::from_raw(child.id() as i32))
}
