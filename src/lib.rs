//! Process-control and introspection engine for a native interactive
//! debugger on x86 and x86-64 Linux.
//!
//! The crate wraps the kernel's tracing primitive into a coherent
//! stop-the-world debug session: it spawns a process under trace (or
//! attaches to a running one), pumps debug events across all of its
//! threads, reads and writes its memory and registers, manages software
//! breakpoints, and enumerates loaded modules through the dynamic
//! linker's rendezvous structure.
//!
//! The central type is [`Session`]. A typical interaction:
//!
//! ```no_run
//! use std::time::Duration;
//! use tracectl::{ResumeStatus, Session};
//!
//! # fn main() -> tracectl::Result<()> {
//! let mut session = Session::new();
//! session.open("/bin/true", None, &[], None)?;
//!
//! while let Some(_event) = session.wait_debug_event(Duration::from_millis(1000))? {
//!     // all threads of the debuggee are stopped here
//!     session.resume(ResumeStatus::Continue)?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Note
//!
//! The kernel ties a tracing relationship to the thread that created
//! it: every operation on a session must be issued from the host thread
//! that performed the original `open`/`attach`.

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
compile_error!("only x86 and x86-64 targets are supported");

pub mod arch;
mod common;
mod error;
mod sys;

pub use self::common::breakpoint::{Breakpoint, BreakpointSet, TRAP_OPCODE};
pub use self::common::thread::{ThreadRecord, ThreadState, ThreadTable};
pub use self::common::{DebugEvent, Module, ResumeStatus};
pub use self::error::{Error, Result};
pub use self::sys::procfs::{
    enumerate_processes, list_tasks, parent_pid, parse_stat, thread_info, ProcessInfo, TaskStat,
    ThreadInfo,
};
pub use self::sys::process::{MemoryRegion, TracedProcess};
pub use self::sys::registers::{
    user_regs_32, user_regs_64, GpRegs, RegisterBank, SegmentBases, FSAVE_LEN, FXSAVE_LEN,
};
pub use self::sys::Session;
