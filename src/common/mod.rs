pub mod breakpoint;
pub mod thread;

use std::fmt;

use nix::libc::siginfo_t;
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;

/// Reportable stop observed in the debuggee.
///
/// When an event is surfaced by
/// [`Session::wait_debug_event`](crate::Session::wait_debug_event),
/// every thread of the debuggee has been forced into a stopped state.
pub struct DebugEvent {
    /// Process ID of the debuggee.
    pub pid: Pid,

    /// Thread the event originated from.
    pub tid: Pid,

    /// Wait status the thread was reaped with.
    pub status: WaitStatus,

    /// Signal information associated with the stop, if any.
    pub siginfo: Option<siginfo_t>,
}

impl fmt::Debug for DebugEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebugEvent")
            .field("pid", &self.pid)
            .field("tid", &self.tid)
            .field("status", &self.status)
            .field("siginfo", &self.siginfo.map(|si| si.si_signo))
            .finish()
    }
}

/// How to resume the debuggee after a reported event.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ResumeStatus {
    /// The reported signal was handled by the debugger; consume it.
    Continue,

    /// Pass the reported signal through to the debuggee.
    ContinueUnhandled,

    /// Keep the debuggee stopped.
    Stop,
}

/// Shared object mapped into the debuggee.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Module {
    /// Path of the mapped object.
    pub name: String,

    /// Address the object is loaded at.
    pub base_address: u64,
}
