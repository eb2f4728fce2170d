mod auxv;
mod elf;
mod rdebug;

use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;

use nix::errno::Errno;
use nix::libc;
use nix::sys::ptrace::{self, Options};
use nix::sys::signal::{self, SigSet, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

pub use self::elf::BinaryInfo;
use crate::common::breakpoint::{Breakpoint, BreakpointSet, TRAP_OPCODE};
use crate::common::thread::ThreadTable;
use crate::common::{DebugEvent, Module, ResumeStatus};
use crate::sys::process::TracedProcess;
use crate::sys::registers::{self, RegisterBank};
use crate::sys::{mem, procfs};

const NO_THREAD: Pid = Pid::from_raw(0);

/// Debug session over one process and all of its threads.
///
/// The session is a single-threaded reactor: the host thread that
/// performed `open`/`attach` owns the kernel-side tracing relationship
/// and must issue every subsequent operation.
///
/// Whenever [`wait_debug_event`](Self::wait_debug_event) surfaces an
/// event, every thread of the debuggee has been forced into a
/// stopped-and-reaped state; [`resume`](Self::resume) hands each one
/// back to the scheduler with the signal it originally stopped with.
pub struct Session {
    /// Process ID of the debuggee; zero when detached.
    pid: Pid,

    /// Thread register and stepping operations apply to.
    active_tid: Pid,

    /// Thread the last reported event originated from.
    event_tid: Pid,

    threads: ThreadTable,

    breakpoints: BreakpointSet,

    /// Rendezvous information of the debuggee's executable, when found.
    binary_info: Option<BinaryInfo>,

    process: Option<TracedProcess>,

    /// Initial stop of `open`/`attach`, surfaced by the next wait.
    pending_event: Option<DebugEvent>,

    /// Whether PTRACE_GETFPXREGS is worth trying on this kernel.
    fpx_supported: bool,

    page_size: usize,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Creates a detached session.
    pub fn new() -> Self {
        Self {
            pid: NO_THREAD,
            active_tid: NO_THREAD,
            event_tid: NO_THREAD,
            threads: ThreadTable::new(),
            breakpoints: BreakpointSet::new(),
            binary_info: None,
            process: None,
            pending_event: None,
            fpx_supported: true,
            page_size: crate::sys::page_size(),
        }
    }

    pub fn attached(&self) -> bool {
        self.process.is_some()
    }

    /// Process ID of the debuggee; zero when detached.
    pub const fn pid(&self) -> Pid {
        self.pid
    }

    pub const fn active_thread(&self) -> Pid {
        self.active_tid
    }

    pub const fn event_thread(&self) -> Pid {
        self.event_tid
    }

    pub const fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn process(&self) -> Option<&TracedProcess> {
        self.process.as_ref()
    }

    /// Thread IDs currently tracked, in no particular order.
    pub fn thread_ids(&self) -> Vec<Pid> {
        self.threads.ids()
    }

    /// Returns whether every tracked thread is in the stopped-and-reaped
    /// state.
    pub fn all_threads_stopped(&self) -> bool {
        self.threads.all_reaped()
    }

    pub fn breakpoints(&self) -> &BreakpointSet {
        &self.breakpoints
    }

    /// Spawns a process under trace.
    ///
    /// The child enables tracing of itself, optionally redirects its
    /// standard streams onto `tty`, and execs. Its initial SIGTRAP stop
    /// is reported by the next [`wait_debug_event`](Self::wait_debug_event).
    pub fn open(
        &mut self,
        path: impl AsRef<Path>,
        cwd: Option<&Path>,
        args: &[OsString],
        tty: Option<&Path>,
    ) -> crate::Result<()> {
        self.detach()?;

        let pid = crate::sys::spawn_debuggee(path.as_ref(), cwd, args, tty)?;

        // the very first event should be a STOP of type SIGTRAP
        let status = match waitpid(pid, Some(WaitPidFlag::__WALL)) {
            Ok(status @ WaitStatus::Stopped(_, Signal::SIGTRAP)) => status,
            Ok(status) => {
                let _ = signal::kill(pid, Signal::SIGKILL);
                return Err(crate::sys::Error::BadChildWait(status).into());
            }
            Err(e) => return Err(crate::sys::Error::Os(e).into()),
        };

        self.threads.insert_stopped(pid, status);
        self.threads.mark_reaped(pid, status);

        // enable following clones (threads)
        if let Err(e) = ptrace::setoptions(pid, Options::PTRACE_O_TRACECLONE) {
            tracing::error!(error = %e, pid = pid.as_raw(), "PTRACE_SETOPTIONS");
            self.threads.clear();
            let _ = signal::kill(pid, Signal::SIGKILL);
            return Err(crate::sys::Error::Os(e).into());
        }

        self.install(pid, status);

        Ok(())
    }

    /// Attaches to a running process and every one of its threads.
    ///
    /// The task directory is rescanned until a full pass finds no new
    /// thread, so threads spawned while the attach is in progress are
    /// not lost. The initial stop of the main thread is reported by the
    /// next [`wait_debug_event`](Self::wait_debug_event).
    pub fn attach(&mut self, pid: Pid) -> crate::Result<()> {
        self.detach()?;

        loop {
            let mut attached_any = false;

            let tids = match procfs::list_tasks(pid) {
                Ok(tids) => tids,
                Err(e) => {
                    self.rollback_attach();
                    return Err(e.into());
                }
            };

            for tid in tids {
                if !self.threads.contains(tid) && self.attach_thread(tid) {
                    attached_any = true;
                }
            }

            if !attached_any {
                break;
            }
        }

        if self.threads.is_empty() {
            return Err(crate::Error::AttachFailed(pid));
        }

        let status = self.threads.status(pid).unwrap_or(WaitStatus::StillAlive);

        self.install(pid, status);

        Ok(())
    }

    /// Attaches one thread; returns whether the kernel accepted.
    fn attach_thread(&mut self, tid: Pid) -> bool {
        if ptrace::attach(tid).is_err() {
            return false;
        }

        // TRACECLONE is only valid on a stopped thread
        match waitpid(tid, Some(WaitPidFlag::__WALL)) {
            Ok(status) => {
                self.threads.insert_stopped(tid, status);
                self.threads.mark_reaped(tid, status);

                if let Err(e) = ptrace::setoptions(tid, Options::PTRACE_O_TRACECLONE) {
                    tracing::warn!(error = %e, tid = tid.as_raw(), "PTRACE_SETOPTIONS");
                }
            }
            Err(e) => tracing::warn!(error = %e, tid = tid.as_raw(), "failed to reap attached thread"),
        }

        true
    }

    fn install(&mut self, pid: Pid, status: WaitStatus) {
        self.pid = pid;
        self.active_tid = pid;
        self.event_tid = pid;

        let process = TracedProcess::new(pid);

        self.binary_info = match elf::scan_debuggee(pid, &process) {
            Ok(info) => Some(info),
            Err(e) => {
                tracing::warn!(error = %e, "could not locate the linker rendezvous");
                None
            }
        };

        self.process = Some(process);

        block_child_signals();

        self.pending_event = Some(DebugEvent {
            pid,
            tid: pid,
            status,
            siginfo: ptrace::getsiginfo(pid).ok(),
        });
    }

    /// Releases the debuggee and lets it run freely.
    pub fn detach(&mut self) -> crate::Result<()> {
        if !self.attached() {
            return Ok(());
        }

        self.stop_threads();
        self.clear_breakpoints();
        self.detach_all_threads();

        self.process = None;
        self.reset();

        Ok(())
    }

    /// Kills the debuggee and releases it.
    pub fn kill(&mut self) {
        if !self.attached() {
            return;
        }

        self.clear_breakpoints();

        if ptrace::kill(self.pid).is_err() {
            let _ = signal::kill(self.pid, Signal::SIGKILL);
        }

        let _ = waitpid(self.pid, Some(WaitPidFlag::__WALL));

        self.process = None;
        self.reset();
    }

    /// Stops all threads of the debuggee.
    ///
    /// A single SIGSTOP to the process is enough: whichever thread
    /// reports it first triggers the stop-the-world pass in the event
    /// handler, which forces every remaining thread into a stop.
    pub fn pause(&self) {
        if self.attached() {
            if let Err(e) = signal::kill(self.pid, Signal::SIGSTOP) {
                tracing::warn!(error = %e, pid = self.pid.as_raw(), "failed to pause process");
            }
        }
    }

    /// Continues all stopped threads after a reported event.
    ///
    /// The active thread runs with the code derived from `status`; every
    /// other reaped thread is resumed with the signal it last stopped
    /// with, so deliveries interrupted by the stop-the-world pass are
    /// replayed.
    pub fn resume(&mut self, status: ResumeStatus) -> crate::Result<()> {
        if !self.attached() || status == ResumeStatus::Stop {
            return Ok(());
        }

        let tid = self.active_tid;

        if !self.threads.contains(tid) {
            tracing::debug!(tid = tid.as_raw(), "resume without a live active thread");
            return Ok(());
        }

        let code = match status {
            ResumeStatus::ContinueUnhandled => self.threads.status(tid).and_then(resume_code),
            _ => None,
        };

        self.ptrace_continue(tid, code)?;

        // resume the other threads passing the signal they originally
        // reported
        for other in self.threads.ids() {
            if self.threads.is_reaped(other) {
                let code = self.threads.status(other).and_then(resume_code);

                if let Err(e) = self.ptrace_continue(other, code) {
                    tracing::warn!(error = %e, tid = other.as_raw(), "failed to resume thread");
                }
            }
        }

        Ok(())
    }

    /// Single-steps the active thread; other threads stay stopped.
    pub fn step(&mut self, status: ResumeStatus) -> crate::Result<()> {
        if !self.attached() || status == ResumeStatus::Stop {
            return Ok(());
        }

        let tid = self.active_tid;

        if !self.threads.contains(tid) {
            tracing::debug!(tid = tid.as_raw(), "step without a live active thread");
            return Ok(());
        }

        let code = match status {
            ResumeStatus::ContinueUnhandled => self.threads.status(tid).and_then(resume_code),
            _ => None,
        };

        debug_assert!(self.threads.is_reaped(tid));
        self.threads.set_running(tid);

        ptrace::step(tid, code).map_err(crate::sys::Error::from)?;

        Ok(())
    }

    /// Waits for the next reportable debug event.
    ///
    /// Returns `None` when nothing is attached or nothing stopped
    /// within the timeout; a zero timeout polls without blocking. When
    /// an event is returned, every thread of the debuggee is stopped.
    pub fn wait_debug_event(&mut self, timeout: Duration) -> crate::Result<Option<DebugEvent>> {
        if !self.attached() {
            return Ok(None);
        }

        if let Some(event) = self.pending_event.take() {
            return Ok(Some(event));
        }

        if let Some((tid, status)) = self.reap_one() {
            return self.handle_event(tid, status);
        }

        if !wait_for_child_signal(timeout) {
            return Ok(None);
        }

        match self.reap_one() {
            Some((tid, status)) => self.handle_event(tid, status),
            None => Ok(None),
        }
    }

    /// Non-blocking reap pass over every known thread; the first thread
    /// with a state change wins.
    fn reap_one(&mut self) -> Option<(Pid, WaitStatus)> {
        for tid in self.threads.ids() {
            match waitpid(tid, Some(WaitPidFlag::WNOHANG | WaitPidFlag::__WALL)) {
                Ok(WaitStatus::StillAlive) => (),
                Ok(status) => return Some((tid, status)),
                Err(Errno::ECHILD) | Err(Errno::ESRCH) => (),
                Err(e) => tracing::debug!(error = %e, tid = tid.as_raw(), "waitpid"),
            }
        }

        None
    }

    /// Classifies a reaped status and either absorbs it or turns it
    /// into a reportable event.
    fn handle_event(&mut self, tid: Pid, status: WaitStatus) -> crate::Result<Option<DebugEvent>> {
        // note that we have waited on this thread
        self.threads.mark_reaped(tid, status);

        // was it a thread exit event?
        if let WaitStatus::Exited(..) = status {
            self.threads.remove(tid);

            // the exit of any thread but the last one is not reported:
            // callers only ever observe a stable set of threads
            if !self.threads.is_empty() {
                return Ok(None);
            }

            self.active_tid = tid;
            self.event_tid = tid;

            return Ok(Some(DebugEvent {
                pid: self.pid,
                tid,
                status,
                siginfo: None,
            }));
        }

        // was it a thread create event?
        if let WaitStatus::PtraceEvent(_, Signal::SIGTRAP, libc::PTRACE_EVENT_CLONE) = status {
            self.handle_clone_event(tid);
            return Ok(None);
        }

        // normal event
        let siginfo = ptrace::getsiginfo(tid).ok();

        self.active_tid = tid;
        self.event_tid = tid;

        self.stop_threads();

        Ok(Some(DebugEvent {
            pid: self.pid,
            tid,
            status,
            siginfo,
        }))
    }

    /// Absorbs a clone notification: the new thread is tracked, reaped,
    /// and continued together with its parent, so the caller never sees
    /// a half-constructed thread set.
    fn handle_clone_event(&mut self, tid: Pid) {
        match ptrace::getevent(tid) {
            Ok(new_tid) => {
                let new_tid = Pid::from_raw(new_tid as i32);

                self.threads.insert_stopped(new_tid, WaitStatus::StillAlive);

                if !self.threads.is_reaped(new_tid) {
                    match waitpid(new_tid, Some(WaitPidFlag::__WALL)) {
                        Ok(status) => {
                            self.threads.mark_reaped(new_tid, status);

                            if !matches!(status, WaitStatus::Stopped(_, Signal::SIGSTOP)) {
                                tracing::warn!(
                                    tid = new_tid.as_raw(),
                                    ?status,
                                    "new thread stopped with an event besides SIGSTOP"
                                );
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, tid = new_tid.as_raw(), "failed to reap new thread")
                        }
                    }
                }

                if self.threads.is_reaped(new_tid) {
                    let code = self.threads.status(new_tid).and_then(resume_code);

                    if let Err(e) = self.ptrace_continue(new_tid, code) {
                        tracing::warn!(error = %e, tid = new_tid.as_raw(), "failed to start new thread");
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, tid = tid.as_raw(), "PTRACE_GETEVENTMSG"),
        }

        if let Err(e) = self.ptrace_continue(tid, None) {
            tracing::warn!(error = %e, tid = tid.as_raw(), "failed to resume clone parent");
        }
    }

    /// Forces every thread that has not been reaped since its last
    /// resume into a stopped-and-reaped state.
    ///
    /// A thread that turns out to be stopped by something other than
    /// SIGSTOP keeps that status on record, so the pending signal is
    /// replayed on the next resume instead of being lost.
    fn stop_threads(&mut self) {
        for tid in self.threads.ids() {
            if self.threads.is_reaped(tid) {
                continue;
            }

            if let Err(e) = tgkill(self.pid, tid, Signal::SIGSTOP) {
                tracing::debug!(error = %e, tid = tid.as_raw(), "tgkill");
            }

            match waitpid(tid, Some(WaitPidFlag::__WALL)) {
                Ok(status) => {
                    self.threads.mark_reaped(tid, status);

                    if !matches!(status, WaitStatus::Stopped(_, Signal::SIGSTOP)) {
                        tracing::warn!(
                            tid = tid.as_raw(),
                            ?status,
                            "paused thread stopped with an event besides SIGSTOP"
                        );
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, tid = tid.as_raw(), "failed to reap paused thread")
                }
            }
        }
    }

    /// Hands a reaped thread back to the kernel scheduler.
    fn ptrace_continue(&mut self, tid: Pid, code: Option<Signal>) -> crate::Result<()> {
        debug_assert!(self.threads.is_reaped(tid));

        self.threads.set_running(tid);

        ptrace::cont(tid, code).map_err(crate::sys::Error::from)?;

        Ok(())
    }

    /// Makes `tid` the thread that register and stepping operations
    /// apply to.
    ///
    /// Only a tracked, currently stopped thread may become active; any
    /// other request is refused and logged.
    pub fn set_active_thread(&mut self, tid: Pid) {
        if self.threads.contains(tid) && self.threads.is_reaped(tid) {
            self.active_tid = tid;
        } else {
            tracing::warn!(
                tid = tid.as_raw(),
                "refusing to activate a thread that is not stopped"
            );
        }
    }

    //
    // Memory access.
    //

    /// Reads one machine word from the debuggee.
    pub fn read_word(&self, addr: u64) -> crate::Result<u64> {
        self.ensure_attached()?;

        mem::read_word(self.pid, addr).map_err(Into::into)
    }

    /// Writes one machine word into the debuggee.
    pub fn write_word(&mut self, addr: u64, word: u64) -> crate::Result<()> {
        self.ensure_attached()?;

        mem::write_word(self.pid, addr, word).map_err(Into::into)
    }

    /// Reads whole pages from the debuggee through its memory file.
    ///
    /// Bytes covered by installed breakpoints are rewritten to their
    /// original values, so the result equals what the debuggee would
    /// observe without the debugger's patching. Returns the number of
    /// bytes actually read.
    pub fn read_pages(
        &self,
        addr: u64,
        buf: &mut [u8],
        page_count: usize,
    ) -> crate::Result<usize> {
        self.ensure_attached()?;

        let len = (page_count * self.page_size).min(buf.len());

        let n = mem::read_mem_file(self.pid, addr, &mut buf[..len])?;

        self.breakpoints.mask_buffer(addr, &mut buf[..n]);

        Ok(n)
    }

    /// Reads an arbitrary byte range from the debuggee, breakpoint
    /// transparent. Returns the number of bytes actually read.
    pub fn read_bytes(&self, addr: u64, buf: &mut [u8]) -> crate::Result<usize> {
        let process = self.process.as_ref().ok_or(crate::Error::NotAttached)?;

        let n = process.read_bytes(addr, buf)?;

        self.breakpoints.mask_buffer(addr, &mut buf[..n]);

        Ok(n)
    }

    /// Writes an arbitrary byte range into the debuggee.
    pub fn write_bytes(&mut self, addr: u64, buf: &[u8]) -> crate::Result<()> {
        let process = self.process.as_ref().ok_or(crate::Error::NotAttached)?;

        process.write_bytes(addr, buf).map_err(Into::into)
    }

    //
    // Breakpoints.
    //

    /// Installs a software breakpoint by patching a trap opcode over the
    /// byte at `addr`.
    pub fn add_breakpoint(&mut self, addr: u64) -> crate::Result<()> {
        self.ensure_attached()?;

        if self.breakpoints.contains(addr) {
            return Ok(());
        }

        let mut bytes = mem::read_word(self.pid, addr)?.to_le_bytes();
        let original_byte = bytes[0];

        bytes[0] = TRAP_OPCODE;
        mem::write_word(self.pid, addr, u64::from_le_bytes(bytes))?;

        self.breakpoints.insert(addr, original_byte);

        Ok(())
    }

    /// Removes a software breakpoint and restores the original byte.
    pub fn remove_breakpoint(&mut self, addr: u64) -> crate::Result<()> {
        self.ensure_attached()?;

        let Some(bp) = self.breakpoints.remove(addr) else {
            return Ok(());
        };

        self.restore_breakpoint(bp).map_err(Into::into)
    }

    fn restore_breakpoint(&self, bp: Breakpoint) -> crate::sys::Result<()> {
        let mut bytes = mem::read_word(self.pid, bp.addr)?.to_le_bytes();

        bytes[0] = bp.original_byte;

        mem::write_word(self.pid, bp.addr, u64::from_le_bytes(bytes))
    }

    fn clear_breakpoints(&mut self) {
        let bps: Vec<Breakpoint> = self.breakpoints.drain().map(|(_, bp)| bp).collect();

        for bp in bps {
            if let Err(e) = self.restore_breakpoint(bp) {
                tracing::warn!(
                    error = %e,
                    addr = format_args!("{:#x}", bp.addr),
                    "failed to restore breakpoint byte"
                );
            }
        }
    }

    //
    // Register state.
    //

    /// Creates an empty register bank suitable for
    /// [`get_state`](Self::get_state).
    pub fn create_state(&self) -> RegisterBank {
        RegisterBank::new()
    }

    /// Acquires the full register state of the active thread.
    pub fn get_state(&mut self, bank: &mut RegisterBank) -> crate::Result<()> {
        if !self.attached() {
            bank.clear();
            return Ok(());
        }

        registers::fetch_state(self.active_tid, &mut self.fpx_supported, bank).map_err(Into::into)
    }

    /// Restores register state into the active thread.
    pub fn set_state(&mut self, bank: &RegisterBank) -> crate::Result<()> {
        if !self.attached() {
            return Ok(());
        }

        registers::apply_state(self.active_tid, bank).map_err(Into::into)
    }

    //
    // Modules.
    //

    /// Enumerates the shared objects mapped into the debuggee.
    ///
    /// The dynamic linker's rendezvous structure is walked when
    /// available; otherwise the module list is derived from the
    /// debuggee's memory map.
    pub fn loaded_modules(&self) -> crate::Result<Vec<Module>> {
        let process = self.process.as_ref().ok_or(crate::Error::NotAttached)?;

        let mut modules = Vec::new();

        if let Some(info) = self.binary_info.as_ref() {
            match info.debug_pointer(process) {
                Ok(rdebug_addr) if rdebug_addr != 0 => {
                    modules = rdebug::modules_from_rendezvous(
                        process,
                        &self.breakpoints,
                        info.elf_ctx(),
                        rdebug_addr,
                    )
                    .unwrap_or_else(|e| {
                        tracing::warn!(error = %e, "link-map walk failed");
                        Vec::new()
                    });
                }
                Ok(_) => (),
                Err(e) => tracing::debug!(error = %e, "could not read the rendezvous pointer"),
            }
        }

        if modules.is_empty() {
            modules = rdebug::modules_from_regions(process)?;
        }

        Ok(modules)
    }

    fn ensure_attached(&self) -> crate::Result<()> {
        if self.attached() {
            Ok(())
        } else {
            Err(crate::Error::NotAttached)
        }
    }

    fn rollback_attach(&mut self) {
        self.stop_threads();
        self.detach_all_threads();
        self.reset();
    }

    fn detach_all_threads(&mut self) {
        for tid in self.threads.ids() {
            match ptrace::detach(tid, None) {
                Ok(()) => {
                    let _ = waitpid(tid, Some(WaitPidFlag::__WALL | WaitPidFlag::WNOHANG));
                }
                Err(e) => tracing::debug!(error = %e, tid = tid.as_raw(), "PTRACE_DETACH"),
            }
        }
    }

    fn reset(&mut self) {
        self.threads.clear();
        self.breakpoints = BreakpointSet::new();
        self.pid = NO_THREAD;
        self.active_tid = NO_THREAD;
        self.event_tid = NO_THREAD;
        self.binary_info = None;
        self.pending_event = None;
        self.fpx_supported = true;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let _ = self.detach();
    }
}

/// Derives the signal to deliver when resuming a thread that last
/// stopped with `status`.
///
/// A SIGSTOP stop is consumed; a termination signal or any other stop
/// signal is passed through.
pub(crate) fn resume_code(status: WaitStatus) -> Option<Signal> {
    match status {
        WaitStatus::Stopped(_, Signal::SIGSTOP) => None,
        WaitStatus::Signaled(_, signal, _) => Some(signal),
        WaitStatus::Stopped(_, signal) => Some(signal),
        _ => None,
    }
}

fn tgkill(pid: Pid, tid: Pid, signal: Signal) -> nix::Result<()> {
    unsafe {
        Errno::result(libc::syscall(
            libc::SYS_tgkill,
            pid.as_raw(),
            tid.as_raw(),
            signal as libc::c_int,
        ))
    }
    .map(drop)
}

/// Blocks up to `timeout` for a child-state-change notification.
///
/// SIGCHLD must be blocked in the calling thread for the wait to
/// dequeue it; the session does so when it attaches.
fn wait_for_child_signal(timeout: Duration) -> bool {
    let mut sigs = SigSet::empty();
    sigs.add(Signal::SIGCHLD);

    let timeout = libc::timespec {
        tv_sec: timeout.as_secs() as libc::time_t,
        tv_nsec: timeout.subsec_nanos() as libc::c_long,
    };

    let signo = unsafe { libc::sigtimedwait(sigs.as_ref(), std::ptr::null_mut(), &timeout) };

    signo == Signal::SIGCHLD as libc::c_int
}

fn block_child_signals() {
    let mut sigs = SigSet::empty();
    sigs.add(Signal::SIGCHLD);

    if let Err(e) = sigs.thread_block() {
        tracing::warn!(error = %e, "failed to block SIGCHLD");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid() -> Pid {
        Pid::from_raw(100)
    }

    #[test]
    fn sigstop_stops_are_consumed() {
        let status = WaitStatus::Stopped(pid(), Signal::SIGSTOP);

        assert_eq!(resume_code(status), None);
    }

    #[test]
    fn termination_signals_pass_through() {
        let status = WaitStatus::Signaled(pid(), Signal::SIGSEGV, false);

        assert_eq!(resume_code(status), Some(Signal::SIGSEGV));
    }

    #[test]
    fn other_stop_signals_pass_through() {
        let status = WaitStatus::Stopped(pid(), Signal::SIGUSR1);

        assert_eq!(resume_code(status), Some(Signal::SIGUSR1));
    }

    #[test]
    fn everything_else_resumes_silently() {
        assert_eq!(resume_code(WaitStatus::Exited(pid(), 0)), None);
        assert_eq!(resume_code(WaitStatus::StillAlive), None);
        assert_eq!(
            resume_code(WaitStatus::PtraceEvent(
                pid(),
                Signal::SIGTRAP,
                libc::PTRACE_EVENT_CLONE
            )),
            None
        );
    }

    #[test]
    fn detached_session_reports_no_events() {
        let mut session = Session::new();

        let event = session
            .wait_debug_event(Duration::from_millis(0))
            .expect("wait");

        assert!(event.is_none());
        assert!(!session.attached());
        assert_eq!(session.pid(), Pid::from_raw(0));
    }

    #[test]
    fn detached_session_refuses_memory_access() {
        let session = Session::new();

        assert!(matches!(
            session.read_word(0x1000),
            Err(crate::Error::NotAttached)
        ));
    }
}
