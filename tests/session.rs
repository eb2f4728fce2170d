#![cfg(target_os = "linux")]

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;

use test_log::test;

use tracectl::{DebugEvent, ResumeStatus, Session, TRAP_OPCODE};

/// Polls for the next debug event; every call starts with a reap pass,
/// so this is robust against child signals consumed by other threads of
/// the test harness.
fn wait_event(session: &mut Session, tries: usize) -> Option<DebugEvent> {
    for _ in 0..tries {
        if let Some(event) = session
            .wait_debug_event(Duration::from_millis(100))
            .expect("wait_debug_event")
        {
            return Some(event);
        }
    }

    None
}

fn args(list: &[&str]) -> Vec<OsString> {
    list.iter().map(|arg| OsString::from(*arg)).collect()
}

fn compile_fixture(dir: &Path, name: &str) -> PathBuf {
    let src = Path::new("tests/fixtures").join(format!("{name}.rs"));
    let out = dir.join(name);

    let rustc = Command::new("rustc")
        .arg(&src)
        .arg("-o")
        .arg(&out)
        .output()
        .expect("rustc");

    if !rustc.status.success() {
        panic!("{}", String::from_utf8_lossy(&rustc.stderr));
    }

    out
}

#[test]
fn attach_reports_the_initial_sigstop() {
    let mut child = Command::new("sleep").arg("30").spawn().expect("spawn");
    let pid = Pid::from_raw(child.id() as i32);

    let mut session = Session::new();
    session.attach(pid).expect("attach");

    assert!(session.attached());
    assert_eq!(session.pid(), pid);

    let event = wait_event(&mut session, 20).expect("initial event");

    assert_eq!(event.tid, pid);
    assert!(matches!(
        event.status,
        WaitStatus::Stopped(_, Signal::SIGSTOP)
    ));
    assert!(session.all_threads_stopped());

    session.detach().expect("detach");

    // the debuggee keeps running after detach
    assert!(child.try_wait().expect("try_wait").is_none());

    child.kill().expect("kill");
    child.wait().expect("wait");
}

#[test]
fn open_reports_the_initial_trap_and_the_exit() {
    let mut session = Session::new();
    session
        .open("true", None, &[], None)
        .expect("open");

    let pid = session.pid();
    assert!(pid.as_raw() > 0);

    let event = wait_event(&mut session, 20).expect("initial event");

    assert_eq!(event.tid, pid);
    assert!(matches!(
        event.status,
        WaitStatus::Stopped(_, Signal::SIGTRAP)
    ));

    session.resume(ResumeStatus::Continue).expect("resume");

    let event = wait_event(&mut session, 50).expect("exit event");

    assert!(matches!(event.status, WaitStatus::Exited(_, 0)));
}

#[test]
fn pause_stops_the_world_and_resume_replays() {
    let mut child = Command::new("sleep").arg("30").spawn().expect("spawn");
    let pid = Pid::from_raw(child.id() as i32);

    let mut session = Session::new();
    session.attach(pid).expect("attach");

    wait_event(&mut session, 20).expect("initial event");

    session.resume(ResumeStatus::Continue).expect("resume");
    assert!(!session.all_threads_stopped());

    session.pause();

    let event = wait_event(&mut session, 30).expect("pause event");

    assert_eq!(event.tid, pid);
    assert!(matches!(
        event.status,
        WaitStatus::Stopped(_, Signal::SIGSTOP)
    ));
    assert!(session.all_threads_stopped());
    assert_eq!(session.active_thread(), pid);
    assert_eq!(session.event_thread(), pid);

    session.resume(ResumeStatus::Continue).expect("resume");
    assert!(!session.all_threads_stopped());

    session.detach().expect("detach");

    child.kill().expect("kill");
    child.wait().expect("wait");
}

#[test]
fn clone_events_are_swallowed_and_both_threads_tracked() {
    let dir = tempfile::tempdir().expect("tempdir");
    let fixture = compile_fixture(dir.path(), "spawner");

    let mut session = Session::new();
    session.open(&fixture, None, &[], None).expect("open");

    let event = wait_event(&mut session, 20).expect("initial event");
    assert!(matches!(
        event.status,
        WaitStatus::Stopped(_, Signal::SIGTRAP)
    ));

    session.resume(ResumeStatus::Continue).expect("resume");

    let mut max_threads = 1;
    let mut exit_seen = false;

    for _ in 0..100 {
        max_threads = max_threads.max(session.thread_ids().len());

        let Some(event) = session
            .wait_debug_event(Duration::from_millis(100))
            .expect("wait_debug_event")
        else {
            continue;
        };

        if matches!(event.status, WaitStatus::Exited(..)) {
            exit_seen = true;
            break;
        }

        // any mid-run stop (e.g. a stray signal) is just passed on
        session.resume(ResumeStatus::ContinueUnhandled).expect("resume");
    }

    assert!(exit_seen, "debuggee never exited");
    assert!(
        max_threads >= 2,
        "second thread was never tracked (max seen: {max_threads})"
    );
}

#[test]
fn memory_reads_are_breakpoint_transparent() {
    let mut session = Session::new();
    session
        .open("sleep", None, &args(&["30"]), None)
        .expect("open");

    wait_event(&mut session, 20).expect("initial event");

    let mut bank = session.create_state();
    session.get_state(&mut bank).expect("get_state");

    let ip = bank.instruction_pointer().expect("instruction pointer");
    assert_ne!(ip, 0);

    let original_byte = session.read_word(ip).expect("read_word").to_le_bytes()[0];

    session.add_breakpoint(ip).expect("add_breakpoint");

    // the raw word now carries the trap opcode
    let patched_byte = session.read_word(ip).expect("read_word").to_le_bytes()[0];
    assert_eq!(patched_byte, TRAP_OPCODE);

    // a page read covering the address must show the original byte
    let page_size = session.page_size();
    let page_base = ip & !(page_size as u64 - 1);

    let mut buf = vec![0u8; page_size];
    let n = session
        .read_pages(page_base, &mut buf, 1)
        .expect("read_pages");

    assert!(n as u64 > ip - page_base);
    assert_eq!(buf[(ip - page_base) as usize], original_byte);

    session.remove_breakpoint(ip).expect("remove_breakpoint");

    let restored_byte = session.read_word(ip).expect("read_word").to_le_bytes()[0];
    assert_eq!(restored_byte, original_byte);

    session.kill();
    assert!(!session.attached());
}

#[test]
fn modules_of_a_running_debuggee_include_the_loader_and_libc() {
    let mut child = Command::new("sleep").arg("30").spawn().expect("spawn");
    let pid = Pid::from_raw(child.id() as i32);

    // give the dynamic linker time to finish before attaching
    std::thread::sleep(Duration::from_millis(300));

    let mut session = Session::new();
    session.attach(pid).expect("attach");

    let modules = session.loaded_modules().expect("loaded_modules");

    assert!(!modules.is_empty());
    assert!(modules.iter().any(|module| module.base_address != 0));
    assert!(modules
        .iter()
        .any(|module| module.name.contains("libc") || module.name.contains("ld")));

    session.detach().expect("detach");

    child.kill().expect("kill");
    child.wait().expect("wait");
}

#[test]
fn modules_fall_back_to_the_memory_map_at_the_initial_stop() {
    let mut session = Session::new();
    session
        .open("sleep", None, &args(&["30"]), None)
        .expect("open");

    wait_event(&mut session, 20).expect("initial event");

    // the linker has not initialized the rendezvous yet, so the list
    // comes from the mapped regions
    let modules = session.loaded_modules().expect("loaded_modules");

    assert!(!modules.is_empty());
    assert!(modules.iter().all(|module| module.name.starts_with('/')));

    session.kill();
}

#[test]
fn registers_round_trip_through_the_bank() {
    let mut session = Session::new();
    session
        .open("sleep", None, &args(&["30"]), None)
        .expect("open");

    wait_event(&mut session, 20).expect("initial event");

    let mut bank = session.create_state();
    session.get_state(&mut bank).expect("get_state");

    assert!(bank.gp.is_some());
    assert!(bank.debug_filled);
    assert_eq!(bank.debug[4], 0);
    assert_eq!(bank.debug[5], 0);
    assert!(bank.stack_pointer().expect("stack pointer") != 0);

    // some floating-point bank must have been acquired on the way down
    // the fallback ladder
    assert!(bank.xsave.is_some() || bank.fx.is_some() || bank.x87.is_some());

    session.set_state(&bank).expect("set_state");

    let mut reread = session.create_state();
    session.get_state(&mut reread).expect("get_state");

    assert_eq!(
        bank.instruction_pointer().expect("ip"),
        reread.instruction_pointer().expect("ip")
    );

    session.kill();
}

#[test]
fn detached_thread_queries_are_empty() {
    let session = Session::new();

    assert!(session.thread_ids().is_empty());
    assert!(session.process().is_none());
    assert_eq!(session.active_thread(), Pid::from_raw(0));
}
