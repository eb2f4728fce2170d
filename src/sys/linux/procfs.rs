use std::collections::BTreeMap;
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use nix::unistd::{Pid, Uid, User};

/// Leading fields of a `/proc/<pid>/stat` record.
///
/// Field numbering follows `proc(5)`; everything past `kstkeip` (30) is
/// of no use to the engine and left unparsed.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct TaskStat {
    pub pid: i32,
    pub comm: String,
    pub state: char,
    pub ppid: i32,
    pub pgrp: i32,
    pub session: i32,
    pub tty_nr: i32,
    pub tpgid: i32,
    pub flags: u32,
    pub minflt: u64,
    pub cminflt: u64,
    pub majflt: u64,
    pub cmajflt: u64,
    pub utime: u64,
    pub stime: u64,
    pub cutime: i64,
    pub cstime: i64,
    pub priority: i64,
    pub nice: i64,
    pub num_threads: i64,
    pub itrealvalue: i64,
    pub starttime: u64,
    pub vsize: u64,
    pub rss: i64,
    pub rsslim: u64,
    pub startcode: u64,
    pub endcode: u64,
    pub startstack: u64,
    pub kstkesp: u64,
    pub kstkeip: u64,
}

/// Basic identity of a process, as listed by [`enumerate_processes`].
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ProcessInfo {
    pub pid: Pid,

    /// Command name, empty when the stat record was unreadable.
    pub name: String,

    pub uid: u32,

    /// User name resolved from the password database, empty when the
    /// uid is unknown there.
    pub user: String,
}

/// Scheduling information of a single thread.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ThreadInfo {
    pub tid: Pid,
    pub name: String,

    /// Kernel-reported instruction pointer (`kstkeip`).
    pub ip: u64,

    pub priority: i64,

    /// Human-readable rendition of the state letter, e.g. "S (Sleeping)".
    pub state: String,
}

/// Parses a `stat` record in `/proc` format.
///
/// Returns the record together with the number of fields successfully
/// parsed; callers decide how many they need. The command name is
/// delimited by the first `(` and the *last* `)` of the line, so names
/// containing spaces or parentheses survive.
pub fn parse_stat(path: &Path) -> crate::sys::Result<(TaskStat, usize)> {
    let contents = fs::read_to_string(path)
        .map_err(|e| crate::sys::Error::File(path.to_path_buf(), e))?;

    let line = contents.lines().next().unwrap_or("");

    let mut stat = TaskStat::default();
    let mut parsed = 0;

    let (Some(open), Some(close)) = (line.find('('), line.rfind(')')) else {
        return Ok((stat, parsed));
    };

    match line[..open].trim().parse() {
        Ok(pid) => {
            stat.pid = pid;
            parsed += 1;
        }
        Err(_) => return Ok((stat, parsed)),
    }

    stat.comm = line[open + 1..close].to_owned();
    parsed += 1;

    let mut tokens = line[close + 1..].split_whitespace();

    macro_rules! fields {
        ($($name:ident),+ $(,)?) => {
            $(
                match tokens.next().and_then(|t| t.parse().ok()) {
                    Some(value) => {
                        stat.$name = value;
                        parsed += 1;
                    }
                    None => return Ok((stat, parsed)),
                }
            )+
        };
    }

    fields!(
        state, ppid, pgrp, session, tty_nr, tpgid, flags, minflt, cminflt, majflt, cmajflt,
        utime, stime, cutime, cstime, priority, nice, num_threads, itrealvalue, starttime,
        vsize, rss, rsslim, startcode, endcode, startstack, kstkesp, kstkeip,
    );

    Ok((stat, parsed))
}

fn stat_path(pid: Pid) -> PathBuf {
    format!("/proc/{pid}/stat").into()
}

/// Lists the threads of a process in ascending thread-id order.
pub fn list_tasks(pid: Pid) -> crate::sys::Result<Vec<Pid>> {
    let path: PathBuf = format!("/proc/{pid}/task").into();

    let entries = fs::read_dir(&path).map_err(|e| crate::sys::Error::File(path, e))?;

    let mut tids: Vec<Pid> = entries
        .flatten()
        .filter_map(|entry| entry.file_name().to_str()?.parse().ok())
        .map(Pid::from_raw)
        .collect();

    tids.sort_unstable_by_key(|tid| tid.as_raw());

    Ok(tids)
}

/// Enumerates all processes visible under `/proc`.
///
/// Process names unavailable because of permissions are left empty.
pub fn enumerate_processes() -> crate::sys::Result<BTreeMap<i32, ProcessInfo>> {
    let mut ret = BTreeMap::new();

    let entries =
        fs::read_dir("/proc").map_err(|e| crate::sys::Error::File("/proc".into(), e))?;

    for entry in entries.flatten() {
        let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<i32>().ok()) else {
            continue;
        };

        let name = match parse_stat(&entry.path().join("stat")) {
            Ok((stat, parsed)) if parsed >= 2 => stat.comm,
            _ => String::new(),
        };

        let uid = entry.metadata().map(|meta| meta.uid()).unwrap_or(0);

        let user = User::from_uid(Uid::from_raw(uid))
            .ok()
            .flatten()
            .map(|user| user.name)
            .unwrap_or_default();

        ret.insert(
            pid,
            ProcessInfo {
                pid: Pid::from_raw(pid),
                name,
                uid,
                user,
            },
        );
    }

    Ok(ret)
}

/// Returns the parent process ID, or zero when it cannot be determined.
pub fn parent_pid(pid: Pid) -> Pid {
    match parse_stat(&stat_path(pid)) {
        Ok((stat, parsed)) if parsed >= 4 => Pid::from_raw(stat.ppid),
        _ => Pid::from_raw(0),
    }
}

/// Returns scheduling information of one thread of a process.
pub fn thread_info(pid: Pid, tid: Pid) -> ThreadInfo {
    let path: PathBuf = format!("/proc/{pid}/task/{tid}/stat").into();

    match parse_stat(&path) {
        Ok((stat, parsed)) if parsed >= 30 => ThreadInfo {
            tid,
            name: stat.comm,
            ip: stat.kstkeip,
            priority: stat.priority,
            state: describe_state(stat.state),
        },
        _ => ThreadInfo {
            tid,
            name: String::new(),
            ip: 0,
            priority: 0,
            state: "?".to_owned(),
        },
    }
}

fn describe_state(state: char) -> String {
    let description = match state {
        'R' => "Running",
        'S' => "Sleeping",
        'D' => "Disk Sleep",
        'T' => "Stopped",
        't' => "Tracing Stop",
        'Z' => "Zombie",
        'X' | 'x' => "Dead",
        'W' => "Waking/Paging",
        'K' => "Wakekill",
        'P' => "Parked",
        _ => return state.to_string(),
    };

    format!("{state} ({description})")
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn parse_line(line: &str) -> (TaskStat, usize) {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "{line}").expect("write");

        parse_stat(file.path()).expect("parse")
    }

    #[test]
    fn comm_with_embedded_parens_and_spaces() {
        let (stat, parsed) = parse_line(
            "42 (weird (name) /x) S 1 42 42 0 -1 4194304 100 0 0 0 1 2 3 4 \
             20 0 1 0 12345 1000000 10 18446744073709551615 1 2 3 4 5",
        );

        assert!(parsed >= 4);
        assert_eq!(stat.pid, 42);
        assert_eq!(stat.comm, "weird (name) /x");
        assert_eq!(stat.state, 'S');
        assert_eq!(stat.ppid, 1);
    }

    #[test]
    fn comm_with_dashes_and_slashes() {
        let (stat, parsed) = parse_line("7 (kworker/0:1-mm_percpu_wq) I 2 0 0 0 -1 69238880 0");

        assert!(parsed >= 4);
        assert_eq!(stat.pid, 7);
        assert_eq!(stat.comm, "kworker/0:1-mm_percpu_wq");
        assert_eq!(stat.state, 'I');
        assert_eq!(stat.ppid, 2);
    }

    #[test]
    fn truncated_line_reports_partial_field_count() {
        let (stat, parsed) = parse_line("42 (x) S");

        assert_eq!(parsed, 3);
        assert_eq!(stat.state, 'S');
        assert_eq!(stat.ppid, 0);
    }

    #[test]
    fn garbage_line_parses_nothing() {
        let (_, parsed) = parse_line("not a stat line");

        assert_eq!(parsed, 0);
    }

    #[test]
    fn own_stat_record_parses_fully() {
        let pid = Pid::this();

        let (stat, parsed) = parse_stat(&stat_path(pid)).expect("parse");

        assert_eq!(parsed, 30);
        assert_eq!(stat.pid, pid.as_raw());
        assert!(!stat.comm.is_empty());
    }

    #[test]
    fn own_task_dir_lists_current_thread() {
        let pid = Pid::this();

        let tasks = list_tasks(pid).expect("list_tasks");

        assert!(tasks.contains(&pid));
    }

    #[test]
    fn init_is_enumerated_with_a_parent_of_zero() {
        let processes = enumerate_processes().expect("enumerate");

        assert!(processes.contains_key(&Pid::this().as_raw()));
        assert_eq!(parent_pid(Pid::from_raw(1)), Pid::from_raw(0));
    }
}
