use std::collections::{HashMap, HashSet};

use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;

/// Scheduling state of a tracked thread, as far as the engine knows.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ThreadState {
    Stopped,
    Running,
}

/// Per-thread bookkeeping of the session.
#[derive(Clone, Copy, Debug)]
pub struct ThreadRecord {
    /// Wait status the thread was last reaped with.
    pub status: WaitStatus,

    pub state: ThreadState,
}

/// All threads currently tracked by a session, together with the set of
/// threads that have been observed in a stopped state since their last
/// resume (the reaped set).
///
/// The reaped set is always a subset of the tracked threads; both are
/// mutated only through this type so the containment holds by
/// construction.
#[derive(Default)]
pub struct ThreadTable {
    threads: HashMap<Pid, ThreadRecord>,
    reaped: HashSet<Pid>,
}

impl ThreadTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking a thread in the stopped state.
    pub fn insert_stopped(&mut self, tid: Pid, status: WaitStatus) {
        self.threads.insert(
            tid,
            ThreadRecord {
                status,
                state: ThreadState::Stopped,
            },
        );
    }

    /// Stops tracking a thread (thread exit or session teardown).
    pub fn remove(&mut self, tid: Pid) {
        self.threads.remove(&tid);
        self.reaped.remove(&tid);
    }

    pub fn contains(&self, tid: Pid) -> bool {
        self.threads.contains_key(&tid)
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    /// Thread IDs currently tracked, in no particular order.
    pub fn ids(&self) -> Vec<Pid> {
        self.threads.keys().copied().collect()
    }

    pub fn status(&self, tid: Pid) -> Option<WaitStatus> {
        self.threads.get(&tid).map(|record| record.status)
    }

    /// Records that a thread was observed stopped with the given status.
    ///
    /// Unknown threads are ignored so the reaped set cannot outgrow the
    /// table.
    pub fn mark_reaped(&mut self, tid: Pid, status: WaitStatus) {
        if let Some(record) = self.threads.get_mut(&tid) {
            record.status = status;
            record.state = ThreadState::Stopped;
            self.reaped.insert(tid);
        }
    }

    /// Records that a thread was handed back to the kernel scheduler.
    pub fn set_running(&mut self, tid: Pid) {
        if let Some(record) = self.threads.get_mut(&tid) {
            record.state = ThreadState::Running;
        }
        self.reaped.remove(&tid);
    }

    pub fn is_reaped(&self, tid: Pid) -> bool {
        self.reaped.contains(&tid)
    }

    /// Returns whether every tracked thread is currently reaped.
    pub fn all_reaped(&self) -> bool {
        self.threads.keys().all(|tid| self.reaped.contains(tid))
    }

    pub fn clear(&mut self) {
        self.threads.clear();
        self.reaped.clear();
    }
}

#[cfg(test)]
mod tests {
    use nix::sys::signal::Signal;

    use super::*;

    fn tid(raw: i32) -> Pid {
        Pid::from_raw(raw)
    }

    fn stopped(raw: i32) -> WaitStatus {
        WaitStatus::Stopped(tid(raw), Signal::SIGSTOP)
    }

    #[test]
    fn reaped_set_is_subset_of_table() {
        let mut table = ThreadTable::new();

        table.insert_stopped(tid(10), stopped(10));
        table.mark_reaped(tid(10), stopped(10));
        table.mark_reaped(tid(99), stopped(99)); // untracked, must be ignored

        assert!(table.is_reaped(tid(10)));
        assert!(!table.is_reaped(tid(99)));
        assert!(table.all_reaped());
    }

    #[test]
    fn removing_a_thread_also_unreaps_it() {
        let mut table = ThreadTable::new();

        table.insert_stopped(tid(10), stopped(10));
        table.mark_reaped(tid(10), stopped(10));
        table.remove(tid(10));

        assert!(!table.contains(tid(10)));
        assert!(!table.is_reaped(tid(10)));
        assert!(table.is_empty());
    }

    #[test]
    fn resume_clears_the_reaped_flag_but_keeps_the_thread() {
        let mut table = ThreadTable::new();

        table.insert_stopped(tid(10), stopped(10));
        table.mark_reaped(tid(10), stopped(10));
        table.set_running(tid(10));

        assert!(table.contains(tid(10)));
        assert!(!table.is_reaped(tid(10)));
        assert!(!table.all_reaped());
    }
}
