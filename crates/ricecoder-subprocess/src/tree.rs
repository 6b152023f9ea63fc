//! Point-in-time process snapshots and tree termination

use std::collections::{HashMap, HashSet, VecDeque};

use sysinfo::{ProcessRefreshKind, ProcessStatus, RefreshKind, System};
use tracing::{debug, warn};

use crate::sys;

/// Parent/child relationships of every process at one instant
///
/// Processes that start or reparent after the capture are not seen.
#[derive(Debug, Clone, Default)]
pub struct ProcessSnapshot {
    children: HashMap<u32, Vec<u32>>,
    live: HashSet<u32>,
}

impl ProcessSnapshot {
    /// Capture the current process table
    pub fn capture() -> Self {
        let system = System::new_with_specifics(
            RefreshKind::new().with_processes(ProcessRefreshKind::new()),
        );
        let mut snapshot = Self::default();
        for (pid, process) in system.processes() {
            let exited = matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead);
            snapshot.add(
                pid.as_u32(),
                process.parent().map(|parent| parent.as_u32()),
                !exited,
            );
        }
        snapshot
    }

    /// Build from `(pid, parent)` pairs, all considered live
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (u32, Option<u32>)>,
    {
        let mut snapshot = Self::default();
        for (pid, parent) in pairs {
            snapshot.add(pid, parent, true);
        }
        snapshot
    }

    fn add(&mut self, pid: u32, parent: Option<u32>, live: bool) {
        if live {
            self.live.insert(pid);
        }
        if let Some(parent) = parent.filter(|parent| *parent != pid) {
            self.children.entry(parent).or_default().push(pid);
        }
    }

    /// Whether `pid` was running (and not a zombie) at capture time
    pub fn contains(&self, pid: u32) -> bool {
        self.live.contains(&pid)
    }

    /// Direct children of `pid`
    pub fn children(&self, pid: u32) -> &[u32] {
        self.children.get(&pid).map(Vec::as_slice).unwrap_or_default()
    }

    /// Every transitive descendant of `pid`, parents before their children
    pub fn descendants(&self, pid: u32) -> Vec<u32> {
        let mut seen = HashSet::from([pid]);
        let mut queue = VecDeque::from([pid]);
        let mut found = Vec::new();
        while let Some(current) = queue.pop_front() {
            for &child in self.children(current) {
                if seen.insert(child) {
                    found.push(child);
                    queue.push_back(child);
                }
            }
        }
        found
    }
}

/// Signal every descendant of `pid`, deepest first; returns how many were signalled
pub(crate) fn kill_descendants(pid: u32, force: bool) -> usize {
    let descendants = ProcessSnapshot::capture().descendants(pid);
    let mut signalled = 0;
    for descendant in descendants.iter().rev() {
        match sys::signal_pid(*descendant, force) {
            Ok(()) => signalled += 1,
            Err(e) if sys::is_no_such_process(&e) => {}
            Err(e) => warn!(pid = %descendant, error = %e, "Failed to signal descendant"),
        }
    }
    debug!(pid = %pid, found = descendants.len(), signalled, "Signalled process tree");
    signalled
}

/// First command-line word of `pid` as reported by the process table
#[cfg(all(unix, not(target_os = "linux")))]
pub(crate) fn command_of(pid: u32) -> String {
    let system = System::new_with_specifics(
        RefreshKind::new().with_processes(ProcessRefreshKind::new()),
    );
    system
        .process(sysinfo::Pid::from_u32(pid))
        .and_then(|process| process.cmd().first().cloned())
        .unwrap_or_default()
}
