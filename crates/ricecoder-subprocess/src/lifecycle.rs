//! Exit status collection and single-process termination
//!
//! A launched child moves from running to exited exactly once. The exit
//! status is reaped under the monitor lock, and published only after the
//! output pumps have drained, so nobody observes "exited" while output for
//! that process is still in flight.

use std::io;
use std::process::{Child, ExitStatus};
use std::thread::{self, ThreadId};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::pipe::StdinWriter;
use crate::pump::StreamPump;
use crate::{sys, tree};

/// Exit state of a launched process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitRecord {
    /// Not yet observed to have exited
    Running,
    /// Exit code as reported by the OS (`128 + signal` for signalled POSIX children)
    Exited(i32),
    /// The pid could no longer be waited on; carries the last sampled code
    Unknown(i32),
}

impl ExitRecord {
    /// Exit code, if the process is no longer running
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Running => None,
            Self::Exited(code) | Self::Unknown(code) => Some(*code),
        }
    }

    /// Whether the process is still considered running
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    fn last_sampled(&self) -> i32 {
        self.code().unwrap_or(crate::INVALID_EXIT_CODE)
    }
}

#[derive(Debug)]
struct MonitorState {
    /// Released as soon as the exit status has been reaped
    child: Option<Child>,
    /// Reaped but not yet published
    reaped: Option<ExitRecord>,
    record: ExitRecord,
    pump: StreamPump,
}

impl MonitorState {
    fn is_settled(&self) -> bool {
        !self.record.is_running() || self.reaped.is_some()
    }

    /// Harvest the child's status if it has exited; never blocks
    fn reap_nonblocking(&mut self, pid: u32) -> bool {
        let Some(child) = self.child.as_mut() else {
            return self.is_settled();
        };
        let outcome = match child.try_wait() {
            Ok(None) => return false,
            Ok(Some(status)) => Ok(status),
            Err(e) => Err(e),
        };
        self.store(pid, outcome);
        true
    }

    fn store(&mut self, pid: u32, outcome: io::Result<ExitStatus>) {
        let record = match outcome {
            Ok(status) => ExitRecord::Exited(sys::exit_code(status)),
            Err(e) => {
                warn!(pid = %pid, error = %e, "Child could not be waited on, keeping last exit code");
                ExitRecord::Unknown(self.record.last_sampled())
            }
        };
        // Dropping the Child releases the native process handle
        self.child = None;
        self.reaped = Some(record);
    }

    /// Close the remaining pipe ends, join the pumps, then make the record visible
    fn publish(&mut self, pid: u32, stdin: &StdinWriter) -> i32 {
        if let Some(record) = self.reaped.take() {
            stdin.close();
            self.pump.join();
            self.record = record;
            debug!(pid = %pid, record = ?record, "Process exit recorded");
        }
        self.record.last_sampled()
    }

    /// Publish a reaped status once doing so cannot block on the pumps
    fn publish_if_drained(&mut self, pid: u32, stdin: &StdinWriter) {
        if self.reaped.is_some() && self.pump.is_drained() {
            self.publish(pid, stdin);
        }
    }
}

/// Wait, poll and kill for one launched child
#[derive(Debug)]
pub(crate) struct LifecycleMonitor {
    pid: u32,
    pump_threads: Vec<ThreadId>,
    state: Mutex<MonitorState>,
}

impl LifecycleMonitor {
    pub(crate) fn new(pid: u32, child: Child, pump: StreamPump) -> Self {
        Self {
            pid,
            pump_threads: pump.thread_ids(),
            state: Mutex::new(MonitorState {
                child: Some(child),
                reaped: None,
                record: ExitRecord::Running,
                pump,
            }),
        }
    }

    /// Current record without touching the kernel
    ///
    /// An exit reaped elsewhere shows up here once its output is delivered.
    pub(crate) fn record(&self, stdin: &StdinWriter) -> ExitRecord {
        let mut state = self.state.lock();
        state.publish_if_drained(self.pid, stdin);
        state.record
    }

    /// Run `f` while the child is unreaped, so its pid cannot be recycled
    pub(crate) fn with_reserved_pid<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let state = self.state.lock();
        state.child.as_ref().map(|_| f())
    }

    /// Block until exit; later calls return the cached code immediately
    pub(crate) fn wait(&self, stdin: &StdinWriter) -> i32 {
        let waiter = {
            let mut state = self.state.lock();
            if state.is_settled() {
                return state.publish(self.pid, stdin);
            }
            match state.child.as_ref().map(sys::ExitWaiter::new) {
                Some(Ok(waiter)) => Some(waiter),
                Some(Err(e)) => {
                    debug!(pid = %self.pid, error = %e, "Falling back to waiting under lock");
                    None
                }
                None => None,
            }
        };

        // Blocking happens without the lock so kill() stays usable meanwhile
        if let Some(waiter) = waiter {
            if let Err(e) = waiter.block() {
                debug!(pid = %self.pid, error = %e, "Exit wait returned early");
            }
        }

        let mut state = self.state.lock();
        if let Some(child) = state.child.as_mut() {
            let outcome = child.wait();
            state.store(self.pid, outcome);
        }
        state.publish(self.pid, stdin)
    }

    /// Poll without waiting for the child; `None` while running
    ///
    /// Called from one of this process's own pump threads it also returns
    /// `None` when the lock is held, since the holder may be joining that
    /// very thread.
    pub(crate) fn try_wait(&self, stdin: &StdinWriter) -> Option<i32> {
        let mut state = if self.pump_threads.contains(&thread::current().id()) {
            self.state.try_lock()?
        } else {
            self.state.lock()
        };
        if state.reap_nonblocking(self.pid) {
            Some(state.publish(self.pid, stdin))
        } else {
            None
        }
    }

    /// Signal the process, or with `whole_tree` its descendants and group first;
    /// `false` once it has exited
    ///
    /// The lock is held throughout, so the child stays unreaped and its pid
    /// reserved while the process table is walked.
    pub(crate) fn kill(&self, force: bool, whole_tree: bool, stdin: &StdinWriter) -> bool {
        let mut state = self.state.lock();
        if state.reap_nonblocking(self.pid) {
            state.publish_if_drained(self.pid, stdin);
            debug!(pid = %self.pid, "Kill skipped, process already exited");
            return false;
        }
        let Some(child) = state.child.as_mut() else {
            return false;
        };
        if whole_tree {
            tree::kill_descendants(self.pid, force);
        }
        match sys::signal(child, force, whole_tree) {
            Ok(()) => {
                debug!(pid = %self.pid, force, whole_tree, "Termination requested");
                true
            }
            Err(e) => {
                warn!(pid = %self.pid, error = %e, "Failed to signal process");
                false
            }
        }
    }

    /// Teardown: join the pumps and reap if the child is already gone
    ///
    /// A child that is still running is left running.
    pub(crate) fn shutdown(&self, stdin: &StdinWriter) {
        let mut state = self.state.lock();
        stdin.close();
        state.pump.join();
        if state.reap_nonblocking(self.pid) {
            state.publish(self.pid, stdin);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_codes() {
        assert_eq!(ExitRecord::Running.code(), None);
        assert_eq!(ExitRecord::Exited(3).code(), Some(3));
        assert_eq!(ExitRecord::Unknown(7).code(), Some(7));
        assert!(ExitRecord::Running.is_running());
        assert!(!ExitRecord::Exited(0).is_running());
    }

    #[test]
    fn test_unknown_without_sample_uses_sentinel() {
        assert_eq!(ExitRecord::Running.last_sampled(), crate::INVALID_EXIT_CODE);
    }

    /// A monitor over a `true` child that has already exited but is unreaped
    #[cfg(unix)]
    fn exited_monitor() -> (LifecycleMonitor, StdinWriter) {
        use std::time::{Duration, Instant};

        let child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        let pump = StreamPump::start(pid, Vec::new(), 16).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while tree::ProcessSnapshot::capture().contains(pid) {
            assert!(Instant::now() < deadline, "child {pid} did not exit");
            thread::sleep(Duration::from_millis(10));
        }
        (
            LifecycleMonitor::new(pid, child, pump),
            StdinWriter::new(pid, crate::pipe::PipeEndpoint::Absent),
        )
    }

    #[cfg(unix)]
    #[test]
    fn test_kill_of_exited_child_publishes_and_releases_pid() {
        let (monitor, stdin) = exited_monitor();

        assert!(!monitor.kill(true, false, &stdin));
        assert_eq!(monitor.record(&stdin), ExitRecord::Exited(0));
        assert_eq!(monitor.with_reserved_pid(|| ()), None);

        // Once reaped the pid is never used again, not even for a tree walk
        assert!(!monitor.kill(true, true, &stdin));
        assert_eq!(monitor.wait(&stdin), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_running_child_keeps_pid_reserved() {
        let child = std::process::Command::new("sleep").arg("5").spawn().unwrap();
        let pid = child.id();
        let pump = StreamPump::start(pid, Vec::new(), 16).unwrap();
        let monitor = LifecycleMonitor::new(pid, child, pump);
        let stdin = StdinWriter::new(pid, crate::pipe::PipeEndpoint::Absent);

        assert_eq!(monitor.with_reserved_pid(|| pid), Some(pid));
        assert!(monitor.kill(true, true, &stdin));
        assert_eq!(monitor.wait(&stdin), 128 + 9);
        assert_eq!(monitor.with_reserved_pid(|| pid), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_try_wait_waits_out_a_brief_lock_holder() {
        let (monitor, stdin) = exited_monitor();

        let held = monitor.state.lock();
        thread::scope(|scope| {
            let polled = scope.spawn(|| monitor.try_wait(&stdin));
            thread::sleep(std::time::Duration::from_millis(50));
            drop(held);
            assert_eq!(polled.join().unwrap(), Some(0));
        });
    }
}
