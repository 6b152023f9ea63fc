//! Operations on a bare process id, without an owning [`Process`](crate::Process)
//!
//! These are unsynchronized with any `Process` that may own the same id: the
//! caller is responsible for making sure the id still names the intended
//! process.

use tracing::{debug, warn};

use crate::{sys, tree};

/// Request termination of a single process
///
/// `force = false` sends SIGINT on POSIX; `force = true` sends SIGKILL. On
/// Windows both forms terminate unconditionally. Returns `false` for id `0`,
/// for processes that no longer exist, and when the request is refused.
pub fn kill(pid: u32, force: bool) -> bool {
    match sys::signal_pid(pid, force) {
        Ok(()) => {
            debug!(pid = %pid, force, "Termination requested");
            true
        }
        Err(e) if sys::is_no_such_process(&e) => false,
        Err(e) => {
            warn!(pid = %pid, error = %e, "Failed to signal process");
            false
        }
    }
}

/// Terminate `pid` and every descendant found in a fresh snapshot
///
/// Descendants are signalled before `pid` itself. On POSIX, when `pid` leads
/// a process group the whole group is signalled as well.
pub fn kill_tree(pid: u32, force: bool) {
    if pid == 0 {
        return;
    }
    tree::kill_descendants(pid, force);
    sys::signal_group_if_leader(pid, force);
    kill(pid, force);
}

/// Executable path of `pid`, or an empty string if it is gone or inaccessible
///
/// POSIX reads `/proc/<pid>/cmdline` (UTF-8, lossily decoded); Windows asks
/// the loader for the full image name.
pub fn process_path(pid: u32) -> String {
    if pid == 0 {
        return String::new();
    }
    sys::executable_path(pid)
}

/// Transitive descendants of `pid` in a fresh snapshot, parents first
pub fn descendants(pid: u32) -> Vec<u32> {
    tree::ProcessSnapshot::capture().descendants(pid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pid_zero_is_a_noop() {
        assert!(!kill(0, true));
        kill_tree(0, true);
        assert!(process_path(0).is_empty());
    }

    #[test]
    fn test_process_path_of_missing_pid() {
        // Larger than any default pid_max
        assert!(process_path(4_000_000_000).is_empty());
    }

    #[test]
    fn test_kill_missing_pid() {
        assert!(!kill(4_000_000_000, false));
    }
}
