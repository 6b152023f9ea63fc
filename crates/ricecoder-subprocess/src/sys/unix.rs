//! POSIX backend: fork/exec via std, nix signals, poll-multiplexed pumps

use std::io;
use std::os::fd::{AsFd, OwnedFd};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Child, Command, ExitStatus};

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::{getpgid, Pid};
use tracing::{debug, warn};

use crate::config::ProcessConfig;
use crate::pump::Channel;

/// Upper bound for the descriptor sweep when `close_range` is unavailable
const MAX_SWEPT_FD: libc::c_int = 65_536;

/// Command lines go through the system shell
pub(crate) fn shell_command(line: &str) -> Command {
    let mut cmd = Command::new("/bin/sh");
    cmd.arg("-c").arg(line);
    cmd
}

/// Make the child a process group leader and, unless inheritance was
/// requested, keep every descriptor above stderr from crossing exec
pub(crate) fn configure(cmd: &mut Command, config: &ProcessConfig) {
    cmd.process_group(0);

    if config.inherit_file_descriptors {
        return;
    }

    let max_fd = open_max();
    // SAFETY: the hook only issues raw fcntl/syscall calls, which are
    // async-signal-safe, and allocates nothing.
    unsafe {
        cmd.pre_exec(move || {
            mark_cloexec_above_stderr(max_fd);
            Ok(())
        });
    }
}

fn open_max() -> libc::c_int {
    // SAFETY: sysconf has no preconditions.
    let limit = unsafe { libc::sysconf(libc::_SC_OPEN_MAX) };
    if limit <= 0 {
        1024
    } else {
        limit.min(MAX_SWEPT_FD as libc::c_long) as libc::c_int
    }
}

/// Runs between fork and exec; must stay async-signal-safe.
///
/// Marking close-on-exec rather than closing keeps std's exec-error pipe
/// usable until exec succeeds.
fn mark_cloexec_above_stderr(max_fd: libc::c_int) {
    #[cfg(target_os = "linux")]
    {
        const CLOSE_RANGE_CLOEXEC: libc::c_uint = 1 << 2;
        // SAFETY: close_range only changes descriptor flags.
        let rc = unsafe {
            libc::syscall(
                libc::SYS_close_range,
                3 as libc::c_uint,
                libc::c_uint::MAX,
                CLOSE_RANGE_CLOEXEC,
            )
        };
        if rc == 0 {
            return;
        }
    }

    for fd in 3..max_fd {
        // SAFETY: fcntl on a closed descriptor fails with EBADF and has no
        // other effect.
        unsafe {
            let flags = libc::fcntl(fd, libc::F_GETFD);
            if flags >= 0 && flags & libc::FD_CLOEXEC == 0 {
                libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC);
            }
        }
    }
}

pub(crate) fn spawn(cmd: &mut Command) -> io::Result<Child> {
    cmd.spawn()
}

/// Convert a std pipe end into an owned descriptor
pub(crate) fn owned<T: Into<OwnedFd>>(pipe: T) -> OwnedFd {
    pipe.into()
}

/// Blocks until the child is waitable, without reaping it
///
/// The pid stays reserved until the monitor reaps it under its lock, so
/// signals sent meanwhile cannot reach a recycled pid.
#[derive(Debug)]
pub(crate) struct ExitWaiter {
    pid: libc::pid_t,
}

impl ExitWaiter {
    pub(crate) fn new(child: &Child) -> io::Result<Self> {
        Ok(Self {
            pid: raw_pid(child.id())?,
        })
    }

    pub(crate) fn block(&self) -> io::Result<()> {
        loop {
            // SAFETY: siginfo_t is plain data and waitid only writes into it.
            let mut info: libc::siginfo_t = unsafe { std::mem::zeroed() };
            let rc = unsafe {
                libc::waitid(
                    libc::P_PID,
                    self.pid as libc::id_t,
                    &mut info,
                    libc::WEXITED | libc::WNOWAIT,
                )
            };
            if rc == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }
}

fn raw_pid(pid: u32) -> io::Result<libc::pid_t> {
    match libc::pid_t::try_from(pid) {
        Ok(raw) if raw > 0 => Ok(raw),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid pid {pid}"),
        )),
    }
}

fn nix_pid(pid: u32) -> io::Result<Pid> {
    raw_pid(pid).map(Pid::from_raw)
}

fn termination_signal(force: bool) -> Signal {
    if force {
        Signal::SIGKILL
    } else {
        Signal::SIGINT
    }
}

/// Signal a live, unreaped child; `group` also reaches its process group
pub(crate) fn signal(child: &mut Child, force: bool, group: bool) -> io::Result<()> {
    let pid = nix_pid(child.id())?;
    let sig = termination_signal(force);
    if group {
        match killpg(pid, sig) {
            Ok(()) => return Ok(()),
            Err(e) => debug!(pid = %pid, error = %e, "killpg failed, signalling process only"),
        }
    }
    kill(pid, sig).map_err(io::Error::from)
}

/// Signal an arbitrary process by id
pub(crate) fn signal_pid(pid: u32, force: bool) -> io::Result<()> {
    kill(nix_pid(pid)?, termination_signal(force)).map_err(io::Error::from)
}

/// Signal the group led by `pid`, if `pid` leads one
pub(crate) fn signal_group_if_leader(pid: u32, force: bool) {
    let Ok(pid) = nix_pid(pid) else {
        return;
    };
    if getpgid(Some(pid)) == Ok(pid) {
        if let Err(e) = killpg(pid, termination_signal(force)) {
            if e != Errno::ESRCH {
                warn!(pid = %pid, error = %e, "Failed to signal process group");
            }
        }
    }
}

pub(crate) fn is_no_such_process(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::ESRCH)
}

/// Exit code, or `128 + signal` for a signalled child
pub(crate) fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(crate::INVALID_EXIT_CODE)
}

/// Executable path of `pid`, empty when unknown
pub(crate) fn executable_path(pid: u32) -> String {
    #[cfg(target_os = "linux")]
    {
        match std::fs::read(format!("/proc/{pid}/cmdline")) {
            Ok(cmdline) => {
                let first = cmdline.split(|b| *b == 0).next().unwrap_or_default();
                String::from_utf8_lossy(first).into_owned()
            }
            Err(_) => String::new(),
        }
    }

    #[cfg(not(target_os = "linux"))]
    {
        crate::tree::command_of(pid)
    }
}

/// Drain stdout and stderr on one thread using `poll`
pub(crate) fn multiplex(mut channels: Vec<Channel>, buffer_size: usize) {
    let mut buffer = vec![0u8; buffer_size];

    while !channels.is_empty() {
        let ready: Vec<bool> = {
            let mut fds: Vec<PollFd<'_>> = channels
                .iter()
                .map(|channel| PollFd::new(channel.file.as_fd(), PollFlags::POLLIN))
                .collect();
            match poll(&mut fds, PollTimeout::NONE) {
                Ok(_) => fds
                    .iter()
                    .map(|fd| fd.revents().is_some_and(|events| !events.is_empty()))
                    .collect(),
                Err(Errno::EINTR) => continue,
                Err(e) => {
                    let pid = channels.first().map(|c| c.pid).unwrap_or_default();
                    warn!(pid = %pid, error = %e, "poll failed, abandoning output pump");
                    return;
                }
            }
        };

        let mut ready = ready.into_iter();
        channels.retain_mut(|channel| match ready.next() {
            Some(true) => channel.pump_once(&mut buffer),
            _ => true,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_pids_are_rejected() {
        assert!(signal_pid(0, false).is_err());
        assert!(signal_pid(u32::MAX, true).is_err());
    }

    #[test]
    fn test_signal_codes() {
        assert_eq!(termination_signal(false), Signal::SIGINT);
        assert_eq!(termination_signal(true), Signal::SIGKILL);
    }

    #[test]
    fn test_exit_code_for_signal() {
        // Raw wait status 9 means "killed by SIGKILL"
        assert_eq!(exit_code(ExitStatus::from_raw(9)), 137);
        // Raw wait status 3 << 8 means "exited with code 3"
        assert_eq!(exit_code(ExitStatus::from_raw(3 << 8)), 3);
    }

    #[test]
    fn test_own_executable_path() {
        if cfg!(target_os = "linux") {
            assert!(!executable_path(std::process::id()).is_empty());
        }
    }
}
