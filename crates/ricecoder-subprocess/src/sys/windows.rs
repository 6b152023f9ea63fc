//! Windows backend: CreateProcess via std, TerminateProcess, per-stream pumps

use std::io;
use std::os::windows::io::{AsHandle, AsRawHandle, OwnedHandle};
use std::os::windows::process::CommandExt;
use std::process::{Child, Command, ExitStatus};

use ::windows::core::PWSTR;
use ::windows::Win32::Foundation::{CloseHandle, HANDLE, WAIT_FAILED};
use ::windows::Win32::System::Threading::{
    OpenProcess, QueryFullProcessImageNameW, TerminateProcess, WaitForSingleObject, INFINITE,
    PROCESS_NAME_WIN32, PROCESS_QUERY_LIMITED_INFORMATION, PROCESS_TERMINATE,
};
use parking_lot::Mutex;
use tracing::trace;

use crate::command::split_program;
use crate::config::ProcessConfig;

/// Serializes spawns so a concurrent CreateProcess cannot inherit pipe
/// handles meant for another child
static SPAWN_LOCK: Mutex<()> = parking_lot::const_mutex(());

/// Exit code `TerminateProcess` leaves behind
const TERMINATED_EXIT_CODE: u32 = 1;

const ERROR_INVALID_PARAMETER: i32 = 87;

/// The first token is the program; the remainder is passed through verbatim
pub(crate) fn shell_command(line: &str) -> Command {
    let (program, rest) = split_program(line);
    let mut cmd = Command::new(program);
    if !rest.is_empty() {
        cmd.raw_arg(rest);
    }
    cmd
}

/// Handle inheritance is decided per redirected stream by std; descriptor
/// inheritance has no separate switch here.
pub(crate) fn configure(_cmd: &mut Command, config: &ProcessConfig) {
    trace!(
        inherit = config.inherit_file_descriptors,
        "Descriptor inheritance is implied by stdio redirection on Windows"
    );
}

pub(crate) fn spawn(cmd: &mut Command) -> io::Result<Child> {
    let _guard = SPAWN_LOCK.lock();
    cmd.spawn()
}

/// Convert a std pipe end into an owned handle
pub(crate) fn owned<T: Into<OwnedHandle>>(pipe: T) -> OwnedHandle {
    pipe.into()
}

/// Blocks on a duplicate of the process handle, so the original can be
/// released by the monitor at any time
#[derive(Debug)]
pub(crate) struct ExitWaiter {
    handle: OwnedHandle,
}

impl ExitWaiter {
    pub(crate) fn new(child: &Child) -> io::Result<Self> {
        Ok(Self {
            handle: child.as_handle().try_clone_to_owned()?,
        })
    }

    pub(crate) fn block(&self) -> io::Result<()> {
        // SAFETY: the handle is owned by `self` and open for the whole call.
        let event = unsafe { WaitForSingleObject(HANDLE(self.handle.as_raw_handle()), INFINITE) };
        if event == WAIT_FAILED {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

fn os_error(err: ::windows::core::Error) -> io::Error {
    io::Error::from_raw_os_error(err.code().0 & 0xFFFF)
}

/// There is no graceful request at the OS level; `force` is accepted for
/// parity and both forms terminate
pub(crate) fn signal(child: &mut Child, _force: bool, _group: bool) -> io::Result<()> {
    child.kill()
}

pub(crate) fn signal_pid(pid: u32, _force: bool) -> io::Result<()> {
    if pid == 0 {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "invalid pid 0"));
    }
    // SAFETY: the handle is closed on every path after OpenProcess succeeds.
    unsafe {
        let handle = OpenProcess(PROCESS_TERMINATE, false, pid).map_err(os_error)?;
        let result = TerminateProcess(handle, TERMINATED_EXIT_CODE);
        let _ = CloseHandle(handle);
        result.map_err(os_error)
    }
}

/// Process groups are a POSIX notion
pub(crate) fn signal_group_if_leader(_pid: u32, _force: bool) {}

pub(crate) fn is_no_such_process(err: &io::Error) -> bool {
    err.raw_os_error() == Some(ERROR_INVALID_PARAMETER)
}

pub(crate) fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(crate::INVALID_EXIT_CODE)
}

/// Full image path of `pid`, empty when the process is gone or inaccessible
pub(crate) fn executable_path(pid: u32) -> String {
    // SAFETY: the buffer outlives the call and `len` holds its capacity.
    unsafe {
        let Ok(handle) = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid) else {
            return String::new();
        };
        let mut buffer = vec![0u16; 32_768];
        let mut len = buffer.len() as u32;
        let result = QueryFullProcessImageNameW(
            handle,
            PROCESS_NAME_WIN32,
            PWSTR(buffer.as_mut_ptr()),
            &mut len,
        );
        let _ = CloseHandle(handle);
        if result.is_err() {
            return String::new();
        }
        String::from_utf16_lossy(&buffer[..len as usize])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pid_zero_rejected() {
        assert!(signal_pid(0, true).is_err());
    }

    #[test]
    fn test_own_executable_path() {
        let path = executable_path(std::process::id());
        assert!(path.to_ascii_lowercase().ends_with(".exe"));
    }
}
