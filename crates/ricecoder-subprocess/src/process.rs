//! The supervised child process

use std::time::Duration;

use tracing::{debug, warn};

use crate::{
    builder::ProcessBuilder,
    control,
    error::{ProcessError, Result},
    launcher::{Launched, ProcessLauncher, Streams},
    lifecycle::{ExitRecord, LifecycleMonitor},
    pipe::{PipeEndpoint, StdinWriter},
    pump::{Channel, StreamPump},
};

/// Exit code reported for a process that never launched or whose status is unknown
pub const INVALID_EXIT_CODE: i32 = -1;

/// First and maximum poll interval for [`Process::wait_async`]
const ASYNC_POLL_START: Duration = Duration::from_millis(1);
const ASYNC_POLL_MAX: Duration = Duration::from_millis(50);

/// A child process with optional piped stdio and background output pumps
///
/// All methods take `&self`; share the process across threads with `Arc`.
/// Dropping it closes stdin and joins the output pumps (which ends when the
/// child closes its output), but never kills the child.
#[derive(Debug)]
pub struct Process {
    id: u32,
    launch_error: Option<ProcessError>,
    stdin: StdinWriter,
    monitor: Option<LifecycleMonitor>,
}

impl Process {
    /// Builder for an argument vector
    pub fn builder<I, S>(args: I) -> ProcessBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<std::ffi::OsString>,
    {
        ProcessBuilder::args(args)
    }

    pub(crate) fn launch(builder: ProcessBuilder) -> Self {
        match Self::try_launch(builder) {
            Ok(process) => process,
            Err(e) => {
                warn!(error = %e, "Process launch failed");
                Self {
                    id: 0,
                    launch_error: Some(e),
                    stdin: StdinWriter::new(0, PipeEndpoint::Absent),
                    monitor: None,
                }
            }
        }
    }

    fn try_launch(builder: ProcessBuilder) -> Result<Self> {
        let ProcessBuilder {
            invocation,
            working_dir,
            environment,
            on_stdout,
            on_stderr,
            open_stdin,
            config,
        } = builder;

        let Launched {
            pid,
            mut child,
            mut pipes,
        } = ProcessLauncher {
            invocation: &invocation,
            working_dir: working_dir.as_deref(),
            environment: environment.as_ref(),
            config: &config,
            streams: Streams {
                stdin: open_stdin,
                stdout: on_stdout.is_some(),
                stderr: on_stderr.is_some(),
            },
        }
        .launch()?;

        let mut channels = Vec::with_capacity(2);
        if let (Some(pipe), Some(callback)) = (pipes.stdout.take(), on_stdout) {
            channels.push(Channel::stdout(pid, pipe, callback));
        }
        if let (Some(pipe), Some(callback)) = (pipes.stderr.take(), on_stderr) {
            channels.push(Channel::stderr(pid, pipe, callback));
        }

        let pump = match StreamPump::start(pid, channels, config.buffer_size) {
            Ok(pump) => pump,
            Err((e, partial)) => {
                // Undo the launch: the child must be gone before the
                // already-started pumps can be joined
                drop(pipes);
                let _ = child.kill();
                let _ = child.wait();
                drop(partial);
                return Err(ProcessError::PumpFailed(e));
            }
        };

        Ok(Self {
            id: pid,
            launch_error: None,
            stdin: StdinWriter::new(pid, pipes.stdin),
            monitor: Some(LifecycleMonitor::new(pid, child, pump)),
        })
    }

    pub(crate) fn into_result(mut self) -> Result<Self> {
        match self.launch_error.take() {
            Some(e) => Err(e),
            None => Ok(self),
        }
    }

    /// Native process id; `0` if the launch failed
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Whether the launch succeeded
    pub fn is_launched(&self) -> bool {
        self.monitor.is_some()
    }

    /// Why the launch failed, if it did
    pub fn launch_error(&self) -> Option<&ProcessError> {
        self.launch_error.as_ref()
    }

    /// Write to the child's stdin
    ///
    /// Concurrent writers are serialized; each call's bytes stay contiguous.
    /// Fails with [`ProcessError::StdinNotPiped`] unless the process was
    /// built with `open_stdin(true)`, and with [`ProcessError::StdinClosed`]
    /// after [`close_stdin`](Self::close_stdin).
    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        if self.monitor.is_none() {
            return Err(ProcessError::NotRunning);
        }
        self.stdin.write(bytes)
    }

    /// Whether stdin is piped and not yet closed
    pub fn is_stdin_open(&self) -> bool {
        self.stdin.is_open()
    }

    /// Close the child's stdin; idempotent
    pub fn close_stdin(&self) {
        self.stdin.close();
    }

    /// Block until the child exits and its output has been delivered
    ///
    /// Returns the exit code (`128 + signal` for signalled POSIX children,
    /// [`INVALID_EXIT_CODE`] if the process never launched). Later calls
    /// return the same code without blocking.
    pub fn wait(&self) -> i32 {
        match &self.monitor {
            Some(monitor) => monitor.wait(&self.stdin),
            None => INVALID_EXIT_CODE,
        }
    }

    /// Exit code if the child has exited and its output has been delivered
    pub fn try_wait(&self) -> Option<i32> {
        self.monitor.as_ref()?.try_wait(&self.stdin)
    }

    /// Poll-based wait for async callers
    ///
    /// There is no built-in timeout; wrap it in `tokio::time::timeout`.
    pub async fn wait_async(&self) -> i32 {
        if self.monitor.is_none() {
            return INVALID_EXIT_CODE;
        }
        let mut delay = ASYNC_POLL_START;
        loop {
            if let Some(code) = self.try_wait() {
                return code;
            }
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(ASYNC_POLL_MAX);
        }
    }

    /// Whether the child has exited (polls the OS)
    pub fn has_exited(&self) -> bool {
        self.try_wait().is_some()
    }

    /// Recorded exit state without querying the OS; `None` if never launched
    pub fn exit_record(&self) -> Option<ExitRecord> {
        self.monitor
            .as_ref()
            .map(|monitor| monitor.record(&self.stdin))
    }

    /// Request termination of this process only
    ///
    /// Returns `false` if the process already exited or never launched.
    pub fn kill(&self, force: bool) -> bool {
        self.monitor
            .as_ref()
            .is_some_and(|monitor| monitor.kill(force, false, &self.stdin))
    }

    /// Terminate this process and every descendant found in a snapshot
    ///
    /// A no-op once the process has exited: its id may already name another
    /// process.
    pub fn kill_tree(&self, force: bool) {
        if let Some(monitor) = &self.monitor {
            monitor.kill(force, true, &self.stdin);
        }
    }

    /// Executable path of this process, empty once it has been reaped
    pub fn path(&self) -> String {
        self.monitor
            .as_ref()
            .and_then(|monitor| monitor.with_reserved_pid(|| control::process_path(self.id)))
            .unwrap_or_default()
    }
}

impl Drop for Process {
    fn drop(&mut self) {
        if let Some(monitor) = &self.monitor {
            debug!(pid = %self.id, "Releasing process");
            monitor.shutdown(&self.stdin);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_launch_is_inert() {
        let process = ProcessBuilder::args(["/no/such/program"])
            .open_stdin(true)
            .launch();
        assert_eq!(process.id(), 0);
        assert!(!process.is_launched());
        assert!(matches!(
            process.launch_error(),
            Some(ProcessError::SpawnFailed(_))
        ));
        assert_eq!(process.wait(), INVALID_EXIT_CODE);
        assert_eq!(process.try_wait(), None);
        assert!(!process.kill(true));
        process.kill_tree(true);
        assert!(matches!(process.write(b"x"), Err(ProcessError::NotRunning)));
        process.close_stdin();
        assert_eq!(process.exit_record(), None);
    }

    #[test]
    fn test_spawn_surfaces_error() {
        let err = ProcessBuilder::command_line("   ").spawn().unwrap_err();
        assert!(matches!(err, ProcessError::EmptyCommand));
    }

    #[cfg(unix)]
    #[test]
    fn test_is_running() {
        let process = Process::builder(["sleep", "1"]).spawn().unwrap();
        assert!(process.id() > 0);
        assert!(!process.has_exited());
        assert_eq!(process.exit_record(), Some(ExitRecord::Running));

        assert_eq!(process.wait(), 0);
        assert!(process.has_exited());
        assert_eq!(process.exit_record(), Some(ExitRecord::Exited(0)));
    }

    #[cfg(unix)]
    #[test]
    fn test_kill_reports_signal_exit_code() {
        let process = Process::builder(["sleep", "10"]).spawn().unwrap();
        assert!(process.kill(false));
        // SIGINT may be ignored when the test runner itself ignores it
        std::thread::sleep(Duration::from_millis(100));
        process.kill(true);
        let code = process.wait();
        assert!(code == 128 + 2 || code == 128 + 9, "unexpected exit code {code}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_wait_async() {
        let process = ProcessBuilder::command_line("exit 7").spawn().unwrap();
        assert_eq!(process.wait_async().await, 7);
        assert_eq!(process.wait(), 7);
    }
}
