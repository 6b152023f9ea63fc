//! Construction parameters for a [`Process`]

use std::fmt;
use std::path::PathBuf;

use crate::{
    command::{Environment, Invocation},
    config::ProcessConfig,
    error::Result,
    process::Process,
    pump::OutputCallback,
};

/// Builder for a supervised child process
///
/// Output callbacks decide which streams are piped: a stream without a
/// callback is inherited from the parent, as is stdin unless
/// [`open_stdin`](Self::open_stdin) is set.
///
/// ```rust,no_run
/// use std::sync::{Arc, Mutex};
/// use ricecoder_subprocess::ProcessBuilder;
///
/// let output = Arc::new(Mutex::new(Vec::new()));
/// let sink = Arc::clone(&output);
/// let process = ProcessBuilder::args(["cat"])
///     .open_stdin(true)
///     .on_stdout(move |chunk| sink.lock().unwrap().extend_from_slice(chunk))
///     .spawn()?;
///
/// process.write(b"abc")?;
/// process.close_stdin();
/// assert_eq!(process.wait(), 0);
/// assert_eq!(*output.lock().unwrap(), b"abc");
/// # Ok::<(), ricecoder_subprocess::ProcessError>(())
/// ```
pub struct ProcessBuilder {
    pub(crate) invocation: Invocation,
    pub(crate) working_dir: Option<PathBuf>,
    pub(crate) environment: Option<Environment>,
    pub(crate) on_stdout: Option<OutputCallback>,
    pub(crate) on_stderr: Option<OutputCallback>,
    pub(crate) open_stdin: bool,
    pub(crate) config: ProcessConfig,
}

impl ProcessBuilder {
    /// Start from an invocation
    pub fn new(invocation: Invocation) -> Self {
        Self {
            invocation,
            working_dir: None,
            environment: None,
            on_stdout: None,
            on_stderr: None,
            open_stdin: false,
            config: ProcessConfig::default(),
        }
    }

    /// Start from an argument vector; the first element is the executable
    pub fn args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<std::ffi::OsString>,
    {
        Self::new(Invocation::args(args))
    }

    /// Start from a command line (`/bin/sh -c` on POSIX)
    pub fn command_line(line: impl Into<String>) -> Self {
        Self::new(Invocation::line(line))
    }

    /// Set working directory (default: the parent's)
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Replace the child's whole environment
    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Add a variable to the replacement environment, starting an empty one
    /// if none was set
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment
            .get_or_insert_with(Environment::new)
            .insert(key, value);
        self
    }

    /// Pipe stdout into `callback`
    pub fn on_stdout<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&[u8]) + Send + 'static,
    {
        self.on_stdout = Some(Box::new(callback));
        self
    }

    /// Pipe stderr into `callback`
    pub fn on_stderr<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&[u8]) + Send + 'static,
    {
        self.on_stderr = Some(Box::new(callback));
        self
    }

    /// Pipe stdin so [`Process::write`] can feed the child
    pub fn open_stdin(mut self, open: bool) -> Self {
        self.open_stdin = open;
        self
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: ProcessConfig) -> Self {
        self.config = config;
        self
    }

    /// Set pump buffer size
    pub fn buffer_size(mut self, bytes: usize) -> Self {
        self.config = self.config.buffer_size(bytes);
        self
    }

    /// Enable/disable descriptor inheritance (POSIX)
    pub fn inherit_file_descriptors(mut self, inherit: bool) -> Self {
        self.config = self.config.inherit_file_descriptors(inherit);
        self
    }

    /// Launch; never fails
    ///
    /// On failure the returned process has id `0`, carries the cause in
    /// [`Process::launch_error`], and every operation on it is a no-op.
    pub fn launch(self) -> Process {
        Process::launch(self)
    }

    /// Launch, surfacing failure as an error
    pub fn spawn(self) -> Result<Process> {
        self.launch().into_result()
    }
}

impl fmt::Debug for ProcessBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessBuilder")
            .field("invocation", &self.invocation)
            .field("working_dir", &self.working_dir)
            .field("environment", &self.environment)
            .field("on_stdout", &self.on_stdout.is_some())
            .field("on_stderr", &self.on_stderr.is_some())
            .field("open_stdin", &self.open_stdin)
            .field("config", &self.config)
            .finish()
    }
}
