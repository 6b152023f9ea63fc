//! Parent-side pipe ends and the stdin writer

use std::io::Write;
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::{ProcessError, Result};

/// One parent-side end of an OS pipe
///
/// Dropping the inner value closes the descriptor/handle, so moving from
/// `Open` to `Closed` is the single release point.
#[derive(Debug)]
pub(crate) enum PipeEndpoint<T> {
    /// Stream was not redirected
    Absent,
    Open(T),
    Closed,
}

impl<T> PipeEndpoint<T> {
    fn from_option(end: Option<T>) -> Self {
        end.map_or(Self::Absent, Self::Open)
    }

    pub(crate) fn is_open(&self) -> bool {
        matches!(self, Self::Open(_))
    }

    /// Move the end out, e.g. into a pump thread that will own it
    pub(crate) fn take(&mut self) -> Option<T> {
        match std::mem::replace(self, Self::Closed) {
            Self::Open(end) => Some(end),
            Self::Absent => {
                *self = Self::Absent;
                None
            }
            Self::Closed => None,
        }
    }

    /// Close the end; returns whether it was open
    pub(crate) fn close(&mut self) -> bool {
        self.take().is_some()
    }
}

/// The parent's ends of the child's standard streams
///
/// Child-side ends are closed by std right after the spawn call.
#[derive(Debug)]
pub(crate) struct PipeSet {
    pub(crate) stdin: PipeEndpoint<ChildStdin>,
    pub(crate) stdout: PipeEndpoint<ChildStdout>,
    pub(crate) stderr: PipeEndpoint<ChildStderr>,
}

impl PipeSet {
    /// Detach whichever pipes were requested from a freshly spawned child
    pub(crate) fn from_child(child: &mut Child) -> Self {
        Self {
            stdin: PipeEndpoint::from_option(child.stdin.take()),
            stdout: PipeEndpoint::from_option(child.stdout.take()),
            stderr: PipeEndpoint::from_option(child.stderr.take()),
        }
    }
}

/// Serialized writes to the child's stdin
#[derive(Debug)]
pub(crate) struct StdinWriter {
    pid: u32,
    pipe: Mutex<PipeEndpoint<ChildStdin>>,
}

impl StdinWriter {
    pub(crate) fn new(pid: u32, pipe: PipeEndpoint<ChildStdin>) -> Self {
        Self {
            pid,
            pipe: Mutex::new(pipe),
        }
    }

    /// Write all of `bytes`, holding the stdin lock for the whole call
    pub(crate) fn write(&self, bytes: &[u8]) -> Result<()> {
        let mut pipe = self.pipe.lock();
        match &mut *pipe {
            PipeEndpoint::Open(stdin) => {
                stdin.write_all(bytes)?;
                stdin.flush()?;
                trace!(pid = %self.pid, len = bytes.len(), "Wrote to stdin");
                Ok(())
            }
            PipeEndpoint::Absent => Err(ProcessError::StdinNotPiped),
            PipeEndpoint::Closed => Err(ProcessError::StdinClosed),
        }
    }

    /// Close stdin; closing twice or never-opened stdin is a no-op
    pub(crate) fn close(&self) {
        if self.pipe.lock().close() {
            debug!(pid = %self.pid, "Closed stdin");
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        self.pipe.lock().is_open()
    }
}
