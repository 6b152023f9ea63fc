//! Background threads draining stdout/stderr into caller callbacks

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::process::{ChildStderr, ChildStdout};
use std::thread::{self, JoinHandle, ThreadId};

use tracing::{debug, warn};

/// Callback receiving one chunk of child output
///
/// The slice is only valid for the duration of the call. When the same logic
/// serves both streams, share its state behind a lock: stdout and stderr may be
/// delivered from different threads. A callback must not wait on or kill the
/// process it is draining.
pub type OutputCallback = Box<dyn FnMut(&[u8]) + Send + 'static>;

/// Which output stream a chunk came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stream {
    Stdout,
    Stderr,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => f.write_str("stdout"),
            Self::Stderr => f.write_str("stderr"),
        }
    }
}

/// A readable pipe end paired with its callback
pub(crate) struct Channel {
    pub(crate) pid: u32,
    pub(crate) stream: Stream,
    pub(crate) file: File,
    callback: OutputCallback,
}

impl Channel {
    pub(crate) fn stdout(pid: u32, pipe: ChildStdout, callback: OutputCallback) -> Self {
        Self::new(pid, Stream::Stdout, File::from(crate::sys::owned(pipe)), callback)
    }

    pub(crate) fn stderr(pid: u32, pipe: ChildStderr, callback: OutputCallback) -> Self {
        Self::new(pid, Stream::Stderr, File::from(crate::sys::owned(pipe)), callback)
    }

    fn new(pid: u32, stream: Stream, file: File, callback: OutputCallback) -> Self {
        Self {
            pid,
            stream,
            file,
            callback,
        }
    }

    /// One read; delivers the chunk and returns whether the pipe is still open
    pub(crate) fn pump_once(&mut self, buffer: &mut [u8]) -> bool {
        loop {
            match self.file.read(buffer) {
                Ok(0) => {
                    debug!(pid = %self.pid, stream = %self.stream, "End of stream");
                    return false;
                }
                Ok(n) => {
                    (self.callback)(&buffer[..n]);
                    return true;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(pid = %self.pid, stream = %self.stream, error = %e, "Pipe read failed");
                    return false;
                }
            }
        }
    }

    /// Blocking read loop until end of stream
    pub(crate) fn drain(mut self, buffer_size: usize) {
        let mut buffer = vec![0u8; buffer_size];
        while self.pump_once(&mut buffer) {}
    }
}

/// The running pump threads for one process
#[derive(Debug, Default)]
pub(crate) struct StreamPump {
    pid: u32,
    handles: Vec<JoinHandle<()>>,
}

impl StreamPump {
    /// Start draining whichever channels were supplied
    ///
    /// On POSIX two channels share one thread multiplexed with `poll`; on
    /// Windows every channel gets its own blocking reader.
    ///
    /// On failure the threads already started are handed back rather than
    /// joined, since they only finish once the child closes its output.
    pub(crate) fn start(
        pid: u32,
        channels: Vec<Channel>,
        buffer_size: usize,
    ) -> Result<Self, (io::Error, Self)> {
        let mut pump = Self {
            pid,
            handles: Vec::with_capacity(channels.len()),
        };
        if channels.is_empty() {
            return Ok(pump);
        }

        #[cfg(unix)]
        if channels.len() > 1 {
            let spawned = thread::Builder::new()
                .name(format!("subprocess-pump-{pid}"))
                .spawn(move || crate::sys::multiplex(channels, buffer_size));
            return match spawned {
                Ok(handle) => {
                    pump.handles.push(handle);
                    debug!(pid = %pid, "Started multiplexed output pump");
                    Ok(pump)
                }
                Err(e) => Err((e, pump)),
            };
        }

        for channel in channels {
            let stream = channel.stream;
            let spawned = thread::Builder::new()
                .name(format!("subprocess-{stream}-{pid}"))
                .spawn(move || channel.drain(buffer_size));
            match spawned {
                Ok(handle) => pump.handles.push(handle),
                Err(e) => return Err((e, pump)),
            }
            debug!(pid = %pid, stream = %stream, "Started output pump");
        }
        Ok(pump)
    }

    /// Ids of the pump threads, fixed once started
    pub(crate) fn thread_ids(&self) -> Vec<ThreadId> {
        self.handles.iter().map(|handle| handle.thread().id()).collect()
    }

    /// Whether every pump thread has already returned, so joining cannot block
    pub(crate) fn is_drained(&self) -> bool {
        self.handles.iter().all(JoinHandle::is_finished)
    }

    /// Wait for every pump thread to return; later calls are no-ops
    pub(crate) fn join(&mut self) {
        let current = thread::current().id();
        for handle in self.handles.drain(..) {
            // A callback that waits on its own process must not join itself
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                warn!(pid = %self.pid, "Output callback panicked");
            }
        }
    }
}

impl Drop for StreamPump {
    fn drop(&mut self) {
        self.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_display() {
        assert_eq!(Stream::Stdout.to_string(), "stdout");
        assert_eq!(Stream::Stderr.to_string(), "stderr");
    }

    #[test]
    fn test_empty_pump_joins_immediately() {
        let mut pump = StreamPump::start(1, Vec::new(), 16).unwrap();
        assert!(pump.handles.is_empty());
        assert!(pump.is_drained());
        assert!(pump.thread_ids().is_empty());
        pump.join();
    }
}
