//! Error types for process supervision

use std::io;
use thiserror::Error;

/// Process supervision errors
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Neither an argument vector nor a command line was supplied
    #[error("Command must not be empty")]
    EmptyCommand,

    /// Invalid configuration
    #[error("Invalid process configuration: {0}")]
    InvalidConfig(String),

    /// Pipe creation, fork/exec or CreateProcess failed
    #[error("Failed to spawn process: {0}")]
    SpawnFailed(#[source] io::Error),

    /// Output pump thread could not be started
    #[error("Failed to start output pump: {0}")]
    PumpFailed(#[source] io::Error),

    /// `write` was called on a process built without `open_stdin`
    #[error("Stdin was not opened for this process")]
    StdinNotPiped,

    /// `write` was called after `close_stdin`
    #[error("Stdin has already been closed")]
    StdinClosed,

    /// The process was never launched or has already been reaped
    #[error("Process is not running")]
    NotRunning,

    /// I/O failure on a live pipe or native handle
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for process operations
pub type Result<T> = std::result::Result<T, ProcessError>;
