//! # ricecoder-subprocess
//!
//! **Purpose**: Supervised child processes with one API on POSIX and Windows
//!
//! ## Features
//!
//! - **Launching**: argument vector or command line, working directory,
//!   wholesale environment replacement
//! - **Piped stdio**: only the streams that are asked for; stdin writes are
//!   serialized per process
//! - **Output pumps**: background threads feed stdout/stderr chunks to
//!   callbacks, in order per stream, fully drained before exit is reported
//! - **Exit status**: blocking `wait`, polling `try_wait`, async `wait_async`;
//!   the first observed status is cached and never re-queried
//! - **Termination**: single process (graceful or forced) and whole process
//!   trees discovered from a process snapshot, with or without a live
//!   [`Process`]
//!
//! ## Usage
//!
//! ```rust,no_run
//! use ricecoder_subprocess::ProcessBuilder;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let process = ProcessBuilder::command_line("make test")
//!     .working_dir("/src/project")
//!     .on_stdout(|chunk| print!("{}", String::from_utf8_lossy(chunk)))
//!     .on_stderr(|chunk| eprint!("{}", String::from_utf8_lossy(chunk)))
//!     .spawn()?;
//!
//! if process.try_wait().is_none() {
//!     process.kill_tree(true);
//! }
//! println!("exited with {}", process.wait());
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod command;
pub mod config;
pub mod control;
pub mod error;
pub mod lifecycle;
pub mod process;
pub mod pump;
pub mod tree;

mod launcher;
mod pipe;
mod sys;

pub use builder::ProcessBuilder;
pub use command::{Environment, Invocation};
pub use config::{ProcessConfig, DEFAULT_BUFFER_SIZE};
pub use control::{descendants, kill, kill_tree, process_path};
pub use error::{ProcessError, Result};
pub use lifecycle::ExitRecord;
pub use process::{Process, INVALID_EXIT_CODE};
pub use pump::OutputCallback;
pub use tree::ProcessSnapshot;
