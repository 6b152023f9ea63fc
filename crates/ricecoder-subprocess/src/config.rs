//! Process configuration

use serde::{Deserialize, Serialize};

use crate::error::{ProcessError, Result};

/// Default read buffer size for output pumps (128 KiB)
pub const DEFAULT_BUFFER_SIZE: usize = 131_072;

/// Immutable per-process settings
///
/// Deserializable so hosts can embed it in their own settings files:
///
/// ```toml
/// buffer_size = 65536
/// inherit_file_descriptors = false
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    /// Size of the buffer each output pump reads into
    pub buffer_size: usize,
    /// Let the child inherit the parent's open descriptors (POSIX only;
    /// ignored on Windows when any stream is redirected)
    pub inherit_file_descriptors: bool,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            inherit_file_descriptors: false,
        }
    }
}

impl ProcessConfig {
    /// Create configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set pump buffer size in bytes
    pub fn buffer_size(mut self, bytes: usize) -> Self {
        self.buffer_size = bytes;
        self
    }

    /// Enable/disable descriptor inheritance
    pub fn inherit_file_descriptors(mut self, inherit: bool) -> Self {
        self.inherit_file_descriptors = inherit;
        self
    }

    /// Check the configuration before launch
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(ProcessError::InvalidConfig(
                "buffer_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
