//! What to run: argument vector or command line, plus environment override

use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::process::Command;

use crate::error::{ProcessError, Result};
use crate::sys;

/// How the child is described
///
/// The two framings are mutually exclusive. Quoting is handled here, never by
/// the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// `argv[0]` is the executable, the rest are passed as separate arguments
    Args(Vec<OsString>),
    /// A single command line, run through the platform shell convention
    Line(String),
}

impl Invocation {
    /// Build from an argument vector
    pub fn args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self::Args(args.into_iter().map(Into::into).collect())
    }

    /// Build from a command line string
    pub fn line(line: impl Into<String>) -> Self {
        Self::Line(line.into())
    }

    /// Executable named by the invocation, if any
    pub fn program(&self) -> Option<&OsStr> {
        match self {
            Self::Args(args) => args.first().map(OsString::as_os_str),
            Self::Line(line) => line.split_whitespace().next().map(OsStr::new),
        }
    }

    /// Whether there is nothing to execute
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Args(args) => args.first().map_or(true, |program| program.is_empty()),
            Self::Line(line) => line.trim().is_empty(),
        }
    }

    pub(crate) fn to_command(&self) -> Result<Command> {
        if self.is_empty() {
            return Err(ProcessError::EmptyCommand);
        }
        match self {
            Self::Args(args) => {
                let mut cmd = Command::new(&args[0]);
                cmd.args(&args[1..]);
                Ok(cmd)
            }
            Self::Line(line) => Ok(sys::shell_command(line)),
        }
    }
}

/// Split a Windows-style command line into program and verbatim remainder
#[cfg_attr(not(windows), allow(dead_code))]
pub(crate) fn split_program(line: &str) -> (&str, &str) {
    let line = line.trim_start();
    if let Some(quoted) = line.strip_prefix('"') {
        return match quoted.find('"') {
            Some(end) => (&quoted[..end], quoted[end + 1..].trim_start()),
            None => (quoted, ""),
        };
    }
    match line.find(char::is_whitespace) {
        Some(end) => (&line[..end], line[end..].trim_start()),
        None => (line, ""),
    }
}

/// Complete replacement environment for the child
///
/// Never merged with the parent's environment. Iteration order is by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    /// Create an empty environment
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a variable
    pub fn var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Add or replace a variable in place
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.vars.insert(key.into(), value.into())
    }

    /// Look up a variable
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Iterate variables in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of variables
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether no variables are set
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Snapshot the current process environment, skipping non-UTF-8 entries
    pub fn inherited() -> Self {
        std::env::vars().collect()
    }

    /// Reject names and values the OS cannot represent
    pub fn validate(&self) -> Result<()> {
        for (key, value) in &self.vars {
            if key.is_empty() || key.chars().skip(1).any(|c| c == '=') || key.contains('\0') {
                return Err(ProcessError::InvalidConfig(format!(
                    "invalid environment variable name {key:?}"
                )));
            }
            if value.contains('\0') {
                return Err(ProcessError::InvalidConfig(format!(
                    "environment variable {key} contains a NUL byte"
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn apply(&self, cmd: &mut Command) {
        cmd.env_clear();
        cmd.envs(self.vars.iter());
    }
}

impl<K, V> FromIterator<(K, V)> for Environment
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_invocations() {
        assert!(Invocation::args(Vec::<String>::new()).is_empty());
        assert!(Invocation::args([""]).is_empty());
        assert!(Invocation::line("   ").is_empty());
        assert!(matches!(
            Invocation::line("").to_command(),
            Err(ProcessError::EmptyCommand)
        ));
    }

    #[test]
    fn test_program() {
        assert_eq!(
            Invocation::args(["cat", "-n"]).program(),
            Some(OsStr::new("cat"))
        );
        assert_eq!(
            Invocation::line("  echo hi").program(),
            Some(OsStr::new("echo"))
        );
    }

    #[test]
    fn test_split_program() {
        assert_eq!(split_program("cmd /C echo hi"), ("cmd", "/C echo hi"));
        assert_eq!(
            split_program(r#""C:\Program Files\app.exe" --flag "a b""#),
            (r"C:\Program Files\app.exe", r#"--flag "a b""#)
        );
        assert_eq!(split_program("  notepad"), ("notepad", ""));
        assert_eq!(split_program(r#""unterminated"#), ("unterminated", ""));
    }

    #[test]
    fn test_environment_is_ordered() {
        let env: Environment = [("ZED", "1"), ("ALPHA", "2")].into_iter().collect();
        let names: Vec<_> = env.iter().map(|(k, _)| k).collect();
        assert_eq!(names, ["ALPHA", "ZED"]);
        assert_eq!(env.get("ZED"), Some("1"));
    }

    #[test]
    fn test_environment_validation() {
        assert!(Environment::new().var("PATH", "/bin").validate().is_ok());
        assert!(Environment::new().var("", "x").validate().is_err());
        assert!(Environment::new().var("A=B", "x").validate().is_err());
        assert!(Environment::new().var("A", "x\0y").validate().is_err());
        // Windows drive variables such as `=C:` are legal
        assert!(Environment::new().var("=C:", "C:\\").validate().is_ok());
    }
}
