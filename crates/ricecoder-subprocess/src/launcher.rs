//! Turns an invocation into a running child with its pipes attached

use std::path::Path;
use std::process::{Child, Stdio};

use tracing::{debug, info, warn};

use crate::{
    command::{Environment, Invocation},
    config::ProcessConfig,
    error::{ProcessError, Result},
    pipe::PipeSet,
    sys,
};

/// Which standard streams get a pipe; the rest are inherited
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Streams {
    pub(crate) stdin: bool,
    pub(crate) stdout: bool,
    pub(crate) stderr: bool,
}

fn stdio_for(piped: bool) -> Stdio {
    if piped {
        Stdio::piped()
    } else {
        Stdio::inherit()
    }
}

/// Everything a successful launch produces
///
/// Either all of it exists or, on failure, none of it does: std closes any
/// pipe it created when the spawn call fails.
#[derive(Debug)]
pub(crate) struct Launched {
    pub(crate) pid: u32,
    pub(crate) child: Child,
    pub(crate) pipes: PipeSet,
}

/// One-shot launch request
#[derive(Debug)]
pub(crate) struct ProcessLauncher<'a> {
    pub(crate) invocation: &'a Invocation,
    pub(crate) working_dir: Option<&'a Path>,
    pub(crate) environment: Option<&'a Environment>,
    pub(crate) config: &'a ProcessConfig,
    pub(crate) streams: Streams,
}

impl ProcessLauncher<'_> {
    pub(crate) fn launch(&self) -> Result<Launched> {
        self.config.validate()?;
        if let Some(environment) = self.environment {
            environment.validate()?;
        }

        let mut cmd = self.invocation.to_command()?;
        if let Some(dir) = self.working_dir {
            cmd.current_dir(dir);
        }
        if let Some(environment) = self.environment {
            environment.apply(&mut cmd);
        }
        cmd.stdin(stdio_for(self.streams.stdin));
        cmd.stdout(stdio_for(self.streams.stdout));
        cmd.stderr(stdio_for(self.streams.stderr));
        sys::configure(&mut cmd, self.config);

        debug!(
            program = ?self.invocation.program(),
            working_dir = ?self.working_dir,
            env_override = self.environment.is_some(),
            streams = ?self.streams,
            "Spawning process"
        );

        let mut child = sys::spawn(&mut cmd).map_err(|e| {
            warn!(program = ?self.invocation.program(), error = %e, "Spawn failed");
            ProcessError::SpawnFailed(e)
        })?;
        let pid = child.id();
        let pipes = PipeSet::from_child(&mut child);

        info!(pid = %pid, program = ?self.invocation.program(), "Process spawned");

        Ok(Launched { pid, child, pipes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn launcher<'a>(invocation: &'a Invocation, config: &'a ProcessConfig) -> ProcessLauncher<'a> {
        ProcessLauncher {
            invocation,
            working_dir: None,
            environment: None,
            config,
            streams: Streams::default(),
        }
    }

    #[test]
    fn test_empty_command_fails_before_spawn() {
        let invocation = Invocation::args(Vec::<String>::new());
        let config = ProcessConfig::default();
        let err = launcher(&invocation, &config).launch().unwrap_err();
        assert!(matches!(err, ProcessError::EmptyCommand));
    }

    #[test]
    fn test_invalid_config_fails_before_spawn() {
        let invocation = Invocation::args(["true"]);
        let config = ProcessConfig::new().buffer_size(0);
        let err = launcher(&invocation, &config).launch().unwrap_err();
        assert!(matches!(err, ProcessError::InvalidConfig(_)));
    }

    #[test]
    fn test_missing_executable() {
        let invocation = Invocation::args(["/definitely/not/a/real/binary"]);
        let config = ProcessConfig::default();
        let err = launcher(&invocation, &config).launch().unwrap_err();
        assert!(matches!(err, ProcessError::SpawnFailed(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_pipes_follow_requested_streams() {
        let invocation = Invocation::args(["/bin/sh", "-c", "exit 0"]);
        let config = ProcessConfig::default();
        let mut request = launcher(&invocation, &config);
        request.streams = Streams {
            stdin: true,
            stdout: true,
            stderr: false,
        };

        let mut launched = request.launch().unwrap();
        assert!(launched.pid > 0);
        assert!(launched.pipes.stdin.is_open());
        assert!(launched.pipes.stdout.is_open());
        assert!(!launched.pipes.stderr.is_open());
        launched.pipes.stdin.close();
        launched.child.wait().unwrap();
    }
}
