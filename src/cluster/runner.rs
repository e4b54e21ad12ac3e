//! Command runner abstraction used by the `kubectl` control-plane client.

use std::ffi::OsString;
use std::io::{ErrorKind, Write};
use std::process::{Command, Stdio};
use std::thread;

use super::ClusterError;

/// Result of running an external command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Human readable representation of the exit status.
    #[must_use]
    pub fn status_text(&self) -> String {
        self.code
            .map_or_else(|| String::from("unknown"), |code| code.to_string())
    }
}

/// Abstraction over command execution to support fakes in tests.
pub trait CommandRunner: Send + Sync {
    /// Runs `program` with the given arguments, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::Spawn`] if the command cannot be started.
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, ClusterError>;

    /// Runs `program` with `input` written to its stdin.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::Spawn`] if the command cannot be started or
    /// its stdin cannot be written.
    fn run_with_input(
        &self,
        program: &str,
        args: &[OsString],
        input: &[u8],
    ) -> Result<CommandOutput, ClusterError>;
}

/// Real command runner that shells out to the host operating system.
#[derive(Clone, Debug, Default)]
pub struct ProcessCommandRunner;

fn spawn_error(program: &str, err: &std::io::Error) -> ClusterError {
    ClusterError::Spawn {
        program: program.to_owned(),
        message: err.to_string(),
    }
}

fn capture(output: &std::process::Output) -> CommandOutput {
    CommandOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    }
}

impl CommandRunner for ProcessCommandRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, ClusterError> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|err| spawn_error(program, &err))?;
        Ok(capture(&output))
    }

    fn run_with_input(
        &self,
        program: &str,
        args: &[OsString],
        input: &[u8],
    ) -> Result<CommandOutput, ClusterError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| spawn_error(program, &err))?;

        // stdin is written concurrently with draining stdout and stderr.
        let stdin = child.stdin.take();
        let (written, output) = thread::scope(|scope| {
            let feeder = scope.spawn(move || match stdin {
                Some(mut sink) => sink.write_all(input),
                None => Ok(()),
            });
            let output = child.wait_with_output();
            (feeder.join(), output)
        });

        let output = output.map_err(|err| spawn_error(program, &err))?;
        match written {
            Ok(Err(err)) if err.kind() != ErrorKind::BrokenPipe => {
                return Err(spawn_error(program, &err));
            }
            Err(_) => {
                return Err(ClusterError::Spawn {
                    program: program.to_owned(),
                    message: String::from("stdin writer panicked"),
                });
            }
            _ => {}
        }
        Ok(capture(&output))
    }
}
