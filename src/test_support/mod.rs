//! Test support utilities shared across unit and integration tests.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::cluster::{ClusterError, CommandOutput, CommandRunner};
use crate::janitor::{Confirm, ConfirmFuture};

mod cluster;
mod exec;

pub use cluster::{ClusterCall, InMemoryCluster};
pub use exec::{ExecInvocation, FakeExec, FileSet};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic `kubectl` outcomes without spawning processes.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Arc<Mutex<VecDeque<CommandOutput>>>,
    invocations: Arc<Mutex<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
    /// Text written to stdin, if any.
    pub input: Option<String>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        lock(&self.invocations).clone()
    }

    /// Pushes a successful exit status with empty output.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        lock(&self.responses).push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }

    fn next(
        &self,
        program: &str,
        args: &[OsString],
        input: Option<&[u8]>,
    ) -> Result<CommandOutput, ClusterError> {
        lock(&self.invocations).push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
            input: input.map(|bytes| String::from_utf8_lossy(bytes).into_owned()),
        });
        lock(&self.responses)
            .pop_front()
            .ok_or_else(|| ClusterError::Spawn {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            })
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, ClusterError> {
        self.next(program, args, None)
    }

    fn run_with_input(
        &self,
        program: &str,
        args: &[OsString],
        input: &[u8],
    ) -> Result<CommandOutput, ClusterError> {
        self.next(program, args, Some(input))
    }
}

/// Confirmation source with a fixed answer that counts how often it was
/// asked.
#[derive(Clone, Debug, Default)]
pub struct ScriptedConfirm {
    answer: bool,
    asked: Arc<AtomicUsize>,
}

impl ScriptedConfirm {
    /// Always answers yes.
    #[must_use]
    pub fn accepting() -> Self {
        Self {
            answer: true,
            asked: Arc::default(),
        }
    }

    /// Always answers no.
    #[must_use]
    pub fn declining() -> Self {
        Self::default()
    }

    /// Number of prompts answered so far.
    #[must_use]
    pub fn times_asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }
}

impl Confirm for ScriptedConfirm {
    fn confirm(&self) -> ConfirmFuture<'_> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        Box::pin(std::future::ready(Ok(self.answer)))
    }
}
