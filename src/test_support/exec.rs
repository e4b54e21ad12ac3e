//! In-memory exec channel that emulates the handful of shell commands the
//! workflows run.
//!
//! Each pod owns a flat set of files. `tar -cf`/`tar -czf` serialise the set
//! as JSON, `tar -xf` merges such a payload back in, `sh -c 'rm -rf ...'`
//! empties the set, and `find`/`ls` print one line per file.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::remote::{ExecChannel, ExecError, ExecFuture, ExecTarget, Reader, Writer};

use super::lock;

/// Files held by one pod, keyed by relative path.
pub type FileSet = BTreeMap<String, String>;

/// A command observed by [`FakeExec`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExecInvocation {
    /// Where the command ran.
    pub target: ExecTarget,
    /// Command line.
    pub command: Vec<String>,
}

impl ExecInvocation {
    /// Space-joined command line.
    #[must_use]
    pub fn command_string(&self) -> String {
        self.command.join(" ")
    }
}

#[derive(Debug, Default)]
struct ExecState {
    files: BTreeMap<String, FileSet>,
    invocations: Vec<ExecInvocation>,
    failures: BTreeSet<(String, String)>,
    hangs: BTreeSet<(String, String)>,
}

/// Exec channel double backed by per-pod in-memory files.
#[derive(Clone, Debug, Default)]
pub struct FakeExec {
    state: Arc<Mutex<ExecState>>,
}

enum Behaviour {
    Fail,
    Hang,
    Run,
}

impl FakeExec {
    /// Creates a channel with no files.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the files held by `pod`.
    pub fn seed(&self, pod: &str, files: &[(&str, &str)]) {
        let set = files
            .iter()
            .map(|(path, body)| ((*path).to_owned(), (*body).to_owned()))
            .collect();
        lock(&self.state).files.insert(pod.to_owned(), set);
    }

    /// Files currently held by `pod`.
    #[must_use]
    pub fn files(&self, pod: &str) -> FileSet {
        lock(&self.state)
            .files
            .get(pod)
            .cloned()
            .unwrap_or_default()
    }

    /// Makes `program` fail when run in `pod`.
    pub fn fail_on(&self, pod: &str, program: &str) {
        lock(&self.state)
            .failures
            .insert((pod.to_owned(), program.to_owned()));
    }

    /// Makes `program` never finish when run in `pod`.
    pub fn hang_on(&self, pod: &str, program: &str) {
        lock(&self.state)
            .hangs
            .insert((pod.to_owned(), program.to_owned()));
    }

    /// Snapshot of observed commands.
    #[must_use]
    pub fn invocations(&self) -> Vec<ExecInvocation> {
        lock(&self.state).invocations.clone()
    }

    /// Decodes an archive produced by the fake `tar -cf`.
    #[must_use]
    pub fn decode_archive(bytes: &[u8]) -> Option<FileSet> {
        serde_json::from_slice(bytes).ok()
    }

    fn record(&self, target: &ExecTarget, command: &[String]) -> Behaviour {
        let mut state = lock(&self.state);
        state.invocations.push(ExecInvocation {
            target: target.clone(),
            command: command.to_vec(),
        });
        let program = command.first().cloned().unwrap_or_default();
        let entry = (target.pod.clone(), program);
        if state.hangs.contains(&entry) {
            Behaviour::Hang
        } else if state.failures.contains(&entry) {
            Behaviour::Fail
        } else {
            Behaviour::Run
        }
    }

    fn listing(&self, pod: &str, root: &str) -> String {
        self.files(pod)
            .iter()
            .map(|(path, body)| {
                format!(
                    "-rw-r--r--    1 root     root     {:>8} {root}/{path}\n",
                    body.len()
                )
            })
            .collect()
    }

    async fn run(
        &self,
        target: &ExecTarget,
        command: &[String],
        stdin: Option<&mut Reader>,
        stdout: &mut Writer,
        stderr: &mut Writer,
    ) -> Result<(), ExecError> {
        let fail = |message: &str| ExecError::failed(target, command, message);
        let behaviour = self.record(target, command);
        let words: Vec<&str> = command.iter().map(String::as_str).collect();

        if matches!(behaviour, Behaviour::Hang) {
            std::future::pending::<()>().await;
        }

        let mut input = Vec::new();
        if let Some(reader) = stdin {
            reader
                .read_to_end(&mut input)
                .await
                .map_err(|err| fail(&err.to_string()))?;
        }

        if matches!(behaviour, Behaviour::Fail) {
            stderr.write_all(b"simulated failure\n").await.ok();
            return Err(fail("exited with status 1: simulated failure"));
        }

        let pod = target.pod.as_str();
        let output = match words.as_slice() {
            ["tar", "-cf" | "-czf", ..] => {
                serde_json::to_vec(&self.files(pod)).map_err(|err| fail(&err.to_string()))?
            }
            ["tar", "-xf", ..] => {
                if !input.is_empty() {
                    let incoming = Self::decode_archive(&input)
                        .ok_or_else(|| fail("tar: invalid archive"))?;
                    lock(&self.state)
                        .files
                        .entry(pod.to_owned())
                        .or_default()
                        .extend(incoming);
                }
                Vec::new()
            }
            ["sh", "-c", script] if script.starts_with("rm -rf") => {
                lock(&self.state).files.remove(pod);
                Vec::new()
            }
            ["find", root, ..] | ["ls", "-la", root] => self.listing(pod, root).into_bytes(),
            _ => return Err(fail("command not supported by the fake")),
        };

        stdout
            .write_all(&output)
            .await
            .map_err(|err| fail(&err.to_string()))?;
        stdout.flush().await.map_err(|err| fail(&err.to_string()))
    }
}

impl ExecChannel for FakeExec {
    fn exec<'a>(
        &'a self,
        target: &'a ExecTarget,
        command: &'a [String],
        stdin: Option<&'a mut Reader>,
        stdout: &'a mut Writer,
        stderr: &'a mut Writer,
    ) -> ExecFuture<'a> {
        Box::pin(self.run(target, command, stdin, stdout, stderr))
    }
}
