//! `kubectl exec` transport.

use std::ffi::OsString;
use std::io;
use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, copy};
use tokio::process::Command;

use crate::config::ClusterCredentials;

use super::{ExecChannel, ExecError, ExecFuture, ExecTarget, Reader, Writer};

/// Bytes of remote stderr kept for the failure message.
pub const STDERR_TAIL_BYTES: usize = 4096;

/// Forwards `source` into `sink` as it arrives and returns the last
/// `limit` bytes seen.
///
/// A failing `sink` stops forwarding but not collection.
async fn tee_tail<R>(mut source: R, sink: &mut Writer, limit: usize) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut tail = Vec::with_capacity(limit);
    let mut chunk = vec![0_u8; 8 * 1024];
    let mut forwarding = true;
    loop {
        let read = source.read(&mut chunk).await?;
        let Some(bytes) = chunk.get(..read) else {
            break;
        };
        if bytes.is_empty() {
            break;
        }
        if forwarding && (sink.write_all(bytes).await.is_err() || sink.flush().await.is_err()) {
            forwarding = false;
        }
        tail.extend_from_slice(bytes);
        let excess = tail.len().saturating_sub(limit);
        tail.drain(..excess);
    }
    Ok(tail)
}

/// Runs commands through `kubectl exec`.
///
/// The child is killed if the returned future is dropped, so abandoning an
/// exec (for example on cancellation) terminates the remote side.
#[derive(Clone, Debug)]
pub struct KubectlExec {
    program: String,
    credentials: ClusterCredentials,
}

impl KubectlExec {
    /// Creates a transport invoking `program`.
    #[must_use]
    pub fn new(program: impl Into<String>, credentials: ClusterCredentials) -> Self {
        Self {
            program: program.into(),
            credentials,
        }
    }

    fn build_args(&self, target: &ExecTarget, command: &[String], interactive: bool) -> Vec<OsString> {
        let mut args = Vec::new();
        if let ClusterCredentials::Kubeconfig(path) = &self.credentials {
            args.push(OsString::from("--kubeconfig"));
            args.push(OsString::from(path.as_str()));
        }
        args.push(OsString::from("exec"));
        if interactive {
            args.push(OsString::from("-i"));
        }
        args.extend([
            OsString::from("-n"),
            OsString::from(&target.namespace),
            OsString::from(&target.pod),
            OsString::from("-c"),
            OsString::from(&target.container),
            OsString::from("--"),
        ]);
        args.extend(command.iter().map(OsString::from));
        args
    }

    async fn run(
        &self,
        target: &ExecTarget,
        command: &[String],
        stdin: Option<&mut Reader>,
        stdout: &mut Writer,
        stderr: &mut Writer,
    ) -> Result<(), ExecError> {
        let fail = |message: String| ExecError::failed(target, command, message);
        let args = self.build_args(target, command, stdin.is_some());

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| fail(format!("failed to spawn {}: {err}", self.program)))?;

        let child_stdin = child.stdin.take();
        let mut child_stdout = child
            .stdout
            .take()
            .ok_or_else(|| fail(String::from("stdout was not captured")))?;
        let child_stderr = child
            .stderr
            .take()
            .ok_or_else(|| fail(String::from("stderr was not captured")))?;

        let feed = async move {
            if let (Some(source), Some(mut sink)) = (stdin, child_stdin) {
                copy(source, &mut sink).await?;
                sink.shutdown().await?;
            }
            Ok::<(), io::Error>(())
        };
        let drain = async {
            copy(&mut child_stdout, stdout).await?;
            stdout.flush().await
        };
        let collect = tee_tail(child_stderr, stderr, STDERR_TAIL_BYTES);

        let (fed, drained, collected) = tokio::join!(feed, drain, collect);
        let status = child
            .wait()
            .await
            .map_err(|err| fail(format!("failed to wait for {}: {err}", self.program)))?;

        let diagnostics = collected.map_err(|err| fail(format!("stderr stream failed: {err}")))?;
        if !status.success() {
            let detail = String::from_utf8_lossy(&diagnostics).trim().to_owned();
            let code = status
                .code()
                .map_or_else(|| String::from("unknown"), |code| code.to_string());
            return Err(fail(format!("exited with status {code}: {detail}")));
        }
        drained.map_err(|err| fail(format!("stdout stream failed: {err}")))?;
        match fed {
            Err(err) if err.kind() != io::ErrorKind::BrokenPipe => {
                Err(fail(format!("stdin stream failed: {err}")))
            }
            _ => Ok(()),
        }
    }
}

impl ExecChannel for KubectlExec {
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
