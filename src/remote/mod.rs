//! Remote command execution inside pod containers.
//!
//! [`ExecChannel`] is the transport seam: it runs one command in a container
//! with stdin, stdout, and stderr wired to caller-supplied async streams.
//! [`RemoteRunner`] is the component the workflows use on top of it.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

mod kubectl;

pub use kubectl::KubectlExec;

/// Readable byte stream fed to a remote command's stdin.
pub type Reader = dyn AsyncRead + Send + Unpin;

/// Writable byte stream receiving a remote command's output.
pub type Writer = dyn AsyncWrite + Send + Unpin;

/// Boxed future returned by [`ExecChannel::exec`].
pub type ExecFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ExecError>> + Send + 'a>>;

/// Container in which remote commands run.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ExecTarget {
    /// Pod namespace.
    pub namespace: String,
    /// Pod name.
    pub pod: String,
    /// Container name.
    pub container: String,
}

impl ExecTarget {
    /// Builds a target.
    #[must_use]
    pub fn new(
        namespace: impl Into<String>,
        pod: impl Into<String>,
        container: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            pod: pod.into(),
            container: container.into(),
        }
    }
}

impl fmt::Display for ExecTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}[{}]", self.namespace, self.pod, self.container)
    }
}

/// Errors raised by remote execution.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ExecError {
    /// The command could not be run, its streams failed, or it exited
    /// unsuccessfully.
    #[error("command `{command}` failed in {target}: {message}")]
    ExecFailed {
        /// Where the command ran.
        target: String,
        /// Command line, space-joined.
        command: String,
        /// Underlying channel error or exit description.
        message: String,
    },
}

impl ExecError {
    /// Builds an [`ExecError::ExecFailed`].
    #[must_use]
    pub fn failed(target: &ExecTarget, command: &[String], message: impl Into<String>) -> Self {
        Self::ExecFailed {
            target: target.to_string(),
            command: command.join(" "),
            message: message.into(),
        }
    }
}

/// Transport that runs a command in a container.
pub trait ExecChannel: Send + Sync {
    /// Runs `command` in `target`, resolving once it exits.
    ///
    /// When `stdin` is `None` the remote stdin is closed.
    fn exec<'a>(
        &'a self,
        target: &'a ExecTarget,
        command: &'a [String],
        stdin: Option<&'a mut Reader>,
        stdout: &'a mut Writer,
        stderr: &'a mut Writer,
    ) -> ExecFuture<'a>;
}

impl<T: ExecChannel + ?Sized> ExecChannel for Arc<T> {
    fn exec<'a>(
        &'a self,
        target: &'a ExecTarget,
        command: &'a [String],
        stdin: Option<&'a mut Reader>,
        stdout: &'a mut Writer,
        stderr: &'a mut Writer,
    ) -> ExecFuture<'a> {
        (**self).exec(target, command, stdin, stdout, stderr)
    }
}

/// Runs commands in access pods.
///
/// There is no timeout: a call blocks until the remote command exits or the
/// channel fails.
#[derive(Clone, Debug)]
pub struct RemoteRunner<E> {
    channel: E,
}

impl<E: ExecChannel> RemoteRunner<E> {
    /// Wraps `channel`.
    #[must_use]
    pub const fn new(channel: E) -> Self {
        Self { channel }
    }

    /// Underlying channel.
    #[must_use]
    pub const fn channel(&self) -> &E {
        &self.channel
    }

    /// Runs `command` in `target` with the given streams.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::ExecFailed`] for any failure, including a
    /// non-zero exit.
    pub async fn run(
        &self,
        target: &ExecTarget,
        command: &[String],
        stdin: Option<&mut Reader>,
        stdout: &mut Writer,
        stderr: &mut Writer,
    ) -> Result<(), ExecError> {
        debug!(%target, command = %command.join(" "), "running remote command");
        self.channel
            .exec(target, command, stdin, stdout, stderr)
            .await
    }
}

/// Builds an owned command line from string slices.
#[must_use]
pub fn command_line(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| (*part).to_owned()).collect()
}
