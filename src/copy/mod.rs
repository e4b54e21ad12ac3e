//! Streaming volume-to-volume copy.
//!
//! A producer runs `tar -cf -` against the source mount and a consumer runs
//! `tar -xf -` against the destination mount. The two commands run as
//! concurrent tasks joined by a bounded in-memory pipe, so memory use stays
//! at the pipe capacity regardless of how much data moves. The first failure
//! cancels the other side.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::access::AccessHandle;
use crate::remote::{ExecChannel, ExecError, command_line};

/// Capacity of the in-memory pipe between producer and consumer.
pub const PIPE_CAPACITY: usize = 64 * 1024;

/// Side of a copy.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CopySide {
    /// Archives the source volume.
    Producer,
    /// Extracts into the destination volume.
    Consumer,
}

impl fmt::Display for CopySide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Producer => "source archive",
            Self::Consumer => "destination extract",
        })
    }
}

/// Why one side of a copy stopped.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SideError {
    /// The remote command failed.
    #[error(transparent)]
    Exec(#[from] ExecError),
    /// The side was stopped because the copy was cancelled.
    #[error("cancelled")]
    Cancelled,
    /// The side's task ended without reporting.
    #[error("task ended abnormally: {0}")]
    Aborted(String),
}

/// Errors raised by [`CopyEngine::copy`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CopyError {
    /// One side of the stream failed first.
    #[error("stream copy failed in {side}: {source}")]
    StreamCopyFailed {
        /// Side whose failure ended the copy.
        side: CopySide,
        /// What went wrong.
        #[source]
        source: SideError,
    },
}

/// Producer/consumer copy between two access points.
#[derive(Clone, Debug)]
pub struct CopyEngine<E> {
    channel: Arc<E>,
    cancel: CancellationToken,
    pipe_capacity: usize,
}

impl<E> CopyEngine<E>
where
    E: ExecChannel + 'static,
{
    /// Creates an engine. Cancelling `cancel` stops any copy in flight.
    #[must_use]
    pub const fn new(channel: Arc<E>, cancel: CancellationToken) -> Self {
        Self {
            channel,
            cancel,
            pipe_capacity: PIPE_CAPACITY,
        }
    }

    /// Overrides the pipe capacity.
    #[must_use]
    pub const fn with_pipe_capacity(mut self, capacity: usize) -> Self {
        self.pipe_capacity = capacity;
        self
    }

    /// Streams every file under the source mount into the destination mount.
    ///
    /// The destination is not cleared here; callers do that first if they
    /// want a replacing copy. There is no point-in-time consistency: files
    /// changing during the copy may be captured in any state.
    ///
    /// When the producer fails, the consumer sees the pipe close and the
    /// destination keeps whatever was extracted up to that point.
    ///
    /// # Errors
    ///
    /// Returns [`CopyError::StreamCopyFailed`] naming the side that failed
    /// first.
    pub async fn copy(
        &self,
        source: &AccessHandle,
        destination: &AccessHandle,
    ) -> Result<(), CopyError> {
        let (writer, reader) = tokio::io::duplex(self.pipe_capacity);
        let (results, mut reports) = mpsc::channel::<(CopySide, Result<(), SideError>)>(2);
        let token = self.cancel.child_token();

        let producer = tokio::spawn(run_producer(
            Arc::clone(&self.channel),
            source.clone(),
            writer,
            token.clone(),
            results.clone(),
        ));
        let consumer = tokio::spawn(run_consumer(
            Arc::clone(&self.channel),
            destination.clone(),
            reader,
            token.clone(),
            results,
        ));

        let mut first_error = None;
        for _ in 0..2 {
            let Some((side, result)) = reports.recv().await else {
                break;
            };
            debug!(%side, ok = result.is_ok(), "copy side finished");
            if let Err(err) = result {
                if first_error.is_none() {
                    warn!(%side, error = %err, "copy side failed; stopping the other side");
                    token.cancel();
                    first_error = Some((side, err));
                }
            }
        }

        for (side, task) in [(CopySide::Producer, producer), (CopySide::Consumer, consumer)] {
            if let Err(err) = task.await {
                first_error.get_or_insert((side, SideError::Aborted(err.to_string())));
            }
        }

        match first_error {
            Some((side, source)) => Err(CopyError::StreamCopyFailed { side, source }),
            None => Ok(()),
        }
    }
}

async fn run_producer<E: ExecChannel>(
    channel: Arc<E>,
    source: AccessHandle,
    mut writer: DuplexStream,
    token: CancellationToken,
    results: mpsc::Sender<(CopySide, Result<(), SideError>)>,
) {
    let command = command_line(&["tar", "-cf", "-", "-C", &source.mount_path, "."]);
    let mut diagnostics = tokio::io::stderr();
    let outcome = tokio::select! {
        () = token.cancelled() => Err(SideError::Cancelled),
        result = channel.exec(&source.target, &command, None, &mut writer, &mut diagnostics) => {
            result.map_err(SideError::from)
        }
    };
    writer.shutdown().await.ok();
    drop(writer);
    results.send((CopySide::Producer, outcome)).await.ok();
}

async fn run_consumer<E: ExecChannel>(
    channel: Arc<E>,
    destination: AccessHandle,
    mut reader: DuplexStream,
    token: CancellationToken,
    results: mpsc::Sender<(CopySide, Result<(), SideError>)>,
) {
    let command = command_line(&["tar", "-xf", "-", "-C", &destination.mount_path]);
    let mut discard = tokio::io::sink();
    let mut diagnostics = tokio::io::stderr();
    let outcome = tokio::select! {
        () = token.cancelled() => Err(SideError::Cancelled),
        result = channel.exec(
            &destination.target,
            &command,
            Some(&mut reader),
            &mut discard,
            &mut diagnostics,
        ) => result.map_err(SideError::from),
    };
    drop(reader);
    results.send((CopySide::Consumer, outcome)).await.ok();
}
